//! Boundary-aware text chunker.
//!
//! Splits page markdown into pieces of at most `chunk_size` characters.
//! Inside each window the split point is, in order of preference, the last
//! code fence, the last paragraph break, or the last sentence end, provided
//! it falls past 30% of the window. Otherwise the window is cut hard.
//!
//! Sizes are counted in `char`s so multi-byte text never splits inside a
//! code point.

/// Fraction of the window a boundary must pass to be used.
const MIN_BREAK_RATIO: f64 = 0.3;

/// Split `text` into trimmed, non-empty chunks of at most `chunk_size` chars.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let mut end = start + chunk_size;

        if end >= total {
            push_trimmed(&mut chunks, &chars[start..]);
            break;
        }

        let window: String = chars[start..end].iter().collect();
        if let Some(offset) = find_break(&window, chunk_size) {
            end = start + offset;
        }

        push_trimmed(&mut chunks, &chars[start..end]);
        start = end.max(start + 1);
    }

    chunks
}

/// Char offset inside `window` at which to end the chunk, if any boundary
/// qualifies.
fn find_break(window: &str, chunk_size: usize) -> Option<usize> {
    let min = chunk_size as f64 * MIN_BREAK_RATIO;
    let past_min = |byte_pos: usize, extra: usize| {
        let pos = window[..byte_pos].chars().count();
        ((pos as f64) > min).then_some(pos + extra)
    };

    if let Some(b) = window.rfind("```") {
        if let Some(pos) = past_min(b, 0) {
            return Some(pos);
        }
    }
    if let Some(b) = window.rfind("\n\n") {
        if let Some(pos) = past_min(b, 0) {
            return Some(pos);
        }
    }
    if let Some(b) = window.rfind(". ") {
        // keep the period with the sentence it ends
        if let Some(pos) = past_min(b, 1) {
            return Some(pos);
        }
    }
    None
}

fn push_trimmed(chunks: &mut Vec<String>, piece: &[char]) {
    let s: String = piece.iter().collect();
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
