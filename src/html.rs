//! HTML → markdown conversion and link extraction.
//!
//! The content root is the first `article`, then `main`, then `body`.
//! Chrome (`nav`, `header`, `form`, scripts, styles, inline SVG) is skipped.
//! Block elements become markdown blocks separated by blank lines; inline
//! links, emphasis, and code keep their markdown form so link and code
//! counts survive conversion.

use anyhow::Result;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::models::Link;

/// Everything extracted from one HTML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub markdown: String,
    pub internal_links: Vec<Link>,
    pub external_links: Vec<Link>,
    pub images: Vec<String>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector '{}': {:?}", css, e))
}

fn is_excluded(tag: &str) -> bool {
    matches!(
        tag,
        "script" | "style" | "noscript" | "svg" | "nav" | "header" | "form" | "template" | "iframe"
    )
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "h1" | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "p"
            | "ul"
            | "ol"
            | "li"
            | "pre"
            | "blockquote"
            | "table"
            | "hr"
            | "div"
            | "section"
            | "article"
            | "main"
            | "aside"
            | "footer"
            | "figure"
            | "figcaption"
            | "dl"
            | "dt"
            | "dd"
            | "details"
            | "summary"
    )
}

/// Parse `html` fetched from `base` into a [`ParsedPage`].
pub fn parse_html(html: &str, base: &Url) -> Result<ParsedPage> {
    let document = Html::parse_document(html);

    let root = pick_root(&document)?;
    let mut writer = MarkdownWriter::new(base);
    writer.container(root);
    writer.flush_inline();
    let markdown = writer.blocks.join("\n\n");

    let title = extract_title(&document, &markdown)?;
    let (internal_links, external_links) = extract_links(&document, base)?;
    let images = extract_images(root, base)?;

    Ok(ParsedPage {
        title,
        markdown,
        internal_links,
        external_links,
        images,
    })
}

fn pick_root(document: &Html) -> Result<ElementRef<'_>> {
    for css in ["article", "main", "body"] {
        if let Some(el) = document.select(&selector(css)?).next() {
            return Ok(el);
        }
    }
    Ok(document.root_element())
}

fn extract_title(document: &Html, markdown: &str) -> Result<String> {
    if let Some(t) = document.select(&selector("title")?).next() {
        let text = collapse_whitespace(&t.text().collect::<String>());
        if !text.is_empty() {
            return Ok(text);
        }
    }
    // first markdown heading of any level
    Ok(markdown
        .lines()
        .find(|l| l.starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .unwrap_or_default())
}

/// Resolve `href` against `base`, dropping fragments and non-HTTP schemes.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

fn extract_links(document: &Html, base: &Url) -> Result<(Vec<Link>, Vec<Link>)> {
    let mut internal: Vec<Link> = Vec::new();
    let mut external: Vec<Link> = Vec::new();
    let base_host = base.host_str().map(str::to_ascii_lowercase);

    for a in document.select(&selector("a[href]")?) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_href(base, href) else {
            continue;
        };
        let link = Link {
            href: url.to_string(),
            text: collapse_whitespace(&a.text().collect::<String>()),
        };
        let is_internal = url.host_str().map(str::to_ascii_lowercase) == base_host;
        let bucket = if is_internal { &mut internal } else { &mut external };
        if !bucket.iter().any(|l| l.href == link.href) {
            bucket.push(link);
        }
    }

    Ok((internal, external))
}

fn extract_images(root: ElementRef<'_>, base: &Url) -> Result<Vec<String>> {
    let mut images: Vec<String> = Vec::new();
    for img in root.select(&selector("img[src]")?) {
        if let Some(url) = img.value().attr("src").and_then(|s| resolve_href(base, s)) {
            let s = url.to_string();
            if !images.contains(&s) {
                images.push(s);
            }
        }
    }
    Ok(images)
}

struct MarkdownWriter<'a> {
    base: &'a Url,
    blocks: Vec<String>,
    inline: String,
}

impl<'a> MarkdownWriter<'a> {
    fn new(base: &'a Url) -> Self {
        Self {
            base,
            blocks: Vec::new(),
            inline: String::new(),
        }
    }

    fn push_block(&mut self, block: String) {
        if !block.trim().is_empty() {
            self.blocks.push(block);
        }
    }

    fn flush_inline(&mut self) {
        let text = collapse_whitespace(&self.inline);
        self.inline.clear();
        self.push_block(text);
    }

    /// Walk a container, gathering loose inline content into paragraphs.
    fn container(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.inline.push_str(text),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let tag = child.value().name();
                    if is_excluded(tag) {
                        continue;
                    }
                    if is_block(tag) {
                        self.flush_inline();
                        self.block(child);
                    } else {
                        let rendered = self.inline_of(child);
                        self.inline.push_str(&rendered);
                    }
                }
                _ => {}
            }
        }
    }

    fn block(&mut self, el: ElementRef<'_>) {
        let tag = el.value().name();
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level: usize = tag[1..].parse().unwrap_or(1);
                let text = collapse_whitespace(&self.inline_children(el, false));
                if !text.is_empty() {
                    self.push_block(format!("{} {}", "#".repeat(level), text));
                }
            }
            "p" | "dt" | "dd" | "figcaption" | "summary" => {
                let text = collapse_whitespace(&self.inline_children(el, false));
                self.push_block(text);
            }
            "pre" => {
                let code: String = el.text().collect();
                let code = code.trim_matches('\n').trim_end();
                if !code.is_empty() {
                    let lang = code_language(el).unwrap_or_default();
                    self.push_block(format!("```{}\n{}\n```", lang, code));
                }
            }
            "blockquote" => {
                let text = collapse_whitespace(&self.inline_children(el, false));
                if !text.is_empty() {
                    self.push_block(format!("> {}", text));
                }
            }
            "ul" | "ol" => {
                let mut lines = Vec::new();
                self.list(el, tag == "ol", 0, &mut lines);
                self.push_block(lines.join("\n"));
            }
            "li" => {
                let text = collapse_whitespace(&self.inline_children(el, true));
                if !text.is_empty() {
                    self.push_block(format!("- {}", text));
                }
            }
            "table" => {
                let table = self.table(el);
                self.push_block(table);
            }
            "hr" => self.push_block("---".to_string()),
            _ => {
                self.container(el);
                self.flush_inline();
            }
        }
    }

    fn list(&self, el: ElementRef<'_>, ordered: bool, depth: usize, lines: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        let mut n = 0;
        for li in el.children().filter_map(ElementRef::wrap) {
            if li.value().name() != "li" {
                continue;
            }
            n += 1;
            let text = collapse_whitespace(&self.inline_children(li, true));
            if !text.is_empty() {
                let marker = if ordered {
                    format!("{}.", n)
                } else {
                    "-".to_string()
                };
                lines.push(format!("{}{} {}", indent, marker, text));
            }
            for nested in li.children().filter_map(ElementRef::wrap) {
                let tag = nested.value().name();
                if tag == "ul" || tag == "ol" {
                    self.list(nested, tag == "ol", depth + 1, lines);
                }
            }
        }
    }

    fn table(&self, el: ElementRef<'_>) -> String {
        let Ok(row_sel) = selector("tr") else {
            return String::new();
        };
        let mut lines = Vec::new();
        for (i, row) in el.select(&row_sel).enumerate() {
            let cells: Vec<String> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(|c| collapse_whitespace(&self.inline_children(c, false)).replace('|', "\\|"))
                .collect();
            if cells.is_empty() {
                continue;
            }
            lines.push(format!("| {} |", cells.join(" | ")));
            if i == 0 {
                lines.push(format!("|{}", " --- |".repeat(cells.len())));
            }
        }
        lines.join("\n")
    }

    /// Render the children of `el` as inline markdown. Nested lists are left
    /// out when `skip_lists` is set (the list walker emits them itself).
    fn inline_children(&self, el: ElementRef<'_>, skip_lists: bool) -> String {
        let mut out = String::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let tag = child.value().name();
                    if is_excluded(tag) || (skip_lists && matches!(tag, "ul" | "ol")) {
                        continue;
                    }
                    out.push_str(&self.inline_of(child));
                    if is_block(tag) {
                        out.push(' ');
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn inline_of(&self, el: ElementRef<'_>) -> String {
        match el.value().name() {
            "a" => {
                let text = collapse_whitespace(&self.inline_children(el, false));
                match el
                    .value()
                    .attr("href")
                    .and_then(|h| resolve_href(self.base, h))
                {
                    Some(url) if !text.is_empty() => format!("[{}]({})", text, url),
                    _ => text,
                }
            }
            "img" => {
                let alt = el.value().attr("alt").unwrap_or_default();
                match el.value().attr("src").and_then(|s| resolve_href(self.base, s)) {
                    Some(url) => format!("![{}]({})", alt, url),
                    None => String::new(),
                }
            }
            "code" | "kbd" | "samp" => {
                let text: String = el.text().collect();
                let text = text.trim();
                if text.is_empty() {
                    String::new()
                } else {
                    format!("`{}`", text)
                }
            }
            "strong" | "b" => wrap_nonempty("**", &self.inline_children(el, false)),
            "em" | "i" => wrap_nonempty("*", &self.inline_children(el, false)),
            "br" => " ".to_string(),
            _ => self.inline_children(el, false),
        }
    }
}

fn wrap_nonempty(marker: &str, inner: &str) -> String {
    let inner = collapse_whitespace(inner);
    if inner.is_empty() {
        String::new()
    } else {
        format!(" {}{}{} ", marker, inner, marker)
    }
}

/// Language hint from `<pre class="language-x">` or a nested `<code class="language-x">`.
fn code_language(pre: ElementRef<'_>) -> Option<String> {
    let from_class = |el: ElementRef<'_>| {
        el.value().classes().find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
                .map(str::to_string)
        })
    };
    from_class(pre).or_else(|| {
        pre.children()
            .filter_map(ElementRef::wrap)
            .find(|c| c.value().name() == "code")
            .and_then(from_class)
    })
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}
