//! Write generated markdown to disk.
//!
//! File names are sanitized with [`sanitize_filename`] and always end in
//! `.md`. Batch writes keep going past individual failures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::models::{SiteAnalysis, WebsiteType};
use crate::strategy::create_strategy;
use crate::validate::sanitize_filename;

fn safe_md_name(name: &str) -> String {
    let safe = sanitize_filename(name);
    if safe.ends_with(".md") {
        safe
    } else {
        format!("{}.md", safe)
    }
}

/// Write each `(name, content)` pair into `dir`.
///
/// Returns sanitized file name → written path. Files that fail to write are
/// logged and left out of the result.
pub fn write_markdown_files(
    files: &BTreeMap<String, String>,
    dir: &Path,
) -> Result<BTreeMap<String, PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let mut written = BTreeMap::new();
    for (name, content) in files {
        let safe = safe_md_name(name);
        let path = dir.join(&safe);
        match std::fs::write(&path, content) {
            Ok(()) => {
                info!(path = %path.display(), "Wrote markdown file");
                written.insert(safe, path);
            }
            Err(e) => error!(file = %name, error = %e, "Error writing markdown file"),
        }
    }
    Ok(written)
}

pub fn write_markdown_file(name: &str, content: &str, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(safe_md_name(name));
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write markdown file: {}", path.display()))?;
    info!(path = %path.display(), "Wrote markdown file");
    Ok(path)
}

pub fn read_markdown_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read markdown file: {}", path.display()))
}

/// `.md` files directly inside `dir`, sorted. A missing directory is empty.
pub fn list_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Render an analysis with the strategy for `website_type` and write it.
pub fn export_from_analysis(
    analysis: &SiteAnalysis,
    website_type: WebsiteType,
    dir: &Path,
) -> Result<BTreeMap<String, PathBuf>> {
    let strategy = create_strategy(website_type, Some(&analysis.root_url));
    write_markdown_files(&strategy.generate_markdown(analysis), dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageAnalysis, SiteStructure, StructureStats};
    use tempfile::TempDir;

    #[test]
    fn test_write_files_sanitizes_and_adds_extension() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out");
        let mut files = BTreeMap::new();
        files.insert("a:b?".to_string(), "# AB".to_string());
        files.insert("index.md".to_string(), "# Index".to_string());

        let written = write_markdown_files(&files, &dir).unwrap();
        assert_eq!(
            written.keys().cloned().collect::<Vec<_>>(),
            vec!["a_b.md".to_string(), "index.md".to_string()]
        );
        assert_eq!(read_markdown_file(&written["a_b.md"]).unwrap(), "# AB");
    }

    #[test]
    fn test_single_file_and_listing() {
        let tmp = TempDir::new().unwrap();
        write_markdown_file("zeta", "z", tmp.path()).unwrap();
        write_markdown_file("alpha.md", "a", tmp.path()).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "skip").unwrap();

        let listed = list_markdown_files(tmp.path()).unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.md", "zeta.md"]);
        assert!(list_markdown_files(&tmp.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_read_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(read_markdown_file(&tmp.path().join("nope.md")).is_err());
    }

    #[test]
    fn test_export_from_analysis_writes_index_and_pages() {
        let tmp = TempDir::new().unwrap();
        let analysis = SiteAnalysis {
            root_url: "https://blog.test/".into(),
            title: "Blog".into(),
            pages: vec![PageAnalysis {
                url: "https://blog.test/posts/hello".into(),
                title: "Hello".into(),
                markdown: "# Hello".into(),
                internal_links: vec![],
                external_links: vec![],
                structure: StructureStats::default(),
            }],
            structure: SiteStructure::default(),
            website_type: WebsiteType::Blog,
            purpose: String::new(),
        };

        let written = export_from_analysis(&analysis, WebsiteType::Blog, tmp.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(read_markdown_file(&written["index.md"])
            .unwrap()
            .contains("- [Hello](https://blog.test/posts/hello)"));
        assert_eq!(read_markdown_file(&written["hello.md"]).unwrap(), "# Hello");
    }
}
