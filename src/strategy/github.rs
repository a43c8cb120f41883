use tracing::warn;
use url::Url;

use super::{render, Strategy, DOCUMENTATION_TEMPLATE};
use crate::models::{GithubRepoRef, SiteAnalysis, WebsiteType};

const GITHUB_TEMPLATE: &str = include_str!("templates/github.py");
const DEFAULT_BRANCH: &str = "main";

pub struct GithubStrategy;

#[async_trait::async_trait]
impl Strategy for GithubStrategy {
    fn website_type(&self) -> WebsiteType {
        WebsiteType::Github
    }

    fn generate_code(&self, analysis: &SiteAnalysis) -> String {
        let url = analysis.root_url.as_str();
        if !is_github_url(url) {
            warn!(url, "Not a GitHub URL, using the documentation template");
            return render(DOCUMENTATION_TEMPLATE, &[("url", url)]);
        }

        let repo = parse_github_url(url);
        let purpose = if analysis.purpose.is_empty() {
            "Extract GitHub documentation"
        } else {
            analysis.purpose.as_str()
        };
        render(
            GITHUB_TEMPLATE,
            &[
                ("url", url),
                ("owner", &repo.owner),
                ("repo", &repo.repo),
                ("branch", &repo.branch),
                ("path", &repo.path),
                ("full_repo", &repo.full_repo),
                ("purpose", purpose),
            ],
        )
    }
}

/// True for `github.com` and its subdomains.
pub fn is_github_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "github.com" || h.ends_with(".github.com")))
        .unwrap_or(false)
}

/// Split `https://github.com/<owner>/<repo>[/tree/<branch>/<path…>]`.
///
/// URLs with fewer than two path segments yield empty owner and repo.
pub fn parse_github_url(url: &str) -> GithubRepoRef {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();

    if parts.len() < 2 {
        return GithubRepoRef {
            owner: String::new(),
            repo: String::new(),
            branch: DEFAULT_BRANCH.to_string(),
            path: String::new(),
            full_repo: String::new(),
        };
    }

    let (owner, repo) = (parts[0], parts[1]);
    let (branch, rest) = if parts.len() > 3 && parts[2] == "tree" {
        (parts[3], parts[4..].join("/"))
    } else {
        (DEFAULT_BRANCH, parts[2..].join("/"))
    };

    GithubRepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        branch: branch.to_string(),
        path: rest,
        full_repo: format!("{}/{}", owner, repo),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteStructure;

    fn analysis(url: &str) -> SiteAnalysis {
        SiteAnalysis {
            root_url: url.into(),
            title: String::new(),
            pages: vec![],
            structure: SiteStructure::default(),
            website_type: WebsiteType::Github,
            purpose: String::new(),
        }
    }

    #[test]
    fn test_parse_repo_root() {
        let r = parse_github_url("https://github.com/unclecode/crawl4ai");
        assert_eq!(r.owner, "unclecode");
        assert_eq!(r.repo, "crawl4ai");
        assert_eq!(r.branch, "main");
        assert_eq!(r.path, "");
        assert_eq!(r.full_repo, "unclecode/crawl4ai");
    }

    #[test]
    fn test_parse_tree_branch_and_path() {
        let r = parse_github_url("https://github.com/o/r/tree/dev/docs/guide/");
        assert_eq!(r.branch, "dev");
        assert_eq!(r.path, "docs/guide");

        let blob = parse_github_url("https://github.com/o/r/blob/main/README.md");
        assert_eq!(blob.branch, "main");
        assert_eq!(blob.path, "blob/main/README.md");
    }

    #[test]
    fn test_parse_short_url() {
        let r = parse_github_url("https://github.com/only-owner");
        assert_eq!(r.full_repo, "");
        assert_eq!(r.branch, "main");
    }

    #[test]
    fn test_github_hosts() {
        assert!(is_github_url("https://github.com/o/r"));
        assert!(is_github_url("https://docs.github.com/en"));
        assert!(!is_github_url("https://notgithub.com/o/r"));
        assert!(!is_github_url("not a url"));
    }

    #[test]
    fn test_generate_code_uses_repo_fields() {
        let code = GithubStrategy.generate_code(&analysis("https://github.com/o/r/tree/dev/docs"));
        assert!(code.contains("REPO_OWNER = \"o\""));
        assert!(code.contains("REPO_BRANCH = \"dev\""));
        assert!(code.contains("START_PATH = \"docs\""));
        assert!(code.contains("Purpose: Extract GitHub documentation"));
    }

    #[test]
    fn test_non_github_falls_back_to_docs_template() {
        let code = GithubStrategy.generate_code(&analysis("https://docs.test/"));
        assert!(code.contains("BASE_URL = \"https://docs.test/\""));
    }
}
