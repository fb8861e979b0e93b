//! `search` tool — text search over files under a sandbox root, by filename
//! glob or by line content. Caps the number of results so a broad query
//! can't flood the model's context.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_MAX_RESULTS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Directory to search, relative to the workspace root.
    #[serde(default = "default_dot")]
    pub path: String,
    /// Substring or regex to match against file contents. Mutually usable
    /// alongside `name_glob`; at least one must be set.
    #[serde(default)]
    pub content: Option<String>,
    /// Simple glob (`*`/`?`) matched against file names.
    #[serde(default)]
    pub name_glob: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

fn default_dot() -> String {
    ".".into()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchMatch {
    pub path: String,
    pub line: usize,
    pub text: String,
}

fn glob_to_regex(glob: &str) -> Regex {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).unwrap_or_else(|_| Regex::new("^$").unwrap())
}

/// Search files under `root`. `root` must already be validated/resolved by
/// the caller (the same path-containment rule `file_ops::validate_path` uses).
pub async fn search(root: &Path, req: SearchRequest) -> Result<Value, String> {
    let base = crate::file_ops::validate_path(root, &req.path)?;
    let max_results = req.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let name_re = req.name_glob.as_deref().map(glob_to_regex);
    let content_re = match &req.content {
        Some(pattern) => Some(
            Regex::new(pattern).map_err(|e| format!("invalid content pattern: {e}"))?,
        ),
        None => None,
    };

    if name_re.is_none() && content_re.is_none() {
        return Err("search requires at least one of `content` or `name_glob`".into());
    }

    let mut matches: Vec<SearchMatch> = Vec::new();
    let mut stack = vec![base.clone()];
    let mut truncated = false;

    while let Some(dir) = stack.pop() {
        if matches.len() >= max_results {
            truncated = true;
            break;
        }
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| format!("failed to read directory '{}': {e}", dir.display()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("failed to read directory entry: {e}"))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| format!("failed to stat '{}': {e}", path.display()))?;

            if file_type.is_dir() {
                if path.file_name().and_then(|n| n.to_str()) != Some(".git") {
                    stack.push(path);
                }
                continue;
            }

            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if let Some(re) = &name_re {
                if !re.is_match(file_name) {
                    continue;
                }
            }

            let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();

            match &content_re {
                Some(re) => {
                    let content = match tokio::fs::read_to_string(&path).await {
                        Ok(c) => c,
                        Err(_) => continue, // binary or unreadable file; skip
                    };
                    for (idx, line) in content.lines().enumerate() {
                        if re.is_match(line) {
                            matches.push(SearchMatch {
                                path: rel.clone(),
                                line: idx + 1,
                                text: line.to_string(),
                            });
                            if matches.len() >= max_results {
                                truncated = true;
                                break;
                            }
                        }
                    }
                }
                None => {
                    matches.push(SearchMatch {
                        path: rel,
                        line: 0,
                        text: String::new(),
                    });
                }
            }

            if matches.len() >= max_results {
                truncated = true;
                break;
            }
        }
    }

    Ok(serde_json::json!({
        "matches": matches,
        "count": matches.len(),
        "truncated": truncated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_content_matches() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.rs"), "fn main() {}\nfn helper() {}\n").unwrap();

        let result = search(
            root.path(),
            SearchRequest {
                path: ".".into(),
                content: Some("fn ".into()),
                name_glob: None,
                max_results: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 2);
    }

    #[tokio::test]
    async fn finds_name_glob_matches() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.rs"), "content").unwrap();
        std::fs::write(root.path().join("b.txt"), "content").unwrap();

        let result = search(
            root.path(),
            SearchRequest {
                path: ".".into(),
                content: None,
                name_glob: Some("*.rs".into()),
                max_results: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 1);
    }

    #[tokio::test]
    async fn caps_results_and_marks_truncated() {
        let root = TempDir::new().unwrap();
        let mut content = String::new();
        for _ in 0..10 {
            content.push_str("match_line\n");
        }
        std::fs::write(root.path().join("a.txt"), content).unwrap();

        let result = search(
            root.path(),
            SearchRequest {
                path: ".".into(),
                content: Some("match_line".into()),
                name_glob: None,
                max_results: Some(3),
            },
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 3);
        assert_eq!(result["truncated"], true);
    }

    #[tokio::test]
    async fn requires_a_search_criterion() {
        let root = TempDir::new().unwrap();
        let result = search(
            root.path(),
            SearchRequest {
                path: ".".into(),
                content: None,
                name_glob: None,
                max_results: None,
            },
        )
        .await;
        assert!(result.is_err());
    }
}
