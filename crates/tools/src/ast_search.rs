//! `ast_search` tool — structural search.
//!
//! The spec describes this as invoking an external AST-grep-style tool
//! inside the sandbox, with shortcut names (`functions`, `classes`,
//! `imports`, `tests`) resolving to language-specific patterns. Since no
//! AST-grep binary is an assumed dependency, this implementation is a
//! regex-based structural approximation behind the same schema — a
//! documented stand-in, not a true parser (see DESIGN.md).

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::search::{search, SearchRequest};

#[derive(Debug, Clone, Deserialize)]
pub struct AstSearchRequest {
    #[serde(default = "default_dot")]
    pub path: String,
    /// One of the shortcuts below, or a raw regex pattern.
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
}

fn default_dot() -> String {
    ".".into()
}

/// Resolve a shortcut name to a regex pattern matching common function /
/// class / import / test declarations across Rust, Python, JS/TS.
fn resolve_shortcut(name: &str) -> Option<&'static str> {
    match name {
        "functions" => Some(
            r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?fn\s+\w+|^\s*def\s+\w+|^\s*(export\s+)?(async\s+)?function\s+\w+",
        ),
        "classes" => Some(r"^\s*(pub\s+)?(struct|enum|trait)\s+\w+|^\s*class\s+\w+"),
        "imports" => Some(r"^\s*use\s+|^\s*(import|from)\s+|^\s*require\("),
        "tests" => Some(
            r"^\s*#\[test\]|^\s*#\[tokio::test\]|^\s*def\s+test_\w+|^\s*(it|test)\(",
        ),
        _ => None,
    }
}

/// Run a structural search. `query` is resolved via [`resolve_shortcut`]
/// first; if it isn't a known shortcut it's treated as a raw regex.
pub async fn ast_search(root: &Path, req: AstSearchRequest) -> Result<Value, String> {
    let pattern = resolve_shortcut(&req.query).unwrap_or(req.query.as_str());
    Regex::new(pattern).map_err(|e| format!("invalid structural pattern: {e}"))?;

    search(
        root,
        SearchRequest {
            path: req.path,
            content: Some(pattern.to_string()),
            name_glob: None,
            max_results: req.max_results,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn functions_shortcut_finds_rust_fns() {
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join("a.rs"),
            "pub fn foo() {}\nfn bar() {}\nlet x = 1;\n",
        )
        .unwrap();

        let result = ast_search(
            root.path(),
            AstSearchRequest {
                path: ".".into(),
                query: "functions".into(),
                max_results: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 2);
    }

    #[tokio::test]
    async fn raw_pattern_used_when_not_a_shortcut() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.rs"), "TODO: fix this\n").unwrap();

        let result = ast_search(
            root.path(),
            AstSearchRequest {
                path: ".".into(),
                query: "TODO".into(),
                max_results: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 1);
    }

    #[tokio::test]
    async fn invalid_raw_pattern_errors() {
        let root = TempDir::new().unwrap();
        let result = ast_search(
            root.path(),
            AstSearchRequest {
                path: ".".into(),
                query: "(unterminated".into(),
                max_results: None,
            },
        )
        .await;
        assert!(result.is_err());
    }
}
