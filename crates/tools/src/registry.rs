//! `Tool` trait and `ToolRegistry` — the uniform capability interface the
//! agent loop dispatches against, and the built-in tool set bound to it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sa_domain::tool::ToolDefinition;
use serde_json::Value;

use crate::ast_search::{ast_search, AstSearchRequest};
use crate::exec::{bash, BashRequest, DenyList};
use crate::file_ops::{
    file_edit, file_read, file_write, FileEditRequest, FileReadRequest, FileWriteRequest,
};
use crate::sandbox::{Sandbox, SandboxManager};
use crate::search::{search, SearchRequest};

/// Outcome of a single tool invocation. `success=false` is data the loop
/// feeds back to the model as a failed observation — it never aborts the
/// turn by itself.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
}

impl ToolOutcome {
    pub fn ok(value: Value) -> Self {
        Self {
            success: true,
            output: value.to_string(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// A named, schema-described capability the agent may invoke.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema object: `{type, properties, required}`.
    fn parameters_schema(&self) -> Value;
    async fn invoke(&self, args: Value) -> ToolOutcome;

    /// Project this tool's schema into the model-facing `ToolDefinition`.
    /// A pure function of the other three methods, so the mapping itself
    /// is unit-testable independent of any specific tool.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

fn schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BashTool {
    pub sandbox: Arc<dyn Sandbox>,
    pub deny_list: Arc<DenyList>,
    pub default_timeout_sec: u64,
    pub max_output_chars: usize,
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }
    fn description(&self) -> &str {
        "Run a shell command in the session's sandbox workspace."
    }
    fn parameters_schema(&self) -> Value {
        schema(
            serde_json::json!({
                "command": {"type": "string", "description": "Shell command to run"},
                "cwd": {"type": "string", "description": "Working directory relative to the workspace root"},
                "timeout_sec": {"type": "number", "description": "Override the default timeout"},
            }),
            &["command"],
        )
    }
    async fn invoke(&self, args: Value) -> ToolOutcome {
        let req: BashRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::err(format!("invalid arguments: {e}")),
        };
        match bash(
            self.sandbox.as_ref(),
            &self.deny_list,
            self.default_timeout_sec,
            self.max_output_chars,
            req,
        )
        .await
        {
            Ok(v) => ToolOutcome::ok(v),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

pub struct FileReadTool {
    pub workspace_root: PathBuf,
}

#[async_trait::async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }
    fn description(&self) -> &str {
        "Read a file's contents, optionally a line range."
    }
    fn parameters_schema(&self) -> Value {
        schema(
            serde_json::json!({
                "path": {"type": "string", "description": "Path relative to the workspace root"},
                "offset": {"type": "number", "description": "0-indexed starting line"},
                "limit": {"type": "number", "description": "Maximum number of lines to return"},
            }),
            &["path"],
        )
    }
    async fn invoke(&self, args: Value) -> ToolOutcome {
        let req: FileReadRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::err(format!("invalid arguments: {e}")),
        };
        match file_read(&self.workspace_root, req).await {
            Ok(v) => ToolOutcome::ok(v),
            Err(e) => ToolOutcome::err(e),
        }
    }
}

pub struct FileWriteTool {
    pub workspace_root: PathBuf,
}

#[async_trait::async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }
    fn description(&self) -> &str {
        "Write (create or overwrite) a file's contents."
    }
    fn parameters_schema(&self) -> Value {
        schema(
            serde_json::json!({
                "path": {"type": "string", "description": "Path relative to the workspace root"},
                "content": {"type": "string", "description": "New file contents"},
            }),
            &["path", "content"],
        )
    }
    async fn invoke(&self, args: Value) -> ToolOutcome {
        let req: FileWriteRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::err(format!("invalid arguments: {e}")),
        };
        match file_write(&self.workspace_root, req).await {
            Ok(v) => ToolOutcome::ok(v),
            Err(e) => ToolOutcome::err(e),
        }
    }
}

pub struct FileEditTool {
    pub workspace_root: PathBuf,
}

#[async_trait::async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "file_edit"
    }
    fn description(&self) -> &str {
        "Replace exactly one occurrence of old_text with new_text in a file."
    }
    fn parameters_schema(&self) -> Value {
        schema(
            serde_json::json!({
                "path": {"type": "string", "description": "Path relative to the workspace root"},
                "old_text": {"type": "string", "description": "Exact text to replace; must occur exactly once"},
                "new_text": {"type": "string", "description": "Replacement text"},
            }),
            &["path", "old_text", "new_text"],
        )
    }
    async fn invoke(&self, args: Value) -> ToolOutcome {
        let req: FileEditRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::err(format!("invalid arguments: {e}")),
        };
        match file_edit(&self.workspace_root, req).await {
            Ok(v) => ToolOutcome::ok(v),
            Err(e) => ToolOutcome::err(e),
        }
    }
}

pub struct SearchTool {
    pub workspace_root: PathBuf,
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Search files under a directory by filename glob or line content."
    }
    fn parameters_schema(&self) -> Value {
        schema(
            serde_json::json!({
                "path": {"type": "string", "description": "Directory to search, relative to the workspace root"},
                "content": {"type": "string", "description": "Regex to match against file contents"},
                "name_glob": {"type": "string", "description": "Glob (*, ?) matched against file names"},
                "max_results": {"type": "number", "description": "Cap on the number of matches returned"},
            }),
            &["path"],
        )
    }
    async fn invoke(&self, args: Value) -> ToolOutcome {
        let req: SearchRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::err(format!("invalid arguments: {e}")),
        };
        match search(&self.workspace_root, req).await {
            Ok(v) => ToolOutcome::ok(v),
            Err(e) => ToolOutcome::err(e),
        }
    }
}

pub struct AstSearchTool {
    pub workspace_root: PathBuf,
}

#[async_trait::async_trait]
impl Tool for AstSearchTool {
    fn name(&self) -> &str {
        "ast_search"
    }
    fn description(&self) -> &str {
        "Structural search: shortcut names (functions, classes, imports, tests) \
         or a raw regex, matched line by line (regex-based approximation of AST search)."
    }
    fn parameters_schema(&self) -> Value {
        schema(
            serde_json::json!({
                "path": {"type": "string", "description": "Directory to search, relative to the workspace root"},
                "query": {"type": "string", "description": "functions | classes | imports | tests, or a raw regex"},
                "max_results": {"type": "number", "description": "Cap on the number of matches returned"},
            }),
            &["path", "query"],
        )
    }
    async fn invoke(&self, args: Value) -> ToolOutcome {
        let req: AstSearchRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::err(format!("invalid arguments: {e}")),
        };
        match ast_search(&self.workspace_root, req).await {
            Ok(v) => ToolOutcome::ok(v),
            Err(e) => ToolOutcome::err(e),
        }
    }
}

/// One-shot provisioner: assigns an environment to a session and triggers
/// sandbox creation. Registered only for turns where the session has no
/// environment yet; every subsequent turn replaces it with the operational
/// tool set (the caller building the per-turn registry enforces this, since
/// it's the one that knows whether `sandbox_manager.get(session_id)` is set).
pub struct SetupEnvironmentTool {
    pub sandbox_manager: Arc<SandboxManager>,
    pub session_id: String,
}

#[async_trait::async_trait]
impl Tool for SetupEnvironmentTool {
    fn name(&self) -> &str {
        "setup_environment"
    }
    fn description(&self) -> &str {
        "Provision this session's sandbox environment. Call this before any other tool."
    }
    fn parameters_schema(&self) -> Value {
        schema(serde_json::json!({}), &[])
    }
    async fn invoke(&self, _args: Value) -> ToolOutcome {
        match self.sandbox_manager.create(&self.session_id).await {
            Ok(_) => ToolOutcome::ok(serde_json::json!({"provisioned": true})),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Name→tool mapping with uniqueness on name; registration order doesn't
/// matter. Built fresh per turn from the session's configuration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any prior tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The model-facing schema for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub async fn invoke(&self, name: &str, args: Value) -> ToolOutcome {
        match self.get(name) {
            Some(tool) => tool.invoke(args).await,
            None => ToolOutcome::err(format!("no such tool: {name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxManager;
    use sa_domain::config::ExecSecurityConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn registry_exposes_definitions_for_registered_tools() {
        let root = TempDir::new().unwrap();
        let manager = Arc::new(SandboxManager::new(root.path(), 10));
        let sandbox = manager.create("s1").await.unwrap();
        let deny_list = Arc::new(DenyList::from_config(&ExecSecurityConfig::default()).unwrap());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BashTool {
            sandbox: sandbox.clone(),
            deny_list,
            default_timeout_sec: 30,
            max_output_chars: 200_000,
        }));
        registry.register(Arc::new(FileReadTool {
            workspace_root: sandbox.workspace_root().to_path_buf(),
        }));

        assert_eq!(registry.len(), 2);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert!(defs.iter().any(|d| d.name == "bash"));
        assert!(defs.iter().any(|d| d.name == "file_read"));
    }

    /// `definitions()` must produce the exact model-facing function-calling
    /// shape: each definition round-trips through JSON (the wire format
    /// every provider adapter serializes) with its parameter schema intact,
    /// not just a name that happens to match.
    #[tokio::test]
    async fn tool_definition_round_trips_schema_through_json() {
        let root = TempDir::new().unwrap();
        let manager = Arc::new(SandboxManager::new(root.path(), 10));
        let sandbox = manager.create("s1").await.unwrap();
        let deny_list = Arc::new(DenyList::from_config(&ExecSecurityConfig::default()).unwrap());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BashTool {
            sandbox: sandbox.clone(),
            deny_list,
            default_timeout_sec: 30,
            max_output_chars: 200_000,
        }));

        let def = registry
            .definitions()
            .into_iter()
            .find(|d| d.name == "bash")
            .unwrap();

        let wire = serde_json::to_value(&def).unwrap();
        let parsed: ToolDefinition = serde_json::from_value(wire.clone()).unwrap();

        assert_eq!(parsed.name, "bash");
        assert_eq!(parsed.description, def.description);

        let params = wire.get("parameters").unwrap();
        assert_eq!(params["type"], "object");
        assert!(params["properties"].get("command").is_some());
        assert!(params["required"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "command"));
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_a_failed_observation_not_a_panic() {
        let registry = ToolRegistry::new();
        let outcome = registry.invoke("does_not_exist", serde_json::json!({})).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn bash_tool_runs_through_registry() {
        let root = TempDir::new().unwrap();
        let manager = Arc::new(SandboxManager::new(root.path(), 10));
        let sandbox = manager.create("s1").await.unwrap();
        let deny_list = Arc::new(DenyList::from_config(&ExecSecurityConfig::default()).unwrap());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BashTool {
            sandbox,
            deny_list,
            default_timeout_sec: 30,
            max_output_chars: 200_000,
        }));

        let outcome = registry
            .invoke("bash", serde_json::json!({"command": "echo hi"}))
            .await;
        assert!(outcome.success);
        assert!(outcome.output.contains("hi"));
    }
}
