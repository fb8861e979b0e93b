//! Builds the per-turn [`ToolRegistry`] the agent loop dispatches
//! against. A session with no provisioned sandbox only sees
//! `setup_environment` — the loop must call it before anything else
//! becomes available; once a sandbox exists, the full operational tool
//! set is bound to it.

use std::sync::Arc;

use sa_domain::config::ExecSecurityConfig;
use sa_tools::registry::{
    AstSearchTool, BashTool, FileEditTool, FileReadTool, FileWriteTool, SearchTool,
    SetupEnvironmentTool,
};
use sa_tools::{DenyList, SandboxManager, ToolRegistry};

pub struct ToolRegistryConfig {
    pub default_timeout_sec: u64,
    pub max_output_chars: usize,
}

impl Default for ToolRegistryConfig {
    fn default() -> Self {
        Self {
            default_timeout_sec: 30,
            max_output_chars: 200_000,
        }
    }
}

/// Build the tool registry for one turn. `session_id` identifies the
/// sandbox (if any) to bind operational tools to.
pub fn build_registry(
    sandbox_manager: &Arc<SandboxManager>,
    exec_security: &ExecSecurityConfig,
    session_id: &str,
    cfg: &ToolRegistryConfig,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    match sandbox_manager.get(session_id) {
        Some(sandbox) => {
            let deny_list = match DenyList::from_config(exec_security) {
                Ok(d) => Arc::new(d),
                Err(e) => {
                    tracing::error!(error = %e, "invalid deny-list pattern in config; denying no commands");
                    Arc::new(DenyList::from_config(&ExecSecurityConfig::default()).expect(
                        "default ExecSecurityConfig must compile",
                    ))
                }
            };
            let workspace_root = sandbox.workspace_root().to_path_buf();

            registry.register(Arc::new(BashTool {
                sandbox: sandbox.clone() as Arc<dyn sa_tools::Sandbox>,
                deny_list,
                default_timeout_sec: cfg.default_timeout_sec,
                max_output_chars: cfg.max_output_chars,
            }));
            registry.register(Arc::new(FileReadTool {
                workspace_root: workspace_root.clone(),
            }));
            registry.register(Arc::new(FileWriteTool {
                workspace_root: workspace_root.clone(),
            }));
            registry.register(Arc::new(FileEditTool {
                workspace_root: workspace_root.clone(),
            }));
            registry.register(Arc::new(SearchTool {
                workspace_root: workspace_root.clone(),
            }));
            registry.register(Arc::new(AstSearchTool { workspace_root }));
        }
        None => {
            registry.register(Arc::new(SetupEnvironmentTool {
                sandbox_manager: sandbox_manager.clone(),
                session_id: session_id.to_string(),
            }));
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unprovisioned_session_only_sees_setup_environment() {
        let root = TempDir::new().unwrap();
        let manager = Arc::new(SandboxManager::new(root.path(), 10));
        let registry = build_registry(
            &manager,
            &ExecSecurityConfig::default(),
            "s1",
            &ToolRegistryConfig::default(),
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.get("setup_environment").is_some());
    }

    #[tokio::test]
    async fn provisioned_session_sees_operational_tools() {
        let root = TempDir::new().unwrap();
        let manager = Arc::new(SandboxManager::new(root.path(), 10));
        manager.create("s1").await.unwrap();

        let registry = build_registry(
            &manager,
            &ExecSecurityConfig::default(),
            "s1",
            &ToolRegistryConfig::default(),
        );

        for name in ["bash", "file_read", "file_write", "file_edit", "search", "ast_search"] {
            assert!(registry.get(name).is_some(), "missing tool: {name}");
        }
        assert!(registry.get("setup_environment").is_none());
    }
}
