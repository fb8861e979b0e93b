//! Shared application state passed to every API handler and to the CLI's
//! `run` command. Built once at startup by [`crate::bootstrap::build_app_state`].

use std::sync::Arc;

use sa_domain::config::Config;
use sa_domain::error::{Error, Result};
use sa_providers::{LanguageModel, ProviderRegistry};
use sa_sessions::{LifecycleManager, SessionStore, TranscriptWriter};
use sa_tools::SandboxManager;

use crate::runtime::{EventBus, MessageOrchestrator, MessagePersistence, RunStore, StreamingBuffer, TaskRegistry};

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM providers
/// - **Session management** — sessions, lifecycle, transcripts
/// - **Agent runtime** — sandboxes, streaming buffer, tasks, events,
///   persistence, the orchestrator built on top of them, and the
///   separate run-execution record
/// - **Security** — the precomputed API bearer token (startup-read)
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub transcripts: Arc<TranscriptWriter>,

    // ── Agent runtime ─────────────────────────────────────────────────
    pub sandbox_manager: Arc<SandboxManager>,
    pub streaming_buffer: Arc<StreamingBuffer>,
    pub task_registry: Arc<TaskRegistry>,
    pub event_bus: Arc<EventBus>,
    pub persistence: Arc<MessagePersistence>,
    pub orchestrator: Arc<MessageOrchestrator>,
    pub run_store: Arc<RunStore>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// The API bearer token, read once at startup from the env var named
    /// by `config.auth.token_env`. `None` means the gate is open — no
    /// token was configured, so every request is accepted unauthenticated.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    /// Resolve which provider and model name a turn should use.
    ///
    /// `model_override` is either `"provider_id/model_name"`, a bare
    /// `"provider_id"` (uses that provider's configured default model),
    /// or `None` (uses the first configured provider and its default
    /// model). Returns [`Error::Config`] if no provider matches, or if
    /// no providers are configured at all.
    pub fn resolve_provider(
        &self,
        model_override: Option<&str>,
    ) -> Result<(Arc<dyn LanguageModel>, Option<String>)> {
        let (provider_id, model_name) = match model_override {
            Some(spec) => match spec.split_once('/') {
                Some((provider, model)) => (provider.to_string(), Some(model.to_string())),
                None => (spec.to_string(), None),
            },
            None => {
                let first = self
                    .llm
                    .list_providers()
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::Config("no LLM providers configured".into()))?;
                (first, None)
            }
        };

        let provider = self
            .llm
            .get(&provider_id)
            .ok_or_else(|| Error::Config(format!("unknown LLM provider: {provider_id}")))?;

        Ok((provider, model_name))
    }
}
