//! AppState construction and background-task spawning extracted from
//! `main.rs`.
//!
//! This module exposes two public functions that CLI commands (`serve`,
//! `run`) share so they can boot the full runtime without an HTTP
//! listener.

use std::sync::Arc;

use anyhow::Context;

use sa_domain::config::{Config, ConfigSeverity};
use sa_providers::ProviderRegistry;
use sa_sessions::{LifecycleManager, SessionStore, TranscriptWriter};
use sa_tools::SandboxManager;

use crate::runtime::{EventBus, MessageOrchestrator, MessagePersistence, RunStore, StreamingBuffer, TaskRegistry};
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`]. This is the shared "boot" path used by `serve` and `run`.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── LLM providers ────────────────────────────────────────────────
    let llm =
        Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if llm.is_empty() {
        tracing::info!("no LLM providers initialized — configure API keys to enable chat");
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }

    // ── Session management ───────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&config.workspace.state_path).context("initializing session store")?,
    );
    let lifecycle = Arc::new(LifecycleManager::new(config.sessions.lifecycle.clone()));
    let transcript_dir = sessions.transcript_dir();
    let transcripts = Arc::new(TranscriptWriter::new(&transcript_dir));
    tracing::info!(agent_id = %config.sessions.agent_id, "session management ready");

    // ── Sandboxes ─────────────────────────────────────────────────────
    let sandbox_manager = Arc::new(SandboxManager::new(
        config.workspace.path.clone(),
        config.tools.sandbox.pool_size,
    ));
    tracing::info!(
        pool_size = config.tools.sandbox.pool_size,
        "sandbox manager ready"
    );

    // ── Agent runtime singletons ──────────────────────────────────────
    let streaming_buffer = Arc::new(StreamingBuffer::new());
    let task_registry = Arc::new(TaskRegistry::new());
    let event_bus = Arc::new(EventBus::new());
    let persistence = Arc::new(MessagePersistence::new(transcripts.clone()));
    let orchestrator = Arc::new(MessageOrchestrator::new(
        streaming_buffer.clone(),
        task_registry.clone(),
        event_bus.clone(),
        persistence.clone(),
    ));
    let run_store = Arc::new(RunStore::new(&config.workspace.state_path));
    tracing::info!("agent runtime ready");

    // ── API token (read once at startup) ─────────────────────────────
    let api_token = match std::env::var(&config.auth.token_env) {
        Ok(t) if !t.is_empty() => {
            tracing::info!(env = %config.auth.token_env, "API bearer-token auth enabled");
            Some(Arc::<str>::from(t))
        }
        _ => {
            tracing::warn!(
                env = %config.auth.token_env,
                "API bearer-token auth DISABLED — set the env var to require a token"
            );
            None
        }
    };

    Ok(AppState {
        config,
        llm,
        sessions,
        lifecycle,
        transcripts,
        sandbox_manager,
        streaming_buffer,
        task_registry,
        event_bus,
        persistence,
        orchestrator,
        run_store,
        api_token,
    })
}

/// Spawn the long-running background tokio tasks (session flush, task
/// registry garbage collection). Call this **after** [`build_app_state`]
/// when running the HTTP server; the `run` CLI command skips it since
/// the process exits after one turn anyway.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic session flush ───────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.flush() {
                    tracing::warn!(error = %e, "session store flush failed");
                }
            }
        });
    }

    // ── Periodic task registry garbage collection ────────────────────
    {
        let task_registry = state.task_registry.clone();
        let gc_max_age = std::time::Duration::from_secs(state.config.tasks.gc_max_age_sec);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                task_registry.gc(gc_max_age);
            }
        });
    }

    tracing::info!("background tasks spawned");
}
