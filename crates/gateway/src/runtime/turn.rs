//! Spawns and drives a single agent turn: wires the agent loop's events
//! into the message orchestrator (visible open/stream/finalize
//! lifecycle) and the run store (the separate execution record behind
//! `/v1/runs`). This is the one piece of glue the HTTP/WS transport and
//! the `run` CLI command both need, so it lives here rather than in
//! either caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use uuid::Uuid;

use sa_domain::Result;

use super::agent_loop::{self, LoopContext, LoopEvent};
use super::persistence::{ToolActionRecord, ToolActionStatus};
use super::run_store::{NodeKind, Run, RunNode, RunStatus};
use super::task_registry::CancelToken;
use super::tools::{build_registry, ToolRegistryConfig};
use super::truncate_str;
use crate::state::AppState;

pub const SYSTEM_INSTRUCTIONS: &str = "You are SerialAgent, an autonomous coding agent. \
Use the available tools to inspect and modify the session's sandbox. \
Call setup_environment first if no sandbox has been provisioned yet.";

/// Start a new turn for `session_id` (the stable internal id; `session_key`
/// is only needed for the run record). Returns the minted assistant
/// message id and the run id tracking this turn's execution.
pub fn spawn_turn(
    state: &AppState,
    session_key: String,
    session_id: String,
    user_content: String,
    model: Option<String>,
) -> Result<(String, Uuid)> {
    let (provider, model_name) = state.resolve_provider(model.as_deref())?;
    let history = state.persistence.load_history(&session_id)?;
    let tools = Arc::new(build_registry(
        &state.sandbox_manager,
        &state.config.tools.exec_security,
        &session_id,
        &ToolRegistryConfig {
            default_timeout_sec: state.config.tools.exec.timeout_sec,
            max_output_chars: state.config.tools.exec.max_output_chars,
        },
    ));

    let message_id = state.orchestrator.open(&session_id, &user_content)?;

    let mut run = Run::new(session_key, session_id.clone(), &user_content);
    run.model = model_name.clone();
    run.status = RunStatus::Running;
    let run_id = state.run_store.insert(run);

    let ctx = LoopContext {
        provider,
        tools,
        model: model_name,
        system_instructions: SYSTEM_INSTRUCTIONS.to_string(),
        history,
        user_message: user_content,
        cancel: CancelToken::new(),
        max_iterations: state.config.tasks.max_iterations,
        tool_timeout: Duration::from_secs(state.config.tasks.tool_timeout_sec),
    };
    let cancel = ctx.cancel.clone();

    let state_task = state.clone();
    let session_id_task = session_id.clone();
    let message_id_task = message_id.clone();
    let handle = tokio::spawn(async move {
        drive_turn(state_task, session_id_task, message_id_task, run_id, ctx).await;
    });

    state
        .orchestrator
        .register_task(&session_id, message_id.clone(), handle, cancel);

    Ok((message_id, run_id))
}

/// Drive the loop to completion, translating each [`LoopEvent`] into an
/// orchestrator call (visible lifecycle) and a run-store update
/// (execution record). Runs inside the spawned task registered with
/// [`super::task_registry::TaskRegistry`].
async fn drive_turn(
    state: AppState,
    session_id: String,
    message_id: String,
    run_id: Uuid,
    ctx: LoopContext,
) {
    let mut events = agent_loop::run(ctx);
    let mut tool_actions: Vec<ToolActionRecord> = Vec::new();
    let mut node_id: u32 = 0;
    let mut open_node: Option<u32> = None;

    while let Some(event) = events.next().await {
        match event {
            LoopEvent::Thought { text, .. } => {
                state.orchestrator.thought(&session_id, &text);
            }
            LoopEvent::AnswerChunk { text, .. } => {
                state.orchestrator.chunk(&session_id, &message_id, &text);
            }
            LoopEvent::ActionChunk { .. } => {}
            LoopEvent::Action { tool, args, step } => {
                state.orchestrator.action(&session_id, &tool, &args, step);

                node_id += 1;
                open_node = Some(node_id);
                let node = RunNode {
                    node_id,
                    kind: NodeKind::ToolCall,
                    name: tool.clone(),
                    status: RunStatus::Running,
                    started_at: Utc::now(),
                    ended_at: None,
                    duration_ms: None,
                    input_preview: Some(truncate_str(&args.to_string(), 200)),
                    output_preview: None,
                    is_error: false,
                    input_tokens: 0,
                    output_tokens: 0,
                };
                state.run_store.update(&run_id, |r| r.nodes.push(node));

                tool_actions.push(ToolActionRecord {
                    id: Uuid::new_v4().to_string(),
                    message_id: message_id.clone(),
                    tool_name: tool,
                    input: args,
                    output: None,
                    status: ToolActionStatus::Success,
                });
            }
            LoopEvent::Observation { text, success, step } => {
                state.orchestrator.observation(&session_id, &text, success, step);

                if let Some(last) = tool_actions.last_mut() {
                    last.output = Some(text.clone());
                    last.status = if success {
                        ToolActionStatus::Success
                    } else {
                        ToolActionStatus::Error
                    };
                }

                if let Some(id) = open_node.take() {
                    let preview = truncate_str(&text, 200);
                    state.run_store.update(&run_id, |r| {
                        if let Some(node) = r.nodes.iter_mut().find(|n| n.node_id == id) {
                            node.status = if success {
                                RunStatus::Completed
                            } else {
                                RunStatus::Failed
                            };
                            node.ended_at = Some(Utc::now());
                            node.duration_ms = Some(
                                (Utc::now() - node.started_at).num_milliseconds().max(0) as u64,
                            );
                            node.output_preview = Some(preview);
                            node.is_error = !success;
                        }
                    });
                }
            }
            LoopEvent::Cancelled { .. } => {
                state.orchestrator.finalize_cancelled(&session_id, &message_id);
                finish_run(&state, run_id, RunStatus::Stopped, None);
                return;
            }
            LoopEvent::Error { message, .. } => {
                state
                    .orchestrator
                    .finalize_error(&session_id, &message_id, &message);
                finish_run(&state, run_id, RunStatus::Failed, Some(message));
                return;
            }
            LoopEvent::Done => {
                state
                    .orchestrator
                    .finalize_success(&session_id, &message_id, &tool_actions);
                finish_run(&state, run_id, RunStatus::Completed, None);
                return;
            }
        }
    }
}

fn finish_run(state: &AppState, run_id: Uuid, status: RunStatus, error: Option<String>) {
    state.run_store.update(&run_id, |r| {
        r.error = error;
        r.finish(status);
    });
    if let Some(run) = state.run_store.get(&run_id) {
        state.run_store.persist(&run);
    }
}
