//! `serialagent run` — one-shot execution command.
//!
//! Sends a single message to the agent, streams the response to stdout,
//! and exits. Useful for scripting, piping, and quick CLI interactions.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use uuid::Uuid;

use sa_domain::config::Config;

use crate::bootstrap;
use crate::runtime::persistence::{ToolActionRecord, ToolActionStatus};
use crate::runtime::task_registry::CancelToken;
use crate::runtime::{agent_loop, LoopContext, LoopEvent};
use crate::runtime::tools::{build_registry, ToolRegistryConfig};

const SYSTEM_INSTRUCTIONS: &str = "You are SerialAgent, an autonomous coding agent. \
Use the available tools to inspect and modify the session's sandbox. \
Call setup_environment first if no sandbox has been provisioned yet.";

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RunEventJson {
    Thought { text: String },
    Action { tool: String, args: serde_json::Value },
    Observation { text: String, success: bool },
    AnswerChunk { text: String },
    Error { message: String },
    Cancelled,
    Done,
}

/// Execute a single agent turn and print the response.
///
/// This is the entry point for `serialagent run "message"`.
pub async fn run(
    config: Arc<Config>,
    message: String,
    session_key: String,
    model: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    // 1. Boot the full runtime (without background tasks).
    let state = bootstrap::build_app_state(config).await?;

    // 2. Resolve or create the session, honoring the idle-reset policy.
    let (mut entry, _is_new) = state.sessions.resolve_or_create(&session_key);
    if let Some(reason) = state.lifecycle.should_reset(&entry, chrono::Utc::now()) {
        tracing::info!(session_key, %reason, "resetting session");
        if let Some(reset) = state.sessions.reset_session(&session_key, &reason.to_string()) {
            entry = reset;
        }
    }
    let session_id = entry.session_id.clone();

    // 3. Resolve provider/model and load prior turns for context.
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

    // 4. Persist the user message up front, same as the HTTP/WS path.
    let user_message_id = Uuid::new_v4().to_string();
    state
        .persistence
        .persist_user_message(&session_id, &user_message_id, &message)?;

    let ctx = LoopContext {
        provider,
        tools,
        model: model_name,
        system_instructions: SYSTEM_INSTRUCTIONS.to_string(),
        history,
        user_message: message,
        cancel: CancelToken::new(),
        max_iterations: state.config.tasks.max_iterations,
        tool_timeout: Duration::from_secs(state.config.tasks.tool_timeout_sec),
    };

    // 5. Drive the loop, printing events to stdout/stderr as they occur.
    let mut events = agent_loop::run(ctx);
    let mut content = String::new();
    let mut tool_actions: Vec<ToolActionRecord> = Vec::new();
    let mut collected: Vec<RunEventJson> = Vec::new();
    let mut exit_code: i32 = 0;
    let assistant_message_id = Uuid::new_v4().to_string();
    let mut terminal: Option<&str> = None;

    while let Some(event) = events.next().await {
        match event {
            LoopEvent::AnswerChunk { text, .. } => {
                content.push_str(&text);
                if json_output {
                    collected.push(RunEventJson::AnswerChunk { text });
                } else {
                    print!("{text}");
                    std::io::stdout().flush().ok();
                }
            }
            LoopEvent::Thought { text, .. } => {
                if json_output {
                    collected.push(RunEventJson::Thought { text });
                } else {
                    eprint!("\x1b[2m{text}\x1b[0m");
                    std::io::stderr().flush().ok();
                }
            }
            LoopEvent::Action { tool, args, .. } => {
                tool_actions.push(ToolActionRecord {
                    id: Uuid::new_v4().to_string(),
                    message_id: assistant_message_id.clone(),
                    tool_name: tool.clone(),
                    input: args.clone(),
                    output: None,
                    status: ToolActionStatus::Success,
                });
                if json_output {
                    collected.push(RunEventJson::Action { tool, args });
                } else {
                    eprintln!("\x1b[2m[tool: {tool}]\x1b[0m");
                }
            }
            LoopEvent::Observation { text, success, .. } => {
                if let Some(last) = tool_actions.last_mut() {
                    last.output = Some(text.clone());
                    last.status = if success {
                        ToolActionStatus::Success
                    } else {
                        ToolActionStatus::Error
                    };
                }
                if json_output {
                    collected.push(RunEventJson::Observation { text, success });
                }
            }
            LoopEvent::Error { message, .. } => {
                if json_output {
                    collected.push(RunEventJson::Error { message: message.clone() });
                } else {
                    eprintln!("error: {message}");
                }
                state
                    .persistence
                    .finalize_error(&session_id, &assistant_message_id, &content, &message)?;
                terminal = Some("error");
                exit_code = 1;
            }
            LoopEvent::Cancelled { .. } => {
                if json_output {
                    collected.push(RunEventJson::Cancelled);
                }
                state
                    .persistence
                    .finalize_cancelled(&session_id, &assistant_message_id, &content)?;
                terminal = Some("cancelled");
            }
            LoopEvent::Done => {
                if json_output {
                    collected.push(RunEventJson::Done);
                } else {
                    println!();
                }
                state.persistence.finalize_success(
                    &session_id,
                    &assistant_message_id,
                    &content,
                    &tool_actions,
                )?;
                terminal = Some("done");
            }
        }
    }

    if terminal.is_none() {
        // The stream ended without a terminal event (shouldn't happen,
        // but leaving the message unfinalized would hide it forever).
        state
            .persistence
            .finalize_error(&session_id, &assistant_message_id, &content, "loop ended without a terminal event")?;
    }

    state.sessions.touch(&session_key);

    if json_output {
        let json = serde_json::to_string_pretty(&collected)
            .map_err(|e| anyhow::anyhow!("serializing events: {e}"))?;
        println!("{json}");
    }

    // Flush the session store before exit.
    if let Err(e) = state.sessions.flush() {
        tracing::warn!(error = %e, "session store flush on exit failed");
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
