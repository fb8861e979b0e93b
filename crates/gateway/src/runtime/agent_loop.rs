//! The reasoning driver: interleaves model streaming with tool
//! invocation until the model answers with no further tool call, up to
//! `max_iterations`. Deliberately avoids a dedicated "tool" role turn —
//! some providers don't support one — so tool output is fed back as a
//! synthetic user turn instead, keeping the loop backend-uniform.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::StreamExt;
use serde_json::{json, Value};

use sa_domain::stream::{BoxStream, StreamEvent};
use sa_domain::tool::Message;
use sa_providers::{ChatRequest, LanguageModel};
use sa_tools::{ToolOutcome, ToolRegistry};

use super::task_registry::CancelToken;

#[derive(Debug, Clone)]
pub enum LoopEvent {
    Thought { text: String, step: usize },
    ActionChunk { args_delta: String, step: usize },
    Action { tool: String, args: Value, step: usize },
    Observation { text: String, success: bool, step: usize },
    AnswerChunk { text: String, step: usize },
    Cancelled { partial: Option<String> },
    Error { message: String, step: usize },
    Done,
}

pub struct LoopContext {
    pub provider: Arc<dyn LanguageModel>,
    pub tools: Arc<ToolRegistry>,
    pub model: Option<String>,
    pub system_instructions: String,
    pub history: Vec<Message>,
    pub user_message: String,
    pub cancel: CancelToken,
    pub max_iterations: usize,
    pub tool_timeout: Duration,
}

/// Drive one turn to completion, yielding [`LoopEvent`]s as they occur.
/// Tool schemas reach the model through `ChatRequest.tools` — there is
/// no need to inline a textual description of them into the system
/// prompt, since the provider layer projects each `ToolDefinition` into
/// the wire-level function-calling shape itself.
pub fn run(ctx: LoopContext) -> BoxStream<'static, LoopEvent> {
    let s = stream! {
        let mut messages = Vec::with_capacity(ctx.history.len() + 2);
        messages.push(Message::system(ctx.system_instructions.clone()));
        messages.extend(ctx.history.iter().cloned());
        messages.push(Message::user(ctx.user_message.clone()));

        let tool_defs = ctx.tools.definitions();

        for step in 1..=ctx.max_iterations {
            if ctx.cancel.is_cancelled() {
                yield LoopEvent::Cancelled { partial: None };
                return;
            }

            let req = ChatRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                temperature: Some(0.2),
                max_tokens: None,
                model: ctx.model.clone(),
            };

            let mut events = match ctx.provider.stream(req).await {
                Ok(events) => events,
                Err(e) => {
                    yield LoopEvent::Error { message: e.to_string(), step };
                    return;
                }
            };

            let mut response_text = String::new();
            let mut tool_name: Option<String> = None;
            let mut args_json = String::new();
            let mut stream_error: Option<String> = None;

            while let Some(event) = events.next().await {
                if ctx.cancel.is_cancelled() {
                    yield LoopEvent::Cancelled { partial: Some(response_text.clone()) };
                    return;
                }

                match event {
                    Ok(StreamEvent::Token { text }) => {
                        response_text.push_str(&text);
                        yield LoopEvent::AnswerChunk { text, step };
                    }
                    Ok(StreamEvent::Thinking { text }) => {
                        yield LoopEvent::Thought { text, step };
                    }
                    Ok(StreamEvent::ToolCallStarted { tool_name: name, .. }) => {
                        if tool_name.is_none() {
                            tool_name = Some(name);
                        }
                    }
                    Ok(StreamEvent::ToolCallDelta { delta, .. }) => {
                        args_json.push_str(&delta);
                        yield LoopEvent::ActionChunk { args_delta: delta, step };
                    }
                    Ok(StreamEvent::ToolCallFinished { tool_name: name, arguments, .. }) => {
                        if tool_name.is_none() {
                            tool_name = Some(name);
                        }
                        if args_json.is_empty() {
                            args_json = arguments.to_string();
                        }
                    }
                    Ok(StreamEvent::Done { .. }) => break,
                    Ok(StreamEvent::Error { message }) => {
                        stream_error = Some(message);
                        break;
                    }
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break;
                    }
                }
            }

            if let Some(message) = stream_error {
                yield LoopEvent::Error { message, step };
                return;
            }

            match tool_name {
                Some(name) if ctx.tools.get(&name).is_some() => {
                    let args: Value = if args_json.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&args_json).unwrap_or_else(|_| json!({}))
                    };

                    yield LoopEvent::Action { tool: name.clone(), args: args.clone(), step };

                    let outcome = match tokio::time::timeout(
                        ctx.tool_timeout,
                        ctx.tools.invoke(&name, args),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => ToolOutcome::err(format!(
                            "tool '{name}' timed out after {}s",
                            ctx.tool_timeout.as_secs()
                        )),
                    };

                    yield LoopEvent::Observation {
                        text: outcome.output.clone(),
                        success: outcome.success,
                        step,
                    };

                    messages.push(Message::user(format!(
                        "Tool '{name}' returned: {}",
                        outcome.output
                    )));
                }
                Some(unknown) => {
                    let text = format!("no such tool: {unknown}");
                    yield LoopEvent::Observation { text: text.clone(), success: false, step };
                    messages.push(Message::user(format!("Tool '{unknown}' returned: {text}")));
                }
                None if !response_text.is_empty() => {
                    yield LoopEvent::Done;
                    return;
                }
                None => {
                    yield LoopEvent::Error {
                        message: "Agent did not provide a response".into(),
                        step,
                    };
                    return;
                }
            }
        }

        yield LoopEvent::AnswerChunk {
            text: "\n\n(Reached maximum iterations without a final answer.)".into(),
            step: ctx.max_iterations,
        };
        yield LoopEvent::Done;
    };

    Box::pin(s)
}
