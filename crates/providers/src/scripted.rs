//! An in-memory `LanguageModel` that replays a fixed script of responses.
//!
//! Used by gateway and agent-loop integration tests so they can exercise
//! multi-turn tool-calling behavior without a network-backed provider.

use crate::traits::{ChatRequest, ChatResponse, LanguageModel};
use futures_util::stream;
use sa_domain::error::{Error, Result};
use sa_domain::stream::{BoxStream, StreamEvent, Usage};
use sa_domain::tool::ToolCall;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted turn: either a final text answer or a tool call to make.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Text(String),
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
}

/// Replays `turns` in order, one per `chat`/`stream` call. Calls past the
/// end of the script repeat the last turn, so tests don't need to size the
/// script exactly to the number of loop iterations they expect.
pub struct ScriptedProvider {
    id: String,
    turns: Vec<ScriptedTurn>,
    cursor: AtomicUsize,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(id: impl Into<String>, turns: Vec<ScriptedTurn>) -> Self {
        Self {
            id: id.into(),
            turns,
            cursor: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A provider that always answers with the same fixed text.
    pub fn fixed_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, vec![ScriptedTurn::Text(text.into())])
    }

    /// Number of `chat`/`stream` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls mutex poisoned").len()
    }

    fn next_turn(&self) -> ScriptedTurn {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let last = self.turns.len().saturating_sub(1);
        self.turns[idx.min(last)].clone()
    }

    fn record(&self, req: &ChatRequest) {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(req.clone());
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        if self.turns.is_empty() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: "scripted provider has no turns configured".into(),
            });
        }
        self.record(&req);
        let turn = self.next_turn();
        let model = req.model.unwrap_or_else(|| "scripted".into());

        Ok(match turn {
            ScriptedTurn::Text(text) => ChatResponse {
                content: text,
                tool_calls: Vec::new(),
                usage: Some(Usage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                }),
                model,
                finish_reason: Some("stop".into()),
            },
            ScriptedTurn::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                }],
                usage: Some(Usage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                }),
                model,
                finish_reason: Some("tool_calls".into()),
            },
        })
    }

    async fn stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        if self.turns.is_empty() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: "scripted provider has no turns configured".into(),
            });
        }
        self.record(&req);
        let turn = self.next_turn();

        let events: Vec<Result<StreamEvent>> = match turn {
            ScriptedTurn::Text(text) => vec![
                Ok(StreamEvent::Token { text }),
                Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("stop".into()),
                }),
            ],
            ScriptedTurn::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => vec![
                Ok(StreamEvent::ToolCallStarted {
                    call_id: call_id.clone(),
                    tool_name: tool_name.clone(),
                }),
                Ok(StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                }),
                Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("tool_calls".into()),
                }),
            ],
        };

        Ok(Box::pin(stream::iter(events)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn fixed_text_replays_same_answer() {
        let provider = ScriptedProvider::fixed_text("p1", "hello there");
        let resp = provider.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(resp.content, "hello there");
        let resp2 = provider.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(resp2.content, "hello there");
    }

    #[tokio::test]
    async fn script_advances_then_holds_on_last_turn() {
        let provider = ScriptedProvider::new(
            "p1",
            vec![
                ScriptedTurn::Text("first".into()),
                ScriptedTurn::Text("second".into()),
            ],
        );
        assert_eq!(provider.chat(ChatRequest::default()).await.unwrap().content, "first");
        assert_eq!(provider.chat(ChatRequest::default()).await.unwrap().content, "second");
        assert_eq!(provider.chat(ChatRequest::default()).await.unwrap().content, "second");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn stream_emits_tool_call_then_done() {
        let provider = ScriptedProvider::new(
            "p1",
            vec![ScriptedTurn::ToolCall {
                call_id: "c1".into(),
                tool_name: "bash".into(),
                arguments: serde_json::json!({"command": "ls"}),
            }],
        );
        let mut events = provider.stream(ChatRequest::default()).await.unwrap();
        let first = events.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::ToolCallStarted { .. }));
        let second = events.next().await.unwrap().unwrap();
        assert!(matches!(second, StreamEvent::ToolCallFinished { .. }));
        let third = events.next().await.unwrap().unwrap();
        assert!(matches!(third, StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn empty_script_errors() {
        let provider = ScriptedProvider::new("p1", vec![]);
        assert!(provider.chat(ChatRequest::default()).await.is_err());
    }
}
