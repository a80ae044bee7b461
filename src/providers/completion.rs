//! Chat completion providers, blocking and token-streaming.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::types::{ChatMessage, SiteChatError};

/// Stream of answer fragments; each item is a token run or a terminal error.
pub type TokenStream = BoxStream<'static, Result<String, SiteChatError>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Runs one completion to finish and returns the whole answer.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, SiteChatError>;

    /// Runs one completion and yields answer fragments as they arrive.
    /// After an `Err` item the stream ends.
    async fn complete_stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<TokenStream, SiteChatError>;
}

/// Client for any endpoint speaking the OpenAI `/chat/completions` protocol.
pub struct OpenAiCompletionProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompletionProvider {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SiteChatError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| SiteChatError::Completion(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn request_body(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
        stream: bool,
    ) -> serde_json::Value {
        let mut wire: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        wire.push(json!({ "role": ChatMessage::SYSTEM, "content": system }));
        wire.extend(
            messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );
        json!({
            "model": self.model,
            "messages": wire,
            "temperature": temperature,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, SiteChatError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SiteChatError::Completion(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SiteChatError::Completion(format!(
                "completion endpoint returned {status}: {detail}"
            )));
        }
        Ok(response)
    }
}

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    pending: VecDeque<Result<String, SiteChatError>>,
    finished: bool,
}

impl SseState {
    /// Drains complete lines out of the buffer into the pending queue.
    fn consume_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                self.finished = true;
                return;
            }
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => {
                    if let Some(content) = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                    {
                        if !content.is_empty() {
                            self.pending.push_back(Ok(content));
                        }
                    }
                }
                Err(e) => {
                    self.pending.push_back(Err(SiteChatError::Completion(format!(
                        "malformed stream chunk: {e}"
                    ))));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, SiteChatError> {
        debug!(model = %self.model, turns = messages.len(), "running completion");
        let body = self.request_body(system, messages, temperature, false);
        let parsed: ChatResponse = self
            .send(&body)
            .await?
            .json()
            .await
            .map_err(|e| SiteChatError::Completion(format!("malformed completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SiteChatError::Completion("completion response had no content".into()))
    }

    async fn complete_stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<TokenStream, SiteChatError> {
        debug!(model = %self.model, turns = messages.len(), "running streaming completion");
        let body = self.request_body(system, messages, temperature, true);
        let response = self.send(&body).await?;

        let state = SseState {
            bytes: response.bytes_stream().boxed(),
            buffer: String::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let tokens = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                        state.consume_lines();
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((
                            Err(SiteChatError::Completion(format!("stream interrupted: {e}"))),
                            state,
                        ));
                    }
                    None => {
                        state.finished = true;
                    }
                }
            }
        });
        Ok(tokens.boxed())
    }
}

/// Scripted provider for tests: a fixed answer streamed word by word, or a
/// failure after an optional number of good tokens.
pub struct MockCompletionProvider {
    answer: String,
    fail_after: Option<usize>,
}

impl MockCompletionProvider {
    pub fn with_answer(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail_after: None,
        }
    }

    /// Emits `tokens` good fragments, then one error.
    pub fn failing_after(answer: impl Into<String>, tokens: usize) -> Self {
        Self {
            answer: answer.into(),
            fail_after: Some(tokens),
        }
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, SiteChatError> {
        match self.fail_after {
            Some(_) => Err(SiteChatError::Completion("scripted failure".into())),
            None => Ok(self.answer.clone()),
        }
    }

    async fn complete_stream(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<TokenStream, SiteChatError> {
        let mut items: Vec<Result<String, SiteChatError>> = self
            .answer
            .split_whitespace()
            .map(|w| Ok(format!("{w} ")))
            .collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(SiteChatError::Completion("scripted failure".into())));
        }
        Ok(stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines_become_tokens_in_order() {
        let mut state = SseState {
            bytes: stream::empty().boxed(),
            buffer: String::new(),
            pending: VecDeque::new(),
            finished: false,
        };
        state.buffer.push_str(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
            "data: [DONE]\n",
        ));
        state.consume_lines();

        let tokens: Vec<_> = state
            .pending
            .iter()
            .map(|r| r.as_ref().unwrap().clone())
            .collect();
        assert_eq!(tokens, vec!["Hel", "lo"]);
        assert!(state.finished);
    }

    #[test]
    fn partial_line_stays_buffered() {
        let mut state = SseState {
            bytes: stream::empty().boxed(),
            buffer: "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]".to_string(),
            pending: VecDeque::new(),
            finished: false,
        };
        state.consume_lines();
        assert!(state.pending.is_empty());
        assert!(!state.buffer.is_empty());

        state.buffer.push_str("}\n");
        state.consume_lines();
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn malformed_chunk_ends_the_stream_with_an_error() {
        let mut state = SseState {
            bytes: stream::empty().boxed(),
            buffer: "data: not json\n".to_string(),
            pending: VecDeque::new(),
            finished: false,
        };
        state.consume_lines();
        assert!(state.finished);
        assert!(matches!(
            state.pending.pop_front(),
            Some(Err(SiteChatError::Completion(_)))
        ));
    }

    #[tokio::test]
    async fn mock_streams_words_then_stops() {
        let provider = MockCompletionProvider::with_answer("alpha beta gamma");
        let stream = provider.complete_stream("", &[], 0.3).await.unwrap();
        let tokens: Vec<_> = stream.collect::<Vec<_>>().await;
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| t.is_ok()));
    }

    #[tokio::test]
    async fn mock_failure_ends_with_a_single_error() {
        let provider = MockCompletionProvider::failing_after("alpha beta gamma", 2);
        let stream = provider.complete_stream("", &[], 0.3).await.unwrap();
        let tokens: Vec<_> = stream.collect::<Vec<_>>().await;
        assert_eq!(tokens.len(), 3);
        assert!(tokens[0].is_ok() && tokens[1].is_ok());
        assert!(tokens[2].is_err());
    }
}
