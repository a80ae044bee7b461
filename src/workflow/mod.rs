//! Two-stage chat workflow: retrieve passages, then compose a grounded,
//! cited answer.

pub mod events;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::index::{KnowledgeIndex, RetrievalResult};
use crate::providers::CompletionProvider;
use crate::types::{ChatMessage, SiteChatError};

pub use events::ChatStreamEvent;

/// Composition prompt. The model must stay inside the retrieved context and
/// cite sources by their bracketed numbers.
const SYSTEM_DIRECTIVE: &str = "\
You are a helpful assistant answering questions about a specific website. \
Answer using ONLY the information in the numbered context sources below. \
Cite the sources you used by their numbers, like [Source 2]. \
If the context does not contain the answer, say so plainly instead of guessing.";

const COMPOSE_TEMPERATURE: f32 = 0.3;

/// History cap applied by the API and CLI boundaries. The workflow itself
/// forwards whatever history it is handed.
pub const MAX_HISTORY: usize = 10;

/// One cited source page, with every section heading that contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub url: String,
    pub title: String,
    pub headings: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub text: String,
    pub citations: Vec<SourceCitation>,
}

/// Builds the numbered context block the model answers from.
fn build_context(retrieval: &RetrievalResult) -> String {
    let mut context = String::new();
    for (i, scored) in retrieval.matches.iter().enumerate() {
        let passage = &scored.passage;
        context.push_str(&format!("[Source {}] {}", i + 1, passage.source_title));
        if let Some(heading) = &passage.heading {
            context.push_str(&format!(" - {heading}"));
        }
        context.push('\n');
        context.push_str(&format!("URL: {}\n", passage.source_url));
        context.push_str(&format!("Content: {}\n\n", passage.text));
    }
    context
}

/// Groups matches into one citation per URL, ordered by first appearance in
/// the ranking, collecting the headings of every contributing passage.
fn citations(retrieval: &RetrievalResult) -> Vec<SourceCitation> {
    let mut citations: Vec<SourceCitation> = Vec::new();
    for scored in &retrieval.matches {
        let passage = &scored.passage;
        match citations.iter_mut().find(|c| c.url == passage.source_url) {
            Some(existing) => {
                if let Some(heading) = &passage.heading {
                    existing.headings.insert(heading.clone());
                }
            }
            None => {
                citations.push(SourceCitation {
                    url: passage.source_url.clone(),
                    title: passage.source_title.clone(),
                    headings: passage.heading.iter().cloned().collect(),
                });
            }
        }
    }
    citations
}

/// Keeps only the most recent [`MAX_HISTORY`] messages.
pub fn clamp_history(history: &[ChatMessage]) -> &[ChatMessage] {
    let skip = history.len().saturating_sub(MAX_HISTORY);
    &history[skip..]
}

/// Search then compose, as one reusable unit behind the API and CLI.
pub struct ChatWorkflow {
    index: Arc<KnowledgeIndex>,
    completion: Arc<dyn CompletionProvider>,
}

impl ChatWorkflow {
    pub fn new(index: Arc<KnowledgeIndex>, completion: Arc<dyn CompletionProvider>) -> Self {
        Self { index, completion }
    }

    fn compose_messages(
        &self,
        query: &str,
        history: &[ChatMessage],
        context: &str,
    ) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = history.to_vec();
        messages.push(ChatMessage::user(format!(
            "Context sources:\n\n{context}Question: {query}"
        )));
        messages
    }

    /// Runs a full turn and returns the complete answer with citations.
    /// A completion failure is surfaced as an error, never papered over
    /// with a fabricated answer.
    pub async fn process_query(
        &self,
        query: &str,
        history: &[ChatMessage],
        top_k: usize,
    ) -> Result<Answer, SiteChatError> {
        let retrieval = self.index.search(query, top_k).await?;
        debug!(
            matches = retrieval.matches.len(),
            sources = retrieval.distinct_source_urls.len(),
            "retrieval complete"
        );

        let context = build_context(&retrieval);
        let messages = self.compose_messages(query, history, &context);
        let text = self
            .completion
            .complete(SYSTEM_DIRECTIVE, &messages, COMPOSE_TEMPERATURE)
            .await?;

        Ok(Answer {
            query: query.to_string(),
            text,
            citations: citations(&retrieval),
        })
    }

    /// Runs a full turn, emitting events on the returned channel. Dropping
    /// the receiver cancels the turn. Event order: `status(searching)`,
    /// `sources`, `status(composing)`, `token`*, then `complete`; any
    /// failure emits a single `error` in place of further tokens, followed
    /// by the terminal `complete`.
    pub fn process_query_stream(
        self: &Arc<Self>,
        query: String,
        history: Vec<ChatMessage>,
        top_k: usize,
    ) -> mpsc::Receiver<ChatStreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let workflow = Arc::clone(self);

        tokio::spawn(async move {
            workflow.run_stream(query, history, top_k, tx).await;
        });
        rx
    }

    async fn run_stream(
        &self,
        query: String,
        history: Vec<ChatMessage>,
        top_k: usize,
        tx: mpsc::Sender<ChatStreamEvent>,
    ) {
        // A send failing means the client went away; stop quietly.
        macro_rules! emit {
            ($event:expr) => {
                if tx.send($event).await.is_err() {
                    return;
                }
            };
        }

        emit!(ChatStreamEvent::Status {
            state: "searching".to_string(),
        });

        let retrieval = match self.index.search(&query, top_k).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                warn!(error = %e, "retrieval failed during streaming turn");
                emit!(ChatStreamEvent::Error {
                    error: e.to_string(),
                });
                emit!(ChatStreamEvent::Complete { query });
                return;
            }
        };

        emit!(ChatStreamEvent::Sources {
            sources: citations(&retrieval),
        });
        emit!(ChatStreamEvent::Status {
            state: "composing".to_string(),
        });

        let context = build_context(&retrieval);
        let messages = self.compose_messages(&query, &history, &context);
        let stream = self
            .completion
            .complete_stream(SYSTEM_DIRECTIVE, &messages, COMPOSE_TEMPERATURE)
            .await;

        match stream {
            Ok(mut tokens) => {
                while let Some(item) = tokens.next().await {
                    match item {
                        Ok(content) => emit!(ChatStreamEvent::Token { content }),
                        Err(e) => {
                            warn!(error = %e, "completion failed mid-stream");
                            emit!(ChatStreamEvent::Error {
                                error: e.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "completion failed before streaming");
                emit!(ChatStreamEvent::Error {
                    error: e.to_string(),
                });
            }
        }

        let _ = tx.send(ChatStreamEvent::Complete { query }).await;
    }
}
