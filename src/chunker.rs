//! Deterministic sliding-window chunking of page text.
//!
//! Windows are measured in characters, not bytes, so multi-byte text never
//! splits a code point. Each window prefers to end on a sentence or line
//! boundary when one falls in the back half of the window, and consecutive
//! windows share a fixed overlap so sentences near a cut survive intact in
//! at least one passage.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ChunkConfig;
use crate::crawler::Page;
use crate::types::SiteChatError;

/// One retrievable unit of text with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub source_url: String,
    pub source_title: String,
    /// First page heading whose text appears verbatim in this passage.
    pub heading: Option<String>,
    pub text: String,
    /// Position of this passage within its page, contiguous from zero.
    pub ordinal: usize,
}

/// Splits one page into overlapping passages. The same page and config
/// always produce byte-identical output.
pub fn chunk_page(page: &Page, config: &ChunkConfig) -> Result<Vec<Passage>, SiteChatError> {
    config.validate()?;

    let chars: Vec<char> = page.text.chars().collect();
    let mut passages = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + config.chunk_size).min(chars.len());
        let at_tail = end == chars.len();

        if !at_tail {
            // Prefer a sentence or line break, but only when it lands at or
            // past the midpoint of the window; otherwise keep the hard cut
            // so a terminator-free stretch still makes progress.
            if let Some(break_at) = last_break(&chars[start..end]) {
                if break_at * 2 >= config.chunk_size {
                    end = start + break_at + 1;
                }
            }
        }

        let text: String = chars[start..end].iter().collect();
        let text = text.trim();
        if !text.is_empty() {
            if text.chars().count() > config.hard_cap {
                warn!(
                    url = %page.url,
                    chars = text.chars().count(),
                    cap = config.hard_cap,
                    "skipping oversized passage"
                );
            } else {
                passages.push(Passage {
                    source_url: page.url.clone(),
                    source_title: page.title.clone(),
                    heading: heading_for(page, text),
                    text: text.to_string(),
                    ordinal: 0,
                });
            }
        }

        if at_tail {
            break;
        }
        // Step back by the overlap, but always advance by at least one
        // character so a boundary inside the overlap region cannot loop.
        start = (end.saturating_sub(config.overlap)).max(start + 1);
    }

    for (ordinal, passage) in passages.iter_mut().enumerate() {
        passage.ordinal = ordinal;
    }
    Ok(passages)
}

/// Index of the last '.' or '\n' in the window, if any.
fn last_break(window: &[char]) -> Option<usize> {
    window.iter().rposition(|c| *c == '.' || *c == '\n')
}

fn heading_for(page: &Page, text: &str) -> Option<String> {
    page.headings.iter().find(|h| text.contains(h.as_str())).cloned()
}
