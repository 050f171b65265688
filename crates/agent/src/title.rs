//! Session title generation.
//!
//! One-shot completion asking for a short title; surrounding quotation
//! marks of several locales are stripped. Any failure falls back to the
//! default title.

use std::sync::Arc;
use tracing::warn;

use switchyard_core::llm::{ChatOptions, LlmClient};
use switchyard_core::message::Message;

/// Title used when generation fails or produces nothing.
pub const FALLBACK_TITLE: &str = "新对话";

/// Quote characters stripped from both ends of the model's reply.
const QUOTE_CHARS: &[char] = &[
    '"', '\'', '“', '”', '‘', '’', '「', '」', '『', '』', '《', '》', '«', '»',
];

pub struct TitleGenerator {
    llm: Arc<dyn LlmClient>,
}

impl TitleGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produce a 5-10 character title for the utterance.
    pub async fn generate(&self, input: &str) -> String {
        let prompt = format!(
            "Generate a title of 5 to 10 characters for the following message. \
             No punctuation, no explanation; reply with the title only.\n\n{input}"
        );

        let reply = self
            .llm
            .chat(
                vec![Message::user(prompt)],
                ChatOptions {
                    max_tokens: Some(32),
                    ..ChatOptions::default()
                },
            )
            .await;

        match reply {
            Ok(message) => {
                let title = strip_quotes(&message.content);
                if title.is_empty() {
                    FALLBACK_TITLE.to_string()
                } else {
                    title
                }
            }
            Err(e) => {
                warn!(error = %e, "Title generation failed");
                FALLBACK_TITLE.to_string()
            }
        }
    }
}

fn strip_quotes(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| QUOTE_CHARS.contains(&c))
        .trim()
        .to_string()
}
