//! Context window management — fit `{system, history, current}` into a
//! token budget via trimming and summarization.
//!
//! Token costs use a fixed character heuristic: `ceil(len / 3)`, a
//! conservative approximation for mixed ASCII/CJK text. The same function
//! is used everywhere so budgets stay reproducible.
//!
//! The system message and the current turn are never trimmed. When history
//! overflows, 20% of the history budget is reserved for a summary message,
//! the newest turns are kept (never fewer than two), and everything older
//! is collapsed into one system-role summary. Summary failures fall back
//! to listing recent user topics; they never abort the request.

use tracing::warn;

use switchyard_core::llm::{ChatOptions, LlmClient};
use switchyard_core::message::{Message, Role};

/// Maximum characters of one turn fed into the summarization prompt.
const SUMMARY_TURN_CHARS: usize = 500;

/// Maximum characters of digest fed into the summarization prompt.
const SUMMARY_DIGEST_CHARS: usize = 3000;

/// Requested length bound for the model's recap.
const SUMMARY_REPLY_CHARS: usize = 200;

/// Estimate the token count for a string: `ceil(len / 3)`.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 2) / 3
}

/// Estimate tokens for a message: content plus, when tool calls are
/// present, their JSON rendering.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = estimate_tokens(&message.content);
    if !message.tool_calls.is_empty() {
        let json = serde_json::to_string(&message.tool_calls).unwrap_or_default();
        tokens += estimate_tokens(&json);
    }
    tokens
}

fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Truncate to at most `limit` characters, respecting char boundaries.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect()
}

/// The context window manager. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextManager {
    max_tokens: usize,
    reserved_tokens: usize,
}

impl ContextManager {
    pub fn new(max_tokens: usize, reserved_tokens: usize) -> Self {
        Self {
            max_tokens,
            reserved_tokens,
        }
    }

    /// Produce an ordered message list that fits the budget.
    ///
    /// Output shape is one of:
    /// - `[system, …history, …current]` when everything fits (verbatim);
    /// - `[system, summary, …kept, …current]` after trimming;
    /// - `[system, …current]` when the fixed parts alone exceed the budget.
    pub async fn fit(
        &self,
        system: Message,
        history: &[Message],
        current: &[Message],
        llm: Option<&dyn LlmClient>,
    ) -> Vec<Message> {
        let budget = self.max_tokens.saturating_sub(self.reserved_tokens);
        let fixed =
            estimate_message_tokens(&system) + estimate_messages_tokens(current);

        if fixed >= budget {
            warn!(
                fixed_tokens = fixed,
                budget, "System prompt and current turn alone exceed the context budget"
            );
            let mut out = vec![system];
            out.extend_from_slice(current);
            return out;
        }

        let history_budget = budget - fixed;
        if estimate_messages_tokens(history) <= history_budget {
            let mut out = vec![system];
            out.extend_from_slice(history);
            out.extend_from_slice(current);
            return out;
        }

        // 20% of the history budget is reserved for the summary message.
        let keep_budget = history_budget * 4 / 5;

        let mut kept: Vec<Message> = Vec::new();
        let mut kept_tokens = 0;
        for message in history.iter().rev() {
            let tokens = estimate_message_tokens(message);
            if kept_tokens + tokens > keep_budget {
                break;
            }
            kept.push(message.clone());
            kept_tokens += tokens;
        }
        kept.reverse();

        if kept.len() < 2 {
            let floor = history.len().saturating_sub(2);
            kept = history[floor..].to_vec();
            kept_tokens = estimate_messages_tokens(&kept);
        }

        let trimmed = &history[..history.len() - kept.len()];
        if trimmed.is_empty() {
            let mut out = vec![system];
            out.extend(kept);
            out.extend_from_slice(current);
            return out;
        }

        let summary_budget = history_budget.saturating_sub(kept_tokens);
        let summary = self.summarize(trimmed, summary_budget, llm).await;

        let mut out = vec![system, summary];
        out.extend(kept);
        out.extend_from_slice(current);
        out
    }

    async fn summarize(
        &self,
        trimmed: &[Message],
        summary_budget: usize,
        llm: Option<&dyn LlmClient>,
    ) -> Message {
        if let Some(llm) = llm {
            match self.llm_summary(trimmed, llm).await {
                Ok(text) if !text.trim().is_empty() => {
                    return self.summary_message(
                        format!("Summary of earlier conversation: {}", text.trim()),
                        summary_budget,
                    );
                }
                Ok(_) => warn!("Summarization returned empty text; using fallback"),
                Err(e) => warn!(error = %e, "Summarization failed; using fallback"),
            }
        }
        self.summary_message(fallback_summary(trimmed), summary_budget)
    }

    fn summary_message(&self, content: String, summary_budget: usize) -> Message {
        // Keep the summary inside its reserved share of the budget.
        let char_limit = (summary_budget * 3).max(SUMMARY_REPLY_CHARS);
        Message::system(truncate_chars(&content, char_limit))
    }

    async fn llm_summary(
        &self,
        trimmed: &[Message],
        llm: &dyn LlmClient,
    ) -> Result<String, switchyard_core::error::LlmError> {
        let mut digest = String::new();
        for message in trimmed {
            let label = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                _ => continue,
            };
            let line = format!(
                "{label}: {}\n",
                truncate_chars(&message.content, SUMMARY_TURN_CHARS)
            );
            digest.push_str(&line);
            if digest.chars().count() >= SUMMARY_DIGEST_CHARS {
                digest = truncate_chars(&digest, SUMMARY_DIGEST_CHARS);
                break;
            }
        }

        let prompt = format!(
            "Summarize the following conversation in {SUMMARY_REPLY_CHARS} characters or fewer. \
             Reply with the summary only.\n\n{digest}"
        );

        let reply = llm
            .chat(
                vec![Message::user(prompt)],
                ChatOptions {
                    max_tokens: Some(256),
                    ..ChatOptions::default()
                },
            )
            .await?;
        Ok(reply.content)
    }
}

/// Summary used when no LLM is available or the call failed: up to five
/// most-recent trimmed user messages, 100-character prefixes, plus a count.
fn fallback_summary(trimmed: &[Message]) -> String {
    let prefixes: Vec<String> = trimmed
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .take(5)
        .map(|m| format!("- {}", truncate_chars(&m.content, 100)))
        .collect();

    if prefixes.is_empty() {
        return format!("Earlier conversation trimmed ({} messages).", trimmed.len());
    }

    format!(
        "Earlier conversation trimmed ({} messages). Recent user topics:\n{}",
        trimmed.len(),
        prefixes.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use switchyard_core::error::LlmError;

    struct SummaryLlm {
        reply: Result<String, LlmError>,
    }

    #[async_trait]
    impl LlmClient for SummaryLlm {
        fn name(&self) -> &str {
            "summary-stub"
        }

        async fn chat(
            &self,
            _messages: Vec<Message>,
            _options: ChatOptions,
        ) -> Result<Message, LlmError> {
            self.reply
                .clone()
                .map(Message::assistant)
        }
    }

    fn ok_llm() -> SummaryLlm {
        SummaryLlm {
            reply: Ok("Summary of prior conversation".into()),
        }
    }

    fn failing_llm() -> SummaryLlm {
        SummaryLlm {
            reply: Err(LlmError::Network("offline".into())),
        }
    }

    fn turns(count: usize) -> Vec<Message> {
        let mut history = Vec::new();
        for i in 0..count {
            history.push(Message::user(format!(
                "Question number {i} with a reasonable amount of text in it"
            )));
            history.push(Message::assistant(format!(
                "Answer number {i} with a reasonable amount of text in it"
            )));
        }
        history
    }

    #[test]
    fn estimator_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(10)), 4);
    }

    #[test]
    fn estimator_counts_tool_call_json() {
        let plain = Message::assistant("hello");
        let with_calls = Message::assistant_with_tool_calls(
            "hello",
            vec![switchyard_core::llm::tool_call(
                "call_1",
                "files.read",
                r#"{"path":"a.txt"}"#,
            )],
        );
        assert!(estimate_message_tokens(&with_calls) > estimate_message_tokens(&plain));
    }

    #[tokio::test]
    async fn within_budget_is_verbatim() {
        let manager = ContextManager::new(100_000, 1_000);
        let history = turns(3);
        let current = vec![Message::user("now")];
        let out = manager
            .fit(Message::system("sys"), &history, &current, None)
            .await;

        assert_eq!(out.len(), 1 + history.len() + 1);
        assert_eq!(out[0].content, "sys");
        assert_eq!(out[1].id, history[0].id);
        assert_eq!(out.last().unwrap().content, "now");
    }

    #[tokio::test]
    async fn fixed_parts_exceeding_budget_are_returned_alone() {
        let manager = ContextManager::new(25, 10);
        let history = turns(3);
        let current = vec![Message::user("a somewhat long current message here")];
        let out = manager
            .fit(Message::system("a long system prompt"), &history, &current, None)
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[1].content, current[0].content);
    }

    #[tokio::test]
    async fn empty_history_needs_no_summary() {
        let manager = ContextManager::new(1000, 100);
        let out = manager
            .fit(Message::system("sys"), &[], &[Message::user("hi")], None)
            .await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn overflow_produces_summary_then_kept_then_current() {
        let manager = ContextManager::new(360, 40);
        let history = turns(20);
        let current = vec![Message::user("current question")];
        let llm = ok_llm();
        let out = manager
            .fit(Message::system("sys"), &history, &current, Some(&llm))
            .await;

        assert_eq!(out[0].content, "sys");
        assert_eq!(out[1].role, Role::System);
        assert!(out[1].content.contains("Summary of prior conversation"));
        assert_eq!(out.last().unwrap().content, "current question");

        // Kept messages are the newest ones, in order.
        let kept = &out[2..out.len() - 1];
        assert!(!kept.is_empty());
        let newest = &history[history.len() - kept.len()..];
        for (a, b) in kept.iter().zip(newest) {
            assert_eq!(a.id, b.id);
        }
    }

    #[tokio::test]
    async fn summary_failure_falls_back_to_user_topics() {
        let manager = ContextManager::new(360, 40);
        let history = turns(20);
        let llm = failing_llm();
        let out = manager
            .fit(
                Message::system("sys"),
                &history,
                &[Message::user("now")],
                Some(&llm),
            )
            .await;

        assert!(out[1].content.contains("Earlier conversation trimmed"));
        assert!(out[1].content.contains("Question number"));
    }

    #[tokio::test]
    async fn at_least_two_messages_kept() {
        // The two newest messages alone exceed the history budget.
        let manager = ContextManager::new(120, 10);
        let mut history = turns(2);
        for message in &mut history {
            message.content = "x".repeat(400);
        }
        let out = manager
            .fit(Message::system("s"), &history, &[Message::user("q")], None)
            .await;

        // [system, summary, last-two, current]
        let kept: Vec<&Message> = out
            .iter()
            .filter(|m| history.iter().any(|h| h.id == m.id))
            .collect();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, history[history.len() - 2].id);
        assert_eq!(kept[1].id, history[history.len() - 1].id);
    }

    #[tokio::test]
    async fn output_fits_budget_after_trimming() {
        let manager = ContextManager::new(400, 40);
        let history = turns(30);
        let llm = ok_llm();
        let out = manager
            .fit(
                Message::system("sys"),
                &history,
                &[Message::user("current")],
                Some(&llm),
            )
            .await;

        let total = estimate_messages_tokens(&out);
        assert!(
            total <= 360,
            "assembled context ({total} tokens) exceeds the budget"
        );
    }

    #[test]
    fn fallback_lists_at_most_five_topics() {
        let history = turns(10);
        let summary = fallback_summary(&history);
        assert!(summary.contains("(20 messages)"));
        assert_eq!(summary.matches("- ").count(), 5);
    }

    #[test]
    fn fallback_without_user_messages_is_count_only() {
        let trimmed = vec![Message::assistant("a"), Message::assistant("b")];
        let summary = fallback_summary(&trimmed);
        assert_eq!(summary, "Earlier conversation trimmed (2 messages).");
    }
}
