use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use genoflow_core::types::{ChatMessage, JsonMap, Role, SessionId};

/// One conversation history record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Session-scoped conversation log, context, intermediate results and errors.
///
/// Owned by a single controller; concurrent sessions each hold their own.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    session_id: SessionId,
    messages: Vec<ChatMessage>,
    context: JsonMap,
    intermediate_results: JsonMap,
    errors: Vec<String>,
}

/// First `n` characters of `text`.
pub(crate) fn clip(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strings as-is, everything else as compact JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn push(&mut self, role: Role, content: &str, metadata: Option<JsonMap>) {
        debug!(role = %role, content = %clip(content, 100), "Message added");
        let message = ChatMessage::new(role, content).with_metadata(metadata.unwrap_or_default());
        self.messages.push(message);
    }

    pub fn add_user_message(&mut self, content: &str, metadata: Option<JsonMap>) {
        self.push(Role::User, content, metadata);
    }

    pub fn add_assistant_message(&mut self, content: &str, metadata: Option<JsonMap>) {
        self.push(Role::Assistant, content, metadata);
    }

    pub fn add_system_message(&mut self, content: &str, metadata: Option<JsonMap>) {
        self.push(Role::System, content, metadata);
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        warn!(error = %error, "Error recorded");
        self.errors.push(error);
    }

    /// Merge entries into the context; later writes win.
    pub fn update_context(&mut self, updates: JsonMap) {
        debug!(keys = ?updates.keys().collect::<Vec<_>>(), "Context updated");
        self.context.extend(updates);
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn add_intermediate_result(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(key = %key, "Stored intermediate result");
        self.intermediate_results.insert(key, value);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn context(&self) -> &JsonMap {
        &self.context
    }

    pub fn intermediate_results(&self) -> &JsonMap {
        &self.intermediate_results
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// The last `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
                timestamp: m.timestamp,
            })
            .collect()
    }

    /// `ROLE: content` blocks for the last `max_messages` messages.
    pub fn format_history(&self, max_messages: usize) -> String {
        self.recent_messages(max_messages)
            .iter()
            .map(|m| format!("{}: {}", m.role.to_string().to_uppercase(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Clear messages, context, intermediate results and errors.
    pub fn reset(&mut self) {
        debug!(session = %self.session_id, "Resetting conversation state");
        self.messages.clear();
        self.context.clear();
        self.intermediate_results.clear();
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reset_clears_everything() {
        let mut state = ConversationState::new();
        state.add_user_message("Count reads in sample.bam", None);
        state.update_context(json!({"genome": "hg38"}).as_object().cloned().unwrap());
        state.add_intermediate_result("stats", json!({"reads": 1000}));
        state.add_error("boom");

        state.reset();
        assert!(state.messages().is_empty());
        assert!(state.context().is_empty());
        assert!(state.intermediate_results().is_empty());
        assert!(state.errors().is_empty());
    }

    #[test]
    fn test_context_last_write_wins() {
        let mut state = ConversationState::new();
        state.set_context("genome", json!("hg19"));
        state.update_context(json!({"genome": "hg38", "sample": "NA12878"}).as_object().cloned().unwrap());
        assert_eq!(state.context_value("genome"), Some(&json!("hg38")));
        assert_eq!(state.context().len(), 2);
        assert!(state.context_value("missing").is_none());
    }

    #[test]
    fn test_recent_messages_and_history() {
        let mut state = ConversationState::new();
        for i in 0..7 {
            state.add_user_message(&format!("q{}", i), None);
        }
        state.add_assistant_message("done", None);

        let recent = state.recent_messages(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "q5");
        assert_eq!(recent[2].content, "done");
        assert_eq!(state.recent_messages(100).len(), 8);

        let history = state.history();
        assert_eq!(history.len(), 8);
        assert_eq!(history[7].role, Role::Assistant);
    }

    #[test]
    fn test_format_history() {
        let mut state = ConversationState::new();
        state.add_system_message("be precise", None);
        state.add_user_message("hi", None);
        state.add_assistant_message("hello", None);
        assert_eq!(state.format_history(2), "USER: hi\n\nASSISTANT: hello");
    }

    #[test]
    fn test_message_metadata_and_json() {
        let mut state = ConversationState::new();
        let meta = json!({"source": "cli"}).as_object().cloned().unwrap();
        state.add_user_message("hi", Some(meta));
        assert_eq!(state.messages()[0].metadata["source"], "cli");

        let dump = state.to_json();
        assert_eq!(dump["messages"][0]["content"], "hi");
        assert!(dump["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_clip_is_char_safe() {
        assert_eq!(clip("αβγδ", 2), "αβ");
        assert_eq!(clip("ab", 10), "ab");
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("raw")), "raw");
        assert_eq!(display_value(&json!({"a": [1, 2]})), "{\"a\":[1,2]}");
        assert_eq!(display_value(&json!(3)), "3");
    }
}
