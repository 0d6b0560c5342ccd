use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An identifier that cannot be placed in a service URL path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier: {0:?}")]
pub struct InvalidId(pub String);

/// Service identifiers are ASCII letters, digits, `_` and `-`.
pub fn is_path_safe(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Identifier of one document-analysis conversation (a remote thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Accept an id from an untrusted source, such as a request path.
    pub fn parse(id: &str) -> Result<Self, InvalidId> {
        if is_path_safe(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(InvalidId(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a run started against a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(String);

impl RunHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status of a remote run.
///
/// `Queued` and `Running` are re-polled; every other state is terminal and
/// only `Completed` counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Expired,
    NeedsUnsupportedAction,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Queued | RunState::Running)
    }

    /// Map a wire status string onto a run state.
    pub fn from_wire(status: &str) -> Option<Self> {
        let state = match status {
            "queued" => RunState::Queued,
            "in_progress" | "cancelling" => RunState::Running,
            "completed" => RunState::Completed,
            "failed" | "incomplete" => RunState::Failed,
            "cancelled" => RunState::Cancelled,
            "expired" => RunState::Expired,
            "requires_action" => RunState::NeedsUnsupportedAction,
            _ => return None,
        };
        Some(state)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
            RunState::Expired => "expired",
            RunState::NeedsUnsupportedAction => "needs_unsupported_action",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a conversation, reduced to its first text segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: Option<String>,
}

impl Message {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: Some(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: Some(text.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_parse_rejects_path_characters() {
        assert_eq!(
            ConversationId::parse("thread_abc-123"),
            Ok(ConversationId::new("thread_abc-123"))
        );
        for bad in ["", "../assistants/asst_1", "thread_1/runs", "thread 1", "th%2Fread", "thread.1"] {
            assert!(ConversationId::parse(bad).is_err(), "accepted {bad:?}");
        }
        assert!(ConversationId::parse(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_wire_status_mapping() {
        assert_eq!(RunState::from_wire("in_progress"), Some(RunState::Running));
        assert_eq!(RunState::from_wire("cancelling"), Some(RunState::Running));
        assert_eq!(
            RunState::from_wire("requires_action"),
            Some(RunState::NeedsUnsupportedAction)
        );
        assert_eq!(RunState::from_wire("incomplete"), Some(RunState::Failed));
        assert_eq!(RunState::from_wire("sleeping"), None);
    }

    #[test]
    fn test_only_queued_and_running_are_pollable() {
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Expired.is_terminal());
        assert!(RunState::NeedsUnsupportedAction.is_terminal());
    }
}
