use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable conversation record, one per owner phone number.
///
/// `pending_run_id` is set while a model run is in flight and cleared when it
/// reaches a terminal status; a non-null value on an inbound message means the
/// previous run never settled and the conversation is treated as blocked.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub phone: String,
    pub thread_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub interactions: i64,
    pub blocked: bool,
    pub pending_run_id: Option<String>,
    pub last_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<MessageRole> {
        match s.to_lowercase().as_str() {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// One row of the append-only per-conversation message log.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub phone: String,
    pub role: MessageRole,
    pub content: String,
    pub tools_invoked: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one tool call within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    Error,
    NoIdentity,
}

/// Audit record for one tool call, returned to the caller and stored with
/// the assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolInvocation {
    pub fn success(tool_name: &str) -> Self {
        ToolInvocation {
            tool_name: tool_name.to_string(),
            outcome: ToolOutcome::Success,
        }
    }

    pub fn error(tool_name: &str) -> Self {
        ToolInvocation {
            tool_name: tool_name.to_string(),
            outcome: ToolOutcome::Error,
        }
    }

    pub fn no_identity(tool_name: &str) -> Self {
        ToolInvocation {
            tool_name: tool_name.to_string(),
            outcome: ToolOutcome::NoIdentity,
        }
    }

    /// Label stored in the message log: `<name>`, `<name>_ERROR` or
    /// `NO_IDENTITY`.
    pub fn label(&self) -> String {
        match self.outcome {
            ToolOutcome::Success => self.tool_name.clone(),
            ToolOutcome::Error => format!("{}_ERROR", self.tool_name),
            ToolOutcome::NoIdentity => "NO_IDENTITY".to_string(),
        }
    }
}
