pub mod assistant;

pub use assistant::AssistantClient;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::models::MessageRole;

/// One message inside a backend thread.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    pub fn from_str(s: &str) -> RunStatus {
        match s {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "completed" => RunStatus::Completed,
            "cancelled" | "cancelling" => RunStatus::Cancelled,
            "expired" => RunStatus::Expired,
            _ => RunStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
        }
    }

}

/// A tool call the model asked for while a run is in `requires_action`.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// One tool output submitted back to a run, matched by call id.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

/// Snapshot of a model run. Discarded once terminal; only the id survives on
/// the conversation for blocking detection.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    pub required_actions: Vec<ToolCallRequest>,
}

/// Error from the run backend, carrying the HTTP status when one exists.
#[derive(Debug, Clone)]
pub struct RunBackendError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl RunBackendError {
    pub fn new(message: impl Into<String>) -> Self {
        RunBackendError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        RunBackendError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }
}

impl fmt::Display for RunBackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<reqwest::Error> for RunBackendError {
    fn from(e: reqwest::Error) -> Self {
        RunBackendError {
            message: format!("assistant request failed: {}", e),
            status_code: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Collaborator interface over the LLM thread/run API.
#[async_trait]
pub trait RunBackend: Send + Sync {
    async fn create_thread(&self) -> Result<String, RunBackendError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<(), RunBackendError>;

    /// Append a message to a thread and return its id.
    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<String, RunBackendError>;

    async fn create_run(&self, thread_id: &str) -> Result<Run, RunBackendError>;

    async fn poll_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RunBackendError>;

    /// Submit one complete batch of tool outputs for a `requires_action` run.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, RunBackendError>;

    /// Messages created after the given message id, in generation order.
    async fn list_messages_after(
        &self,
        thread_id: &str,
        after_message_id: &str,
    ) -> Result<Vec<ThreadMessage>, RunBackendError>;
}

#[cfg(test)]
pub use mock::{MockRunBackend, RunScript};

#[cfg(test)]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Script for one run: each entry in `tool_batches` becomes a
    /// `requires_action` round; once the batches are exhausted the run
    /// settles into `completed` (or `failed`) and `reply` becomes the
    /// assistant messages visible after the user message.
    #[derive(Debug, Clone)]
    pub struct RunScript {
        pub tool_batches: Vec<Vec<ToolCallRequest>>,
        pub reply: Vec<String>,
        pub fail: bool,
    }

    impl RunScript {
        pub fn completed(reply: &str) -> Self {
            RunScript {
                tool_batches: vec![],
                reply: vec![reply.to_string()],
                fail: false,
            }
        }

        pub fn failed() -> Self {
            RunScript {
                tool_batches: vec![],
                reply: vec![],
                fail: true,
            }
        }

        pub fn with_tools(batches: Vec<Vec<ToolCallRequest>>, reply: &str) -> Self {
            RunScript {
                tool_batches: batches,
                reply: vec![reply.to_string()],
                fail: false,
            }
        }
    }

    struct ActiveRun {
        script: RunScript,
        next_batch: usize,
    }

    /// Scripted run backend for integration tests: pops one `RunScript` per
    /// created run and records every message and tool-output submission.
    #[derive(Default)]
    pub struct MockRunBackend {
        scripts: Mutex<VecDeque<RunScript>>,
        active: Mutex<HashMap<String, ActiveRun>>,
        replies: Mutex<HashMap<String, Vec<String>>>,
        pub created_messages: Mutex<Vec<(String, MessageRole, String)>>,
        pub submitted_outputs: Mutex<Vec<Vec<ToolOutput>>>,
        thread_counter: AtomicUsize,
        run_counter: AtomicUsize,
        message_counter: AtomicUsize,
    }

    impl MockRunBackend {
        pub fn new(scripts: Vec<RunScript>) -> Self {
            MockRunBackend {
                scripts: Mutex::new(VecDeque::from(scripts)),
                ..Default::default()
            }
        }

        pub fn scripts_remaining(&self) -> usize {
            self.scripts.lock().unwrap().len()
        }

        fn run_snapshot(&self, run_id: &str) -> Result<Run, RunBackendError> {
            let mut active = self.active.lock().unwrap();
            let state = active
                .get_mut(run_id)
                .ok_or_else(|| RunBackendError::new(format!("unknown run {}", run_id)))?;

            if state.next_batch < state.script.tool_batches.len() {
                return Ok(Run {
                    id: run_id.to_string(),
                    status: RunStatus::RequiresAction,
                    required_actions: state.script.tool_batches[state.next_batch].clone(),
                });
            }

            let status = if state.script.fail {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            };
            Ok(Run {
                id: run_id.to_string(),
                status,
                required_actions: vec![],
            })
        }
    }

    #[async_trait]
    impl RunBackend for MockRunBackend {
        async fn create_thread(&self) -> Result<String, RunBackendError> {
            let n = self.thread_counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("thread_{}", n))
        }

        async fn delete_thread(&self, _thread_id: &str) -> Result<(), RunBackendError> {
            Ok(())
        }

        async fn create_message(
            &self,
            thread_id: &str,
            role: MessageRole,
            content: &str,
        ) -> Result<String, RunBackendError> {
            let n = self.message_counter.fetch_add(1, Ordering::SeqCst) + 1;
            self.created_messages.lock().unwrap().push((
                thread_id.to_string(),
                role,
                content.to_string(),
            ));
            Ok(format!("msg_{}", n))
        }

        async fn create_run(&self, thread_id: &str) -> Result<Run, RunBackendError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| RunBackendError::new("mock backend: no scripts left"))?;

            let n = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let run_id = format!("run_{}", n);
            self.replies
                .lock()
                .unwrap()
                .insert(thread_id.to_string(), script.reply.clone());
            self.active.lock().unwrap().insert(
                run_id.clone(),
                ActiveRun {
                    script,
                    next_batch: 0,
                },
            );

            Ok(Run {
                id: run_id,
                status: RunStatus::Queued,
                required_actions: vec![],
            })
        }

        async fn poll_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, RunBackendError> {
            self.run_snapshot(run_id)
        }

        async fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            run_id: &str,
            outputs: &[ToolOutput],
        ) -> Result<Run, RunBackendError> {
            self.submitted_outputs.lock().unwrap().push(outputs.to_vec());
            {
                let mut active = self.active.lock().unwrap();
                let state = active
                    .get_mut(run_id)
                    .ok_or_else(|| RunBackendError::new(format!("unknown run {}", run_id)))?;
                state.next_batch += 1;
            }
            self.run_snapshot(run_id)
        }

        async fn list_messages_after(
            &self,
            thread_id: &str,
            _after_message_id: &str,
        ) -> Result<Vec<ThreadMessage>, RunBackendError> {
            let replies = self.replies.lock().unwrap();
            let texts = replies.get(thread_id).cloned().unwrap_or_default();
            Ok(texts
                .into_iter()
                .enumerate()
                .map(|(i, content)| ThreadMessage {
                    id: format!("reply_{}", i),
                    role: MessageRole::Assistant,
                    content,
                })
                .collect())
        }
    }
}
