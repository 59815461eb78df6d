//! Drives one model run from submission to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use crate::ai::{Run, RunBackend, RunBackendError, RunStatus};
use crate::db::ConversationStore;
use crate::engine::dispatcher::ToolDispatcher;
use crate::models::{Conversation, MessageRole, ToolInvocation};

pub struct RunExecutor {
    backend: Arc<dyn RunBackend>,
    store: Arc<ConversationStore>,
    dispatcher: ToolDispatcher,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl RunExecutor {
    pub fn new(
        backend: Arc<dyn RunBackend>,
        store: Arc<ConversationStore>,
        dispatcher: ToolDispatcher,
        poll_interval: Duration,
        poll_max_attempts: u32,
    ) -> Self {
        RunExecutor {
            backend,
            store,
            dispatcher,
            poll_interval,
            poll_max_attempts,
        }
    }

    /// Submit `user_text` to the conversation's thread and drive the
    /// resulting run to a terminal status, dispatching tool batches on
    /// demand. Returns the concatenated assistant reply and the tool audit
    /// trail. Errors are returned untouched; recovery (apology, reset,
    /// alert) belongs to the engine.
    pub async fn execute(
        &self,
        conversation: &Conversation,
        user_text: &str,
    ) -> Result<(String, Vec<ToolInvocation>), RunBackendError> {
        let thread_id = &conversation.thread_id;
        let user_message_id = self
            .backend
            .create_message(thread_id, MessageRole::User, user_text)
            .await?;

        let mut run = self.backend.create_run(thread_id).await?;
        log::debug!("run {} created on {}", run.id, thread_id);

        // Persisted before polling so a crash mid-run leaves the evidence
        // blocking detection needs.
        if let Err(e) = self.store.set_pending_run(&conversation.phone, &run.id) {
            log::error!("failed to persist pending run {}: {}", run.id, e);
        }

        run = self.wait_until_settled(thread_id, run).await?;

        let mut invocations: Vec<ToolInvocation> = Vec::new();
        while run.status == RunStatus::RequiresAction {
            log::debug!(
                "run {} needs {} tool calls",
                run.id,
                run.required_actions.len()
            );

            let (outputs, records) = self
                .dispatcher
                .dispatch(&run.required_actions, Some(&conversation.phone))
                .await;
            invocations.extend(records);

            run = self
                .backend
                .submit_tool_outputs(thread_id, &run.id, &outputs)
                .await?;
            log::debug!("tool outputs sent back to run {}", run.id);

            run = self.wait_until_settled(thread_id, run).await?;
        }

        if let Err(e) = self.store.clear_pending_run(&conversation.phone) {
            log::error!("failed to clear pending run {}: {}", run.id, e);
        }

        if run.status != RunStatus::Completed {
            return Err(RunBackendError::new(format!(
                "run {} ended with status {}",
                run.id,
                run.status.as_str()
            )));
        }

        let reply = self
            .backend
            .list_messages_after(thread_id, &user_message_id)
            .await?
            .into_iter()
            .filter(|message| message.role == MessageRole::Assistant)
            .map(|message| message.content)
            .collect::<Vec<_>>()
            .join("\n");

        Ok((reply, invocations))
    }

    /// Poll until the run leaves `queued`/`in_progress`, bounded by the
    /// configured attempt cap.
    async fn wait_until_settled(
        &self,
        thread_id: &str,
        mut run: Run,
    ) -> Result<Run, RunBackendError> {
        let mut attempts = 0u32;
        while matches!(run.status, RunStatus::Queued | RunStatus::InProgress) {
            attempts += 1;
            if attempts > self.poll_max_attempts {
                return Err(RunBackendError::new(format!(
                    "run {} still {} after {} polls",
                    run.id,
                    run.status.as_str(),
                    self.poll_max_attempts
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            run = self.backend.poll_run(thread_id, &run.id).await?;
        }
        Ok(run)
    }
}
