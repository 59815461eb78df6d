use crate::ai::RunBackend;
use crate::db::ConversationStore;
use crate::tools::builtin::GENERIC_TOOL_ERROR;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Model-triggered conversation reset: fresh thread, zeroed interaction
/// counter, cleared history. Same effect as the user's reset keyword.
pub struct ChatResetTool {
    definition: ToolDefinition,
    backend: Arc<dyn RunBackend>,
    store: Arc<ConversationStore>,
}

impl ChatResetTool {
    pub fn new(backend: Arc<dyn RunBackend>, store: Arc<ConversationStore>) -> Self {
        ChatResetTool {
            definition: ToolDefinition {
                name: "clean_chat".to_string(),
                description: "Borra el historial de la conversación y empieza de cero."
                    .to_string(),
                input_schema: ToolInputSchema::default(),
            },
            backend,
            store,
        }
    }
}

#[async_trait]
impl Tool for ChatResetTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        let phone = match context.caller_phone() {
            Some(p) => p,
            None => return ToolResult::error(GENERIC_TOOL_ERROR),
        };

        let old_thread = self.store.get(phone).ok().flatten().map(|c| c.thread_id);

        let new_thread = match self.backend.create_thread().await {
            Ok(id) => id,
            Err(e) => {
                log::error!("chat reset: thread creation failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        if let Err(e) = self.store.reset(phone, &new_thread) {
            log::error!("chat reset: store reset failed for {}: {}", phone, e);
            return ToolResult::error(GENERIC_TOOL_ERROR);
        }

        if let Some(old_thread) = old_thread {
            if let Err(e) = self.backend.delete_thread(&old_thread).await {
                log::warn!("failed to delete thread {}: {}", old_thread, e);
            }
        }

        ToolResult::success("Historial eliminado")
    }
}
