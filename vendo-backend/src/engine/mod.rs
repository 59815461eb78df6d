//! Conversational orchestration engine: accepts (message, owner phone),
//! resolves conversation state, drives the model run, and converts every
//! fault into user-safe text. Nothing escapes `handle_message` as an error.

pub mod chunker;
pub mod dispatcher;
pub mod executor;

#[cfg(test)]
mod engine_tests;

pub use chunker::chunk_reply;

use std::sync::Arc;
use std::time::Duration;

use crate::ai::RunBackend;
use crate::alerts::Alerter;
use crate::crm::CrmApi;
use crate::db::ConversationStore;
use crate::engine::dispatcher::ToolDispatcher;
use crate::engine::executor::RunExecutor;
use crate::models::{Conversation, MessageRole};
use crate::tools::ToolRegistry;

/// Keyword a user sends to abandon a stuck or stale conversation.
pub const RESET_KEYWORD: &str = "/reset";

/// Output substituted for a failed or identity-less tool call.
pub(crate) const TOOL_ERROR_OUTPUT: &str =
    "Ha ocurrido un error, por favor realice la consulta más tarde.";

const ASSISTANT_UNAVAILABLE_REPLY: &str = "Ha ocurrido un error. Por favor, consulte más tarde.";

const BLOCKED_REPLY: &str = "Todavía estoy procesando tu mensaje anterior. Vuelve a intentarlo en \
                             unos instantes o envía /reset para empezar de cero.";

const RESET_CONFIRMATION: &str = "Historial eliminado. ¿En qué puedo ayudarte?";

fn known_user_context(name: &str) -> String {
    format!(
        "(Este es un mensaje del sistema) El usuario se llama {}. Llámalo por su nombre",
        name
    )
}

const UNKNOWN_USER_CONTEXT: &str =
    "(Este es un mensaje del sistema) Pídele el nombre al usuario para que le crees una cuenta";

/// What the engine hands back to the transport adapter: the reply text plus
/// the audit labels of every tool the run invoked.
#[derive(Debug, Clone)]
pub struct EngineReply {
    pub text: String,
    pub tools_invoked: Vec<String>,
}

impl EngineReply {
    fn plain(text: &str) -> Self {
        EngineReply {
            text: text.to_string(),
            tools_invoked: vec![],
        }
    }
}

pub struct OrchestrationEngine {
    backend: Arc<dyn RunBackend>,
    store: Arc<ConversationStore>,
    crm: Arc<dyn CrmApi>,
    executor: RunExecutor,
    alerter: Arc<dyn Alerter>,
    alert_recipient: String,
}

impl OrchestrationEngine {
    pub fn new(
        backend: Arc<dyn RunBackend>,
        store: Arc<ConversationStore>,
        crm: Arc<dyn CrmApi>,
        registry: Arc<ToolRegistry>,
        alerter: Arc<dyn Alerter>,
        alert_recipient: &str,
        poll_interval: Duration,
        poll_max_attempts: u32,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(registry, alerter.clone(), alert_recipient);
        let executor = RunExecutor::new(
            backend.clone(),
            store.clone(),
            dispatcher,
            poll_interval,
            poll_max_attempts,
        );

        OrchestrationEngine {
            backend,
            store,
            crm,
            executor,
            alerter,
            alert_recipient: alert_recipient.to_string(),
        }
    }

    /// Entry point for one inbound message. Always produces a reply.
    pub async fn handle_message(&self, phone: &str, text: &str) -> EngineReply {
        let text = text.trim();
        log::info!("User {}: {}", phone, text);

        if text == RESET_KEYWORD {
            return self.handle_reset(phone).await;
        }

        let conversation = match self.store.get(phone) {
            Ok(Some(conversation)) => {
                if conversation.pending_run_id.is_some() {
                    return self.handle_blocked(&conversation).await;
                }
                conversation
            }
            Ok(None) => match self.first_contact(phone).await {
                Ok(conversation) => conversation,
                Err(e) => {
                    log::error!("failed to open conversation for {}: {}", phone, e);
                    return EngineReply::plain(ASSISTANT_UNAVAILABLE_REPLY);
                }
            },
            Err(e) => {
                log::error!("conversation lookup failed for {}: {}", phone, e);
                return EngineReply::plain(ASSISTANT_UNAVAILABLE_REPLY);
            }
        };

        if let Err(e) = self
            .store
            .append_message(phone, MessageRole::User, text, &[])
        {
            log::error!("failed to store user message for {}: {}", phone, e);
        }

        match self.executor.execute(&conversation, text).await {
            Ok((answer, invocations)) => {
                let labels: Vec<String> = invocations.iter().map(|i| i.label()).collect();
                log::info!("Tools: {:?}", labels);

                if let Err(e) =
                    self.store
                        .append_message(phone, MessageRole::Assistant, &answer, &labels)
                {
                    log::error!("failed to store assistant message for {}: {}", phone, e);
                }

                EngineReply {
                    text: answer,
                    tools_invoked: labels,
                }
            }
            Err(e) => {
                log::error!("model run failed for {}: {}", phone, e);
                self.alerter
                    .notify(
                        &self.alert_recipient,
                        &format!("Assistant failure replying to {}", phone),
                        &format!("Mensaje: {}\nError: {}", text, e),
                    )
                    .await;

                // The thread may be wedged mid-run; start the conversation
                // over so the next message lands on a clean slate.
                if let Err(reset_error) = self.reset_state(phone).await {
                    log::error!("post-failure reset failed for {}: {}", phone, reset_error);
                }

                EngineReply::plain(ASSISTANT_UNAVAILABLE_REPLY)
            }
        }
    }

    /// Brand-new conversation: look the phone up in the CRM, mint a thread,
    /// and inject the identity context so the model starts informed.
    async fn first_contact(&self, phone: &str) -> Result<Conversation, String> {
        log::info!("first conversation for {}", phone);

        let partner = match self.crm.partner_by_phone(phone).await {
            Ok(partner) => partner,
            Err(e) => {
                log::warn!("CRM lookup failed for {}: {}", phone, e);
                None
            }
        };

        let thread_id = self
            .backend
            .create_thread()
            .await
            .map_err(|e| e.to_string())?;

        let (name, context) = match partner {
            Some(partner) => {
                log::info!("{} found in CRM as {}", phone, partner.name);
                let context = known_user_context(&partner.name);
                (Some(partner.name), context)
            }
            None => {
                log::info!("{} not found in CRM", phone);
                (None, UNKNOWN_USER_CONTEXT.to_string())
            }
        };

        let conversation = self
            .store
            .create(phone, &thread_id, name.as_deref())
            .map_err(|e| e.to_string())?;

        // The thread API only takes user/assistant roles, so the context
        // rides in a user message marked as system-authored.
        self.backend
            .create_message(&thread_id, MessageRole::User, &context)
            .await
            .map_err(|e| e.to_string())?;

        Ok(conversation)
    }

    async fn handle_blocked(&self, conversation: &Conversation) -> EngineReply {
        log::warn!(
            "conversation {} blocked on run {:?}",
            conversation.phone,
            conversation.pending_run_id
        );
        if let Err(e) = self.store.set_blocked(&conversation.phone, true) {
            log::error!("failed to flag {} as blocked: {}", conversation.phone, e);
        }
        EngineReply::plain(BLOCKED_REPLY)
    }

    async fn handle_reset(&self, phone: &str) -> EngineReply {
        match self.store.get(phone) {
            Ok(Some(_)) => {}
            Ok(None) => return EngineReply::plain(RESET_CONFIRMATION),
            Err(e) => {
                log::error!("conversation lookup failed for {}: {}", phone, e);
                return EngineReply::plain(ASSISTANT_UNAVAILABLE_REPLY);
            }
        }

        match self.reset_state(phone).await {
            Ok(()) => EngineReply::plain(RESET_CONFIRMATION),
            Err(e) => {
                log::error!("reset failed for {}: {}", phone, e);
                EngineReply::plain(ASSISTANT_UNAVAILABLE_REPLY)
            }
        }
    }

    /// Fresh thread + zeroed store state. Shared by the reset keyword and
    /// the post-failure recovery path.
    async fn reset_state(&self, phone: &str) -> Result<(), String> {
        let old_thread = self.store.get(phone).ok().flatten().map(|c| c.thread_id);

        let new_thread = self
            .backend
            .create_thread()
            .await
            .map_err(|e| e.to_string())?;
        self.store
            .reset(phone, &new_thread)
            .map_err(|e| e.to_string())?;
        log::info!("conversation {} reset onto {}", phone, new_thread);

        if let Some(old_thread) = old_thread {
            if let Err(e) = self.backend.delete_thread(&old_thread).await {
                log::warn!("failed to delete thread {}: {}", old_thread, e);
            }
        }

        Ok(())
    }
}
