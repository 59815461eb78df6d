use crate::alerts::Alerter;
use crate::crm::CrmApi;
use crate::db::ConversationStore;
use crate::tools::builtin::GENERIC_TOOL_ERROR;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

// Messages of context attached to the opportunity, and a cap so an endless
// chat cannot blow up the CRM description field.
const TRANSCRIPT_MESSAGES: usize = 40;
const TRANSCRIPT_MAX_CHARS: usize = 4000;

/// Create a sales opportunity in the CRM from the current conversation and
/// notify the sales team.
pub struct LeadCreateTool {
    definition: ToolDefinition,
    crm: Arc<dyn CrmApi>,
    store: Arc<ConversationStore>,
    alerter: Arc<dyn Alerter>,
    sales_recipient: String,
}

#[derive(Debug, Deserialize)]
struct LeadCreateParams {
    name: String,
    email: Option<String>,
}

impl LeadCreateTool {
    pub fn new(
        crm: Arc<dyn CrmApi>,
        store: Arc<ConversationStore>,
        alerter: Arc<dyn Alerter>,
        sales_recipient: &str,
    ) -> Self {
        LeadCreateTool {
            definition: ToolDefinition {
                name: "create_lead".to_string(),
                description:
                    "Crea una oportunidad de venta en el CRM con el contexto de la conversación y avisa al equipo de ventas."
                        .to_string(),
                input_schema: ToolInputSchema::new(
                    vec![
                        ("name", PropertySchema::string("Nombre completo del usuario")),
                        (
                            "email",
                            PropertySchema::string("Correo electrónico del usuario"),
                        ),
                    ],
                    vec!["name"],
                ),
            },
            crm,
            store,
            alerter,
            sales_recipient: sales_recipient.to_string(),
        }
    }
}

#[async_trait]
impl Tool for LeadCreateTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: LeadCreateParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let phone = match context.caller_phone() {
            Some(p) => p,
            None => return ToolResult::error(GENERIC_TOOL_ERROR),
        };

        let (partner, _) = match self
            .crm
            .create_partner(&params.name, phone, params.email.as_deref())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                log::error!("lead create: partner step failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        let mut excerpt = match self.store.transcript(phone, TRANSCRIPT_MESSAGES) {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                log::warn!("no chat history found for {}", phone);
                format!("Conversación de WhatsApp con {}", params.name)
            }
            Err(e) => {
                log::error!("lead create: transcript read failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };
        if excerpt.chars().count() > TRANSCRIPT_MAX_CHARS {
            excerpt = excerpt
                .chars()
                .skip(excerpt.chars().count() - TRANSCRIPT_MAX_CHARS)
                .collect();
        }

        let lead = match self
            .crm
            .create_lead(&partner, params.email.as_deref(), &excerpt)
            .await
        {
            Ok(lead) => lead,
            Err(e) => {
                log::error!("lead create failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        log::info!("lead {} created for partner {}", lead.id, partner.id);
        self.alerter
            .notify(
                &self.sales_recipient,
                "Nueva oportunidad creada desde WhatsApp",
                &format!(
                    "ID del lead: {}\nNombre del lead: {}\nCliente: {}\nTeléfono: {}\nCorreo: {}\n\nResumen de la conversación:\n{}",
                    lead.id,
                    lead.name,
                    partner.name,
                    phone,
                    params.email.as_deref().unwrap_or("-"),
                    excerpt
                ),
            )
            .await;

        ToolResult::success("El equipo de ventas se pondrá en contacto contigo próximamente")
    }
}
