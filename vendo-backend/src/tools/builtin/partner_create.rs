use crate::crm::{CrmApi, PartnerStatus};
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

/// Create (or recover) the caller's CRM contact and mirror the profile onto
/// the conversation record.
pub struct PartnerCreateTool {
    definition: ToolDefinition,
    crm: Arc<dyn CrmApi>,
    store: Arc<ConversationStore>,
}

#[derive(Debug, Deserialize)]
struct PartnerCreateParams {
    name: String,
    email: Option<String>,
}

impl PartnerCreateTool {
    pub fn new(crm: Arc<dyn CrmApi>, store: Arc<ConversationStore>) -> Self {
        PartnerCreateTool {
            definition: ToolDefinition {
                name: "create_partner".to_string(),
                description:
                    "Crea una cuenta de cliente en el CRM con el nombre del usuario y, opcionalmente, su correo."
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
        }
    }
}

#[async_trait]
impl Tool for PartnerCreateTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: PartnerCreateParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let phone = match context.caller_phone() {
            Some(p) => p,
            None => return ToolResult::error(GENERIC_TOOL_ERROR),
        };

        let created = self
            .crm
            .create_partner(&params.name, phone, params.email.as_deref())
            .await;

        let (partner, status) = match created {
            Ok(result) => result,
            Err(e) => {
                log::error!("partner create failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        if let Err(e) =
            self.store
                .update_profile(phone, Some(&params.name), params.email.as_deref())
        {
            log::error!("failed to mirror profile for {}: {}", phone, e);
        }

        let payload = serde_json::to_string(&partner).unwrap_or_else(|_| partner.name.clone());
        match status {
            PartnerStatus::Existing => ToolResult::success(format!("Socio encontrado: {}", payload)),
            PartnerStatus::Created => ToolResult::success(format!("Contacto creado: {}", payload)),
        }
    }
}
