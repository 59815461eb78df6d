use crate::crm::CrmApi;
use crate::tools::builtin::GENERIC_TOOL_ERROR;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Look the caller up in the CRM by phone number.
pub struct PartnerLookupTool {
    definition: ToolDefinition,
    crm: Arc<dyn CrmApi>,
}

impl PartnerLookupTool {
    pub fn new(crm: Arc<dyn CrmApi>) -> Self {
        PartnerLookupTool {
            definition: ToolDefinition {
                name: "get_partner".to_string(),
                description: "Busca el contacto del usuario en el CRM por su número de teléfono."
                    .to_string(),
                input_schema: ToolInputSchema::default(),
            },
            crm,
        }
    }
}

#[async_trait]
impl Tool for PartnerLookupTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        let phone = match context.caller_phone() {
            Some(p) => p,
            None => return ToolResult::error(GENERIC_TOOL_ERROR),
        };

        match self.crm.partner_by_phone(phone).await {
            Ok(Some(partner)) => {
                let payload =
                    serde_json::to_string(&partner).unwrap_or_else(|_| partner.name.clone());
                ToolResult::success(format!("Socio existente: {}", payload))
            }
            Ok(None) => ToolResult::success(format!(
                "No existe contacto registrado con el teléfono {}. Pedir al usuario crear una cuenta",
                phone
            )),
            Err(e) => {
                log::error!("partner lookup failed for {}: {}", phone, e);
                ToolResult::error(GENERIC_TOOL_ERROR)
            }
        }
    }
}
