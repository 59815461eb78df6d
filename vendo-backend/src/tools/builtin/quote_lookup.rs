use crate::crm::CrmApi;
use crate::tools::builtin::quote_list::billing_partner;
use crate::tools::builtin::GENERIC_TOOL_ERROR;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Fetch one sale order by reference, enforcing that it belongs to the
/// caller before handing it to the model.
pub struct QuoteLookupTool {
    definition: ToolDefinition,
    crm: Arc<dyn CrmApi>,
}

#[derive(Debug, Deserialize)]
struct QuoteLookupParams {
    name: String,
}

impl QuoteLookupTool {
    pub fn new(crm: Arc<dyn CrmApi>) -> Self {
        QuoteLookupTool {
            definition: ToolDefinition {
                name: "sale_order_by_name".to_string(),
                description:
                    "Consulta un pedido del usuario por su referencia (por ejemplo S00042)."
                        .to_string(),
                input_schema: ToolInputSchema::new(
                    vec![("name", PropertySchema::string("Referencia del pedido"))],
                    vec!["name"],
                ),
            },
            crm,
        }
    }
}

#[async_trait]
impl Tool for QuoteLookupTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: QuoteLookupParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let phone = match context.caller_phone() {
            Some(p) => p,
            None => return ToolResult::error(GENERIC_TOOL_ERROR),
        };

        let partner = match self.crm.partner_by_phone(phone).await {
            Ok(Some(partner)) => partner,
            Ok(None) => return ToolResult::success("El partner no existe"),
            Err(e) => {
                log::error!("quote lookup: partner lookup failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        let partner = match billing_partner(&self.crm, partner).await {
            Ok(partner) => partner,
            Err(e) => {
                log::error!("quote lookup: company lookup failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        match self.crm.sale_order_by_name(&params.name).await {
            Ok(None) => ToolResult::success("El pedido no existe"),
            Ok(Some(order)) if order.partner_id == partner.id => {
                let payload = serde_json::to_string(&order).unwrap_or_else(|_| order.name.clone());
                ToolResult::success(payload)
            }
            Ok(Some(order)) => {
                log::warn!(
                    "order {} belongs to partner {}, requested by {}",
                    order.name,
                    order.partner_id,
                    partner.id
                );
                ToolResult::success("El pedido no le pertenece a usted")
            }
            Err(e) => {
                log::error!("quote lookup failed for '{}': {}", params.name, e);
                ToolResult::error(GENERIC_TOOL_ERROR)
            }
        }
    }
}
