use crate::crm::{CrmApi, Partner};
use crate::tools::builtin::GENERIC_TOOL_ERROR;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// List the caller's quotes/sale orders from the CRM.
pub struct QuoteListTool {
    definition: ToolDefinition,
    crm: Arc<dyn CrmApi>,
}

impl QuoteListTool {
    pub fn new(crm: Arc<dyn CrmApi>) -> Self {
        QuoteListTool {
            definition: ToolDefinition {
                name: "presupuestos".to_string(),
                description: "Lista los presupuestos y pedidos del usuario registrados en el CRM."
                    .to_string(),
                input_schema: ToolInputSchema::default(),
            },
            crm,
        }
    }
}

/// When the contact hangs off a company, the company is the commercial
/// entity that owns the orders.
pub(crate) async fn billing_partner(
    crm: &Arc<dyn CrmApi>,
    partner: Partner,
) -> Result<Partner, String> {
    if partner.is_company {
        return Ok(partner);
    }
    match partner.parent_id {
        Some(parent_id) => match crm.partner_by_id(parent_id).await? {
            Some(parent) => {
                log::debug!("using company {} as order owner", parent.id);
                Ok(parent)
            }
            None => Ok(partner),
        },
        None => Ok(partner),
    }
}

#[async_trait]
impl Tool for QuoteListTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        let phone = match context.caller_phone() {
            Some(p) => p,
            None => return ToolResult::error(GENERIC_TOOL_ERROR),
        };

        let partner = match self.crm.partner_by_phone(phone).await {
            Ok(Some(partner)) => partner,
            Ok(None) => {
                return ToolResult::success(format!(
                    "No se encontró ningún cliente con el teléfono: {}",
                    phone
                ))
            }
            Err(e) => {
                log::error!("quote list: partner lookup failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        let partner = match billing_partner(&self.crm, partner).await {
            Ok(partner) => partner,
            Err(e) => {
                log::error!("quote list: company lookup failed for {}: {}", phone, e);
                return ToolResult::error(GENERIC_TOOL_ERROR);
            }
        };

        match self.crm.sale_orders_for_partner(partner.id).await {
            Ok(orders) if orders.is_empty() => ToolResult::success(format!(
                "No se encontraron pedidos asociados al teléfono {}",
                phone
            )),
            Ok(orders) => {
                let payload = serde_json::to_string(&orders)
                    .unwrap_or_else(|_| format!("{} pedidos encontrados", orders.len()));
                ToolResult::success(payload)
            }
            Err(e) => {
                log::error!("quote list failed for partner {}: {}", partner.id, e);
                ToolResult::error(GENERIC_TOOL_ERROR)
            }
        }
    }
}
