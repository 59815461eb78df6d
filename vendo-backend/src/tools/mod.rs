pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::{Tool, ToolRegistry};
pub use types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};

use crate::ai::RunBackend;
use crate::alerts::Alerter;
use crate::crm::CrmApi;
use crate::db::ConversationStore;
use std::sync::Arc;

/// Tool names declared on the assistant. The registry is validated against
/// this list at startup.
pub const DECLARED_TOOLS: [&str; 6] = [
    "clean_chat",
    "create_lead",
    "create_partner",
    "get_partner",
    "presupuestos",
    "sale_order_by_name",
];

/// Create a registry with every built-in CRM tool registered.
pub fn create_default_registry(
    crm: Arc<dyn CrmApi>,
    store: Arc<ConversationStore>,
    backend: Arc<dyn RunBackend>,
    alerter: Arc<dyn Alerter>,
    sales_recipient: &str,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(builtin::PartnerLookupTool::new(crm.clone())));
    registry.register(Arc::new(builtin::PartnerCreateTool::new(
        crm.clone(),
        store.clone(),
    )));
    registry.register(Arc::new(builtin::LeadCreateTool::new(
        crm.clone(),
        store.clone(),
        alerter,
        sales_recipient,
    )));
    registry.register(Arc::new(builtin::QuoteListTool::new(crm.clone())));
    registry.register(Arc::new(builtin::QuoteLookupTool::new(crm)));
    registry.register(Arc::new(builtin::ChatResetTool::new(backend, store)));

    registry
}
