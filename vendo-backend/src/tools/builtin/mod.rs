mod chat_reset;
mod lead_create;
mod partner_create;
mod partner_lookup;
mod quote_list;
mod quote_lookup;

pub use chat_reset::ChatResetTool;
pub use lead_create::LeadCreateTool;
pub use partner_create::PartnerCreateTool;
pub use partner_lookup::PartnerLookupTool;
pub use quote_list::QuoteListTool;
pub use quote_lookup::QuoteLookupTool;

/// Shared failure text handed to the model when a tool cannot answer.
pub(crate) const GENERIC_TOOL_ERROR: &str =
    "Ha ocurrido un error, por favor realice la consulta más tarde.";
