pub mod client;

pub use client::OdooClient;

use async_trait::async_trait;
use serde::Serialize;

/// CRM contact record.
#[derive(Debug, Clone, Serialize)]
pub struct Partner {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_company: bool,
    pub parent_id: Option<i64>,
}

/// Sale order / quote as exposed to the assistant.
#[derive(Debug, Clone, Serialize)]
pub struct SaleOrder {
    pub id: i64,
    pub name: String,
    pub date_order: Option<String>,
    pub state: String,
    pub partner_id: i64,
    pub partner_name: Option<String>,
    pub amount_total: Option<f64>,
    pub portal_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
}

/// Whether `create_partner` found an existing contact or created one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerStatus {
    Existing,
    Created,
}

/// Collaborator interface over the CRM back office.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn partner_by_phone(&self, phone: &str) -> Result<Option<Partner>, String>;

    async fn partner_by_id(&self, id: i64) -> Result<Option<Partner>, String>;

    /// Find-or-create semantics: an existing contact with the same phone is
    /// returned as-is instead of being duplicated.
    async fn create_partner(
        &self,
        name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> Result<(Partner, PartnerStatus), String>;

    async fn create_lead(
        &self,
        partner: &Partner,
        email: Option<&str>,
        description: &str,
    ) -> Result<Lead, String>;

    async fn sale_orders_for_partner(&self, partner_id: i64) -> Result<Vec<SaleOrder>, String>;

    async fn sale_order_by_name(&self, name: &str) -> Result<Option<SaleOrder>, String>;
}
