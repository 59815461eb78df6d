//! REST client for an Odoo-style CRM gateway: OAuth client-credentials token
//! with expiry cache, a generic search endpoint and a generic create
//! endpoint. Record fields arrive with `false` standing in for null and
//! relations as `[id, display_name]` pairs, so parsing stays deliberately
//! lenient.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::crm::{CrmApi, Lead, Partner, PartnerStatus, SaleOrder};

const PARTNER_FIELDS: [&str; 7] = [
    "id",
    "name",
    "email",
    "phone",
    "is_company",
    "company_id",
    "parent_id",
];

const ORDER_FIELDS: [&str; 8] = [
    "id",
    "name",
    "partner_id",
    "date_order",
    "state",
    "amount_total",
    "user_id",
    "access_token",
];

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct OdooClient {
    client: Client,
    base_url: String,
    token_path: String,
    search_path: String,
    create_path: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

impl OdooClient {
    pub fn new(
        base_url: &str,
        token_path: &str,
        search_path: &str,
        create_path: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_path: token_path.to_string(),
            search_path: search_path.to_string(),
            create_path: create_path.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, String> {
        let base_url = config
            .odoo_base_url
            .as_deref()
            .ok_or("ODOO_BASE_URL is not set")?;
        let client_id = config
            .odoo_client_id
            .as_deref()
            .ok_or("ODOO_CLIENT_ID is not set")?;
        let client_secret = config
            .odoo_client_secret
            .as_deref()
            .ok_or("ODOO_CLIENT_SECRET is not set")?;

        Self::new(
            base_url,
            &config.odoo_token_path,
            &config.odoo_search_path,
            &config.odoo_create_path,
            client_id,
            client_secret,
        )
    }

    /// Bearer token for the gateway, refreshed when within a minute of
    /// expiry.
    async fn token(&self) -> Result<String, String> {
        {
            let cached = self.token.read().await;
            if let Some(ref token) = *cached {
                if token.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.value.clone());
                }
            }
        }

        log::debug!("requesting CRM OAuth token");
        let response = self
            .client
            .post(format!("{}{}", self.base_url, self.token_path))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| format!("CRM token request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("CRM token request returned {}: {}", status, body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse CRM token response: {}", e))?;
        let value = payload
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or("CRM token response missing access_token")?
            .to_string();
        let expires_in = payload
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(3600);

        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });

        Ok(value)
    }

    async fn search(&self, payload: Value) -> Result<Vec<Value>, String> {
        let token = self.token().await?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, self.search_path))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("CRM search request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("CRM search returned {}: {}", status, body));
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse CRM search response: {}", e))?;
        Ok(rows)
    }

    async fn create(&self, payload: Value) -> Result<Value, String> {
        let token = self.token().await?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, self.create_path))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("CRM create request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("CRM create returned {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse CRM create response: {}", e))
    }

    fn portal_link(&self, order_id: i64, access_token: Option<&str>) -> Option<String> {
        access_token.map(|token| {
            format!(
                "{}/my/orders/{}?access_token={}",
                self.base_url, order_id, token
            )
        })
    }
}

#[async_trait]
impl CrmApi for OdooClient {
    async fn partner_by_phone(&self, phone: &str) -> Result<Option<Partner>, String> {
        let formatted = format_phone_number(phone);
        let rows = self
            .search(json!({
                "model": "res.partner",
                "domain": [["phone", "ilike", formatted]],
                "fields": PARTNER_FIELDS,
                "limit": 1,
            }))
            .await?;

        Ok(rows.first().and_then(partner_from_value))
    }

    async fn partner_by_id(&self, id: i64) -> Result<Option<Partner>, String> {
        let rows = self
            .search(json!({
                "model": "res.partner",
                "domain": [["id", "=", id]],
                "fields": PARTNER_FIELDS,
                "limit": 1,
            }))
            .await?;

        Ok(rows.first().and_then(partner_from_value))
    }

    async fn create_partner(
        &self,
        name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> Result<(Partner, PartnerStatus), String> {
        if let Some(existing) = self.partner_by_phone(phone).await? {
            log::debug!("partner already exists for {}: {}", phone, existing.id);
            return Ok((existing, PartnerStatus::Existing));
        }

        let formatted = format_phone_number(phone);
        let mut record = json!({ "name": name, "phone": formatted });
        if let Some(email) = email {
            record["email"] = json!(email);
        }

        self.create(json!({
            "model": "res.partner",
            "method": "create",
            "args": [record],
            "kwargs": {},
        }))
        .await?;

        match self.partner_by_phone(phone).await? {
            Some(partner) => Ok((partner, PartnerStatus::Created)),
            None => Err(format!(
                "partner created but not found by phone {}",
                formatted
            )),
        }
    }

    async fn create_lead(
        &self,
        partner: &Partner,
        email: Option<&str>,
        description: &str,
    ) -> Result<Lead, String> {
        let created = self
            .create(json!({
                "model": "crm.lead",
                "method": "create",
                "args": [{
                    "stage_id": 1,
                    "type": "opportunity",
                    "name": format!("WhatsApp - {}", partner.name),
                    "email_from": email,
                    "phone": partner.phone,
                    "description": description,
                    "partner_id": partner.id,
                }],
                "kwargs": {},
            }))
            .await?;

        lead_from_value(&created, &partner.name)
            .ok_or_else(|| format!("unexpected lead create response: {}", created))
    }

    async fn sale_orders_for_partner(&self, partner_id: i64) -> Result<Vec<SaleOrder>, String> {
        let rows = self
            .search(json!({
                "model": "sale.order",
                "domain": [["partner_id", "=", partner_id]],
                "fields": ["id", "name", "date_order", "state", "partner_id", "amount_total"],
                "order": "state",
            }))
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| order_from_value(row, None))
            .collect())
    }

    async fn sale_order_by_name(&self, name: &str) -> Result<Option<SaleOrder>, String> {
        let rows = self
            .search(json!({
                "model": "sale.order",
                "domain": [["name", "ilike", name]],
                "fields": ORDER_FIELDS,
                "limit": 1,
            }))
            .await?;

        Ok(rows.first().and_then(|row| {
            let access_token = opt_str(row.get("access_token"));
            let id = row.get("id").and_then(|v| v.as_i64())?;
            order_from_value(row, self.portal_link(id, access_token.as_deref()).as_deref())
        }))
    }
}

/// Normalize a raw phone number into the CRM's `+NN NNN NN NN NN` layout.
pub fn format_phone_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 9 {
        return format!("+{}", digits);
    }

    format!(
        "+{} {} {} {} {}",
        &digits[..2],
        &digits[2..5],
        &digits[5..7],
        &digits[7..9],
        &digits[9..]
    )
    .trim_end()
    .to_string()
}

/// String field that may arrive as `false` when empty.
fn opt_str(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Relation field: `[id, display_name]`, or `false` when unset.
fn relation(value: Option<&Value>) -> (Option<i64>, Option<String>) {
    match value {
        Some(Value::Array(pair)) => (
            pair.first().and_then(|v| v.as_i64()),
            pair.get(1).and_then(|v| v.as_str()).map(|s| s.to_string()),
        ),
        Some(Value::Number(n)) => (n.as_i64(), None),
        _ => (None, None),
    }
}

fn partner_from_value(row: &Value) -> Option<Partner> {
    let (parent_id, _) = relation(row.get("parent_id"));
    Some(Partner {
        id: row.get("id")?.as_i64()?,
        name: row.get("name")?.as_str()?.to_string(),
        email: opt_str(row.get("email")),
        phone: opt_str(row.get("phone")),
        is_company: row
            .get("is_company")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        parent_id,
    })
}

fn order_from_value(row: &Value, portal_link: Option<&str>) -> Option<SaleOrder> {
    let (partner_id, partner_name) = relation(row.get("partner_id"));
    Some(SaleOrder {
        id: row.get("id")?.as_i64()?,
        name: row.get("name")?.as_str()?.to_string(),
        date_order: opt_str(row.get("date_order")),
        state: opt_str(row.get("state")).unwrap_or_default(),
        partner_id: partner_id?,
        partner_name,
        amount_total: row.get("amount_total").and_then(|v| v.as_f64()),
        portal_link: portal_link.map(|s| s.to_string()),
    })
}

/// The create endpoint answers `[[id, name]]`, `[id]` or a bare id depending
/// on the gateway version.
fn lead_from_value(value: &Value, partner_name: &str) -> Option<Lead> {
    let fallback_name = format!("WhatsApp - {}", partner_name);
    match value {
        Value::Number(n) => Some(Lead {
            id: n.as_i64()?,
            name: fallback_name,
        }),
        Value::Array(rows) => match rows.first()? {
            Value::Number(n) => Some(Lead {
                id: n.as_i64()?,
                name: fallback_name,
            }),
            Value::Array(pair) => Some(Lead {
                id: pair.first()?.as_i64()?,
                name: pair
                    .get(1)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or(fallback_name),
            }),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_phone_number() {
        assert_eq!(format_phone_number("34936069261"), "+34 936 06 92 61");
        assert_eq!(format_phone_number("+34 936 069 261"), "+34 936 06 92 61");
        assert_eq!(format_phone_number("12345"), "+12345");
    }

    #[test]
    fn test_partner_parsing_tolerates_false_fields() {
        let row = serde_json::json!({
            "id": 7,
            "name": "Ana Pérez",
            "email": false,
            "phone": "+34 936 06 92 61",
            "is_company": false,
            "parent_id": [3, "Acme SL"],
        });

        let partner = partner_from_value(&row).unwrap();
        assert_eq!(partner.id, 7);
        assert_eq!(partner.email, None);
        assert_eq!(partner.parent_id, Some(3));
        assert!(!partner.is_company);
    }

    #[test]
    fn test_order_parsing() {
        let row = serde_json::json!({
            "id": 42,
            "name": "S00042",
            "date_order": "2025-11-02 10:00:00",
            "state": "sale",
            "partner_id": [7, "Ana Pérez"],
            "amount_total": 1234.5,
        });

        let order = order_from_value(&row, Some("https://crm/my/orders/42?access_token=t")).unwrap();
        assert_eq!(order.partner_id, 7);
        assert_eq!(order.partner_name.as_deref(), Some("Ana Pérez"));
        assert_eq!(order.amount_total, Some(1234.5));
        assert!(order.portal_link.unwrap().contains("/my/orders/42"));
    }

    #[test]
    fn test_lead_create_response_shapes() {
        assert_eq!(lead_from_value(&serde_json::json!(9), "Ana").unwrap().id, 9);
        assert_eq!(
            lead_from_value(&serde_json::json!([9]), "Ana").unwrap().id,
            9
        );
        let lead = lead_from_value(&serde_json::json!([[9, "WhatsApp - Ana"]]), "Ana").unwrap();
        assert_eq!(lead.id, 9);
        assert_eq!(lead.name, "WhatsApp - Ana");
    }
}
