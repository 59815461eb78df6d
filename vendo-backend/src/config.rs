use std::env;
use std::time::Duration;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";

    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const ASSISTANT_ID: &str = "ASSISTANT_ID";
    pub const RUN_POLL_INTERVAL_MS: &str = "RUN_POLL_INTERVAL_MS";
    pub const RUN_POLL_MAX_ATTEMPTS: &str = "RUN_POLL_MAX_ATTEMPTS";

    pub const ODOO_BASE_URL: &str = "ODOO_BASE_URL";
    pub const ODOO_TOKEN_PATH: &str = "ODOO_TOKEN_PATH";
    pub const ODOO_SEARCH_PATH: &str = "ODOO_SEARCH_PATH";
    pub const ODOO_CREATE_PATH: &str = "ODOO_CREATE_PATH";
    pub const ODOO_CLIENT_ID: &str = "ODOO_CLIENT_ID";
    pub const ODOO_CLIENT_SECRET: &str = "ODOO_CLIENT_SECRET";

    pub const TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
    pub const TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
    pub const BOT_NUMBER: &str = "BOT_NUMBER";
    pub const MESSAGE_CHAR_LIMIT: &str = "MESSAGE_CHAR_LIMIT";

    pub const ALERT_WEBHOOK_URL: &str = "ALERT_WEBHOOK_URL";
    pub const ALERT_RECIPIENT: &str = "ALERT_RECIPIENT";
    pub const SALES_RECIPIENT: &str = "SALES_RECIPIENT";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 3026;
    pub const DATABASE_URL: &str = "./.db/vendo.db";
    // WhatsApp transport limit per outbound message
    pub const MESSAGE_CHAR_LIMIT: usize = 1500;
    pub const RUN_POLL_INTERVAL_MS: u64 = 1000;
    pub const RUN_POLL_MAX_ATTEMPTS: u32 = 120;
    pub const ODOO_TOKEN_PATH: &str = "/api/v1/token";
    pub const ODOO_SEARCH_PATH: &str = "/api/v1/search";
    pub const ODOO_CREATE_PATH: &str = "/api/v1/create";
    pub const ALERT_RECIPIENT: &str = "operations";
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,

    pub openai_api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub run_poll_interval: Duration,
    pub run_poll_max_attempts: u32,

    pub odoo_base_url: Option<String>,
    pub odoo_token_path: String,
    pub odoo_search_path: String,
    pub odoo_create_path: String,
    pub odoo_client_id: Option<String>,
    pub odoo_client_secret: Option<String>,

    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub bot_number: Option<String>,
    pub message_char_limit: usize,

    pub alert_webhook_url: Option<String>,
    pub alert_recipient: String,
    pub sales_recipient: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: parse_or(env_vars::PORT, defaults::PORT),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),

            openai_api_key: env::var(env_vars::OPENAI_API_KEY).ok(),
            assistant_id: env::var(env_vars::ASSISTANT_ID).ok(),
            run_poll_interval: Duration::from_millis(parse_or(
                env_vars::RUN_POLL_INTERVAL_MS,
                defaults::RUN_POLL_INTERVAL_MS,
            )),
            run_poll_max_attempts: parse_or(
                env_vars::RUN_POLL_MAX_ATTEMPTS,
                defaults::RUN_POLL_MAX_ATTEMPTS,
            ),

            odoo_base_url: env::var(env_vars::ODOO_BASE_URL).ok(),
            odoo_token_path: env::var(env_vars::ODOO_TOKEN_PATH)
                .unwrap_or_else(|_| defaults::ODOO_TOKEN_PATH.to_string()),
            odoo_search_path: env::var(env_vars::ODOO_SEARCH_PATH)
                .unwrap_or_else(|_| defaults::ODOO_SEARCH_PATH.to_string()),
            odoo_create_path: env::var(env_vars::ODOO_CREATE_PATH)
                .unwrap_or_else(|_| defaults::ODOO_CREATE_PATH.to_string()),
            odoo_client_id: env::var(env_vars::ODOO_CLIENT_ID).ok(),
            odoo_client_secret: env::var(env_vars::ODOO_CLIENT_SECRET).ok(),

            twilio_account_sid: env::var(env_vars::TWILIO_ACCOUNT_SID).ok(),
            twilio_auth_token: env::var(env_vars::TWILIO_AUTH_TOKEN).ok(),
            bot_number: env::var(env_vars::BOT_NUMBER).ok(),
            message_char_limit: parse_or(
                env_vars::MESSAGE_CHAR_LIMIT,
                defaults::MESSAGE_CHAR_LIMIT,
            ),

            alert_webhook_url: env::var(env_vars::ALERT_WEBHOOK_URL).ok(),
            alert_recipient: env::var(env_vars::ALERT_RECIPIENT)
                .unwrap_or_else(|_| defaults::ALERT_RECIPIENT.to_string()),
            sales_recipient: env::var(env_vars::SALES_RECIPIENT).ok(),
        }
    }
}
