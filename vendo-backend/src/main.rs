use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use dotenv::dotenv;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod ai;
mod alerts;
mod config;
mod crm;
mod db;
mod delivery;
mod engine;
mod models;
mod tools;

use ai::{AssistantClient, RunBackend};
use alerts::{Alerter, LogAlerter, WebhookAlerter};
use config::Config;
use crm::{CrmApi, OdooClient};
use db::ConversationStore;
use delivery::{DeliveryChannel, RetryPolicy, WhatsAppSender};
use engine::{chunk_reply, OrchestrationEngine};

const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

// Webhook handling beyond this is worth an operator's attention.
const SLOW_REQUEST: Duration = Duration::from_secs(25);

pub struct AppState {
    pub engine: Arc<OrchestrationEngine>,
    pub delivery: Arc<dyn DeliveryChannel>,
    pub bot_number: String,
    pub message_char_limit: usize,
}

/// Inbound webhook form from the WhatsApp gateway.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "Body", default)]
    body: String,
}

/// `POST /whatsapp`: run the engine, chunk the reply, deliver each chunk.
/// Always answers an empty TwiML document; user-visible errors were already
/// converted to reply text by the engine.
async fn whatsapp_reply(
    state: web::Data<AppState>,
    form: web::Form<InboundMessage>,
) -> HttpResponse {
    let started = Instant::now();
    let request_id = uuid::Uuid::new_v4();

    let phone = form
        .from
        .strip_prefix("whatsapp:")
        .unwrap_or(&form.from)
        .trim_start_matches('+')
        .to_string();
    let text = form.body.trim();
    log::debug!("[{}] inbound message from {}", request_id, phone);

    let reply = state.engine.handle_message(&phone, text).await;

    let chunks = chunk_reply(&reply.text, state.message_char_limit);
    if chunks.len() > 1 {
        log::warn!(
            "[{}] reply to {} fragmented into {} chunks (transport limit)",
            request_id,
            phone,
            chunks.len()
        );
    }
    for chunk in &chunks {
        // Delivery owns its retry and alerting; a lost chunk must not turn
        // into a second error message for the user.
        if let Err(e) = state.delivery.send(chunk, &state.bot_number, &phone).await {
            log::error!("[{}] delivery to {} failed: {}", request_id, phone, e);
        }
    }

    let elapsed = started.elapsed();
    if elapsed > SLOW_REQUEST {
        log::warn!(
            "[{}] webhook handled in {:.1}s for {}",
            request_id,
            elapsed.as_secs_f32(),
            phone
        );
    } else {
        log::debug!(
            "[{}] webhook handled in {:.1}s for {}",
            request_id,
            elapsed.as_secs_f32(),
            phone
        );
    }

    HttpResponse::Ok()
        .content_type("application/xml")
        .body(EMPTY_TWIML)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing conversation store at {}", config.database_url);
    let store = Arc::new(
        ConversationStore::new(&config.database_url)
            .expect("Failed to initialize conversation store"),
    );

    let crm: Arc<dyn CrmApi> =
        Arc::new(OdooClient::from_config(&config).expect("Failed to configure CRM client"));

    let api_key = config
        .openai_api_key
        .as_deref()
        .expect("OPENAI_API_KEY must be set");
    let assistant_id = config
        .assistant_id
        .as_deref()
        .expect("ASSISTANT_ID must be set");
    let backend: Arc<dyn RunBackend> = Arc::new(
        AssistantClient::new(api_key, assistant_id).expect("Failed to create assistant client"),
    );

    let alerter: Arc<dyn Alerter> = match config.alert_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookAlerter::new(url)),
        None => {
            log::warn!("ALERT_WEBHOOK_URL not set; alerts will only be logged");
            Arc::new(LogAlerter)
        }
    };

    log::info!("Initializing tool registry");
    let sales_recipient = config
        .sales_recipient
        .clone()
        .unwrap_or_else(|| config.alert_recipient.clone());
    let registry = Arc::new(tools::create_default_registry(
        crm.clone(),
        store.clone(),
        backend.clone(),
        alerter.clone(),
        &sales_recipient,
    ));
    registry
        .validate_declared(&tools::DECLARED_TOOLS)
        .expect("Tool registry does not match the declared tool schema");
    log::info!("Registered {} tools", registry.len());

    let engine = Arc::new(OrchestrationEngine::new(
        backend,
        store,
        crm,
        registry,
        alerter.clone(),
        &config.alert_recipient,
        config.run_poll_interval,
        config.run_poll_max_attempts,
    ));

    let account_sid = config
        .twilio_account_sid
        .as_deref()
        .expect("TWILIO_ACCOUNT_SID must be set");
    let auth_token = config
        .twilio_auth_token
        .as_deref()
        .expect("TWILIO_AUTH_TOKEN must be set");
    let delivery: Arc<dyn DeliveryChannel> = Arc::new(
        WhatsAppSender::new(
            account_sid,
            auth_token,
            RetryPolicy::default(),
            alerter,
            &config.alert_recipient,
        )
        .expect("Failed to create WhatsApp sender"),
    );

    let bot_number = config.bot_number.clone().expect("BOT_NUMBER must be set");

    let state = web::Data::new(AppState {
        engine,
        delivery,
        bot_number,
        message_char_limit: config.message_char_limit,
    });

    log::info!("Bot online on port {}", port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .route("/whatsapp", web::post().to(whatsapp_reply))
            .route("/health", web::get().to(health))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
