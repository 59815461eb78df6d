//! Integration tests for the orchestration engine: first-contact context
//! injection, tool-batch failure isolation, blocking detection, the reset
//! keyword, and conversation independence.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::ai::{MockRunBackend, RunScript, ToolCallRequest};
use crate::crm::{CrmApi, Lead, Partner, PartnerStatus, SaleOrder};
use crate::tools;

/// Captures every alert so tests can assert on exact counts.
#[derive(Default)]
struct RecordingAlerter {
    notifications: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Alerter for RecordingAlerter {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) {
        self.notifications.lock().unwrap().push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
    }
}

impl RecordingAlerter {
    fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    fn bodies(&self) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, body)| body.clone())
            .collect()
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// In-memory CRM fake. `fail_orders` makes every order query error so the
/// dispatcher's failure isolation can be exercised with a real tool.
struct FakeCrm {
    partners: Mutex<Vec<Partner>>,
    next_id: AtomicI64,
    fail_orders: bool,
}

impl FakeCrm {
    fn new(partners: Vec<Partner>, fail_orders: bool) -> Self {
        let next_id = partners.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        FakeCrm {
            partners: Mutex::new(partners),
            next_id: AtomicI64::new(next_id),
            fail_orders,
        }
    }
}

#[async_trait]
impl CrmApi for FakeCrm {
    async fn partner_by_phone(&self, phone: &str) -> Result<Option<Partner>, String> {
        let wanted = digits(phone);
        Ok(self
            .partners
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.phone.as_deref().map(digits) == Some(wanted.clone()))
            .cloned())
    }

    async fn partner_by_id(&self, id: i64) -> Result<Option<Partner>, String> {
        Ok(self
            .partners
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn create_partner(
        &self,
        name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> Result<(Partner, PartnerStatus), String> {
        if let Some(existing) = self.partner_by_phone(phone).await? {
            return Ok((existing, PartnerStatus::Existing));
        }

        let partner = Partner {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            email: email.map(|e| e.to_string()),
            phone: Some(digits(phone)),
            is_company: false,
            parent_id: None,
        };
        self.partners.lock().unwrap().push(partner.clone());
        Ok((partner, PartnerStatus::Created))
    }

    async fn create_lead(
        &self,
        partner: &Partner,
        _email: Option<&str>,
        _description: &str,
    ) -> Result<Lead, String> {
        Ok(Lead {
            id: 1,
            name: format!("WhatsApp - {}", partner.name),
        })
    }

    async fn sale_orders_for_partner(&self, _partner_id: i64) -> Result<Vec<SaleOrder>, String> {
        if self.fail_orders {
            return Err("CRM gateway timeout".to_string());
        }
        Ok(vec![])
    }

    async fn sale_order_by_name(&self, _name: &str) -> Result<Option<SaleOrder>, String> {
        if self.fail_orders {
            return Err("CRM gateway timeout".to_string());
        }
        Ok(None)
    }
}

/// Wires an in-memory store, a scripted run backend, a recording alerter
/// and the full default tool registry into an engine.
struct TestHarness {
    engine: OrchestrationEngine,
    backend: Arc<MockRunBackend>,
    store: Arc<ConversationStore>,
    alerter: Arc<RecordingAlerter>,
}

impl TestHarness {
    fn new(scripts: Vec<RunScript>, partners: Vec<Partner>, fail_orders: bool) -> Self {
        let store = Arc::new(ConversationStore::new(":memory:").expect("in-memory store"));
        let backend = Arc::new(MockRunBackend::new(scripts));
        let alerter = Arc::new(RecordingAlerter::default());
        let crm: Arc<dyn CrmApi> = Arc::new(FakeCrm::new(partners, fail_orders));

        let backend_dyn: Arc<dyn RunBackend> = backend.clone();
        let alerter_dyn: Arc<dyn Alerter> = alerter.clone();
        let registry = Arc::new(tools::create_default_registry(
            crm.clone(),
            store.clone(),
            backend_dyn.clone(),
            alerter_dyn.clone(),
            "sales@example.test",
        ));

        let engine = OrchestrationEngine::new(
            backend_dyn,
            store.clone(),
            crm,
            registry,
            alerter_dyn,
            "ops@example.test",
            Duration::from_millis(1),
            50,
        );

        TestHarness {
            engine,
            backend,
            store,
            alerter,
        }
    }
}

fn partner_fixture(phone: &str) -> Partner {
    Partner {
        id: 7,
        name: "Ana Pérez".to_string(),
        email: Some("ana@example.test".to_string()),
        phone: Some(phone.to_string()),
        is_company: false,
        parent_id: None,
    }
}

fn tool_call(call_id: &str, tool_name: &str) -> ToolCallRequest {
    ToolCallRequest {
        call_id: call_id.to_string(),
        tool_name: tool_name.to_string(),
        arguments: json!({}),
    }
}

const PHONE: &str = "34600111222";

#[tokio::test]
async fn first_message_from_unknown_user_injects_name_request_context() {
    let harness = TestHarness::new(
        vec![RunScript::completed("¡Hola! ¿Cómo te llamas?")],
        vec![],
        false,
    );

    let reply = harness.engine.handle_message(PHONE, "Hola").await;

    assert_eq!(reply.text, "¡Hola! ¿Cómo te llamas?");
    assert!(reply.tools_invoked.is_empty());

    // The context message lands on the thread before the user's text.
    let messages = harness.backend.created_messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].2.contains("Pídele el nombre"));
    assert_eq!(messages[1].2, "Hola");

    let conversation = harness.store.get(PHONE).unwrap().unwrap();
    assert!(conversation.name.is_none());
    // User message + assistant reply were both persisted.
    assert_eq!(conversation.interactions, 2);
    assert!(conversation.pending_run_id.is_none());
}

#[tokio::test]
async fn first_message_from_known_user_injects_their_name() {
    let harness = TestHarness::new(
        vec![RunScript::completed("¡Hola Ana!")],
        vec![partner_fixture(PHONE)],
        false,
    );

    let reply = harness.engine.handle_message(PHONE, "Hola").await;
    assert_eq!(reply.text, "¡Hola Ana!");

    let messages = harness.backend.created_messages.lock().unwrap().clone();
    assert!(messages[0].2.contains("se llama Ana Pérez"));

    let conversation = harness.store.get(PHONE).unwrap().unwrap();
    assert_eq!(conversation.name.as_deref(), Some("Ana Pérez"));
}

#[tokio::test]
async fn tool_batch_isolates_failures_and_aligns_outputs() {
    // One batch of two calls: the partner lookup succeeds, the quote list
    // hits a failing CRM.
    let harness = TestHarness::new(
        vec![RunScript::with_tools(
            vec![vec![
                tool_call("call_1", "get_partner"),
                tool_call("call_2", "presupuestos"),
            ]],
            "Aquí tienes tus datos",
        )],
        vec![partner_fixture(PHONE)],
        true,
    );

    let reply = harness.engine.handle_message(PHONE, "Dame mis pedidos").await;

    assert_eq!(reply.text, "Aquí tienes tus datos");
    assert_eq!(
        reply.tools_invoked,
        vec!["get_partner".to_string(), "presupuestos_ERROR".to_string()]
    );

    // The outputs went back as one batch, positionally aligned by call id.
    let submissions = harness.backend.submitted_outputs.lock().unwrap().clone();
    assert_eq!(submissions.len(), 1);
    let batch = &submissions[0];
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].call_id, "call_1");
    assert!(batch[0].output.contains("Socio existente"));
    assert_eq!(batch[1].call_id, "call_2");
    assert_eq!(batch[1].output, TOOL_ERROR_OUTPUT);

    // Exactly one alert for the one failed call.
    assert_eq!(harness.alerter.count(), 1);
    assert!(harness.alerter.bodies()[0].contains("presupuestos"));
}

#[tokio::test]
async fn message_during_pending_run_is_blocked_and_reset_recovers() {
    let harness = TestHarness::new(
        vec![RunScript::completed("nunca debería usarse")],
        vec![],
        false,
    );

    // Simulate a run that never settled (process crash mid-poll).
    harness.store.create(PHONE, "thread_stuck", None).unwrap();
    harness.store.set_pending_run(PHONE, "run_stuck").unwrap();

    let reply = harness.engine.handle_message(PHONE, "¿Sigues ahí?").await;
    assert!(reply.text.contains("/reset"));
    assert!(reply.tools_invoked.is_empty());

    // No run was started and nothing reached the thread.
    assert_eq!(harness.backend.scripts_remaining(), 1);
    assert!(harness.backend.created_messages.lock().unwrap().is_empty());
    assert!(harness.store.get(PHONE).unwrap().unwrap().blocked);

    // The reset keyword recovers the conversation.
    let reply = harness.engine.handle_message(PHONE, "/reset").await;
    assert_eq!(reply.text, RESET_CONFIRMATION);

    let conversation = harness.store.get(PHONE).unwrap().unwrap();
    assert_ne!(conversation.thread_id, "thread_stuck");
    assert_eq!(conversation.interactions, 0);
    assert!(!conversation.blocked);
    assert!(conversation.pending_run_id.is_none());
}

#[tokio::test]
async fn identical_messages_from_two_users_stay_independent() {
    let harness = TestHarness::new(
        vec![
            RunScript::completed("Respuesta para el primero"),
            RunScript::completed("Respuesta para el segundo"),
        ],
        vec![],
        false,
    );

    let first = harness.engine.handle_message("34600000001", "Hola").await;
    let second = harness.engine.handle_message("34600000002", "Hola").await;

    assert_eq!(first.text, "Respuesta para el primero");
    assert_eq!(second.text, "Respuesta para el segundo");

    let a = harness.store.get("34600000001").unwrap().unwrap();
    let b = harness.store.get("34600000002").unwrap().unwrap();
    assert_ne!(a.thread_id, b.thread_id);
    assert_eq!(a.interactions, 2);
    assert_eq!(b.interactions, 2);
}

#[tokio::test]
async fn failed_run_returns_apology_alerts_and_resets() {
    let harness = TestHarness::new(vec![RunScript::failed()], vec![], false);

    let reply = harness.engine.handle_message(PHONE, "Hola").await;
    assert_eq!(reply.text, "Ha ocurrido un error. Por favor, consulte más tarde.");
    assert!(reply.tools_invoked.is_empty());

    // The operator alert carries the failing input.
    assert_eq!(harness.alerter.count(), 1);
    assert!(harness.alerter.bodies()[0].contains("Hola"));

    // The conversation came back reset: fresh thread, empty history.
    let conversation = harness.store.get(PHONE).unwrap().unwrap();
    assert_eq!(conversation.interactions, 0);
    assert!(conversation.pending_run_id.is_none());
    assert!(harness.store.messages(PHONE).unwrap().is_empty());
}

#[tokio::test]
async fn reset_for_unknown_phone_still_confirms() {
    let harness = TestHarness::new(vec![], vec![], false);

    let reply = harness.engine.handle_message(PHONE, "/reset").await;
    assert_eq!(reply.text, RESET_CONFIRMATION);
    assert!(harness.store.get(PHONE).unwrap().is_none());
}

#[tokio::test]
async fn empty_tool_batch_dispatch_returns_empty_vectors() {
    let harness = TestHarness::new(vec![], vec![], false);
    let registry = Arc::new(tools::ToolRegistry::new());
    let alerter: Arc<dyn Alerter> = harness.alerter.clone();
    let dispatcher = ToolDispatcher::new(registry, alerter, "ops@example.test");

    let (outputs, records) = dispatcher.dispatch(&[], Some(PHONE)).await;
    assert!(outputs.is_empty());
    assert!(records.is_empty());
    assert_eq!(harness.alerter.count(), 0);
}

#[tokio::test]
async fn dispatch_without_identity_short_circuits_without_invoking_tools() {
    let harness = TestHarness::new(vec![], vec![partner_fixture(PHONE)], false);
    let registry = Arc::new(tools::ToolRegistry::new());
    let alerter: Arc<dyn Alerter> = harness.alerter.clone();
    let dispatcher = ToolDispatcher::new(registry, alerter, "ops@example.test");

    let requests = vec![
        tool_call("call_1", "get_partner"),
        tool_call("call_2", "create_lead"),
    ];
    let (outputs, records) = dispatcher.dispatch(&requests, None).await;

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].call_id, "call_1");
    assert_eq!(outputs[0].output, TOOL_ERROR_OUTPUT);
    assert_eq!(outputs[1].output, TOOL_ERROR_OUTPUT);
    assert_eq!(
        records.iter().map(|r| r.label()).collect::<Vec<_>>(),
        vec!["NO_IDENTITY".to_string(), "NO_IDENTITY".to_string()]
    );
    // The tools were never reached, so nothing alerted.
    assert_eq!(harness.alerter.count(), 0);
}

#[tokio::test]
async fn second_message_after_settled_run_is_not_blocked() {
    let harness = TestHarness::new(
        vec![
            RunScript::completed("primera respuesta"),
            RunScript::completed("segunda respuesta"),
        ],
        vec![],
        false,
    );

    let first = harness.engine.handle_message(PHONE, "Hola").await;
    assert_eq!(first.text, "primera respuesta");

    // The run settled, so the next message flows normally.
    let second = harness.engine.handle_message(PHONE, "¿Y mis pedidos?").await;
    assert_eq!(second.text, "segunda respuesta");
    assert_eq!(harness.store.get(PHONE).unwrap().unwrap().interactions, 4);
}
