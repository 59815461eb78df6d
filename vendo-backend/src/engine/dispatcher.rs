//! Concurrent tool-call dispatch with per-call failure isolation.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::ai::{ToolCallRequest, ToolOutput};
use crate::alerts::Alerter;
use crate::engine::TOOL_ERROR_OUTPUT;
use crate::models::ToolInvocation;
use crate::tools::{ToolContext, ToolRegistry};

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    alerter: Arc<dyn Alerter>,
    alert_recipient: String,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        alerter: Arc<dyn Alerter>,
        alert_recipient: &str,
    ) -> Self {
        ToolDispatcher {
            registry,
            alerter,
            alert_recipient: alert_recipient.to_string(),
        }
    }

    /// Execute one batch of tool calls concurrently. Always returns exactly
    /// one output per request, positionally aligned by call id, no matter
    /// which calls fail. A request without a caller identity is answered
    /// with the generic failure text without invoking the tool.
    pub async fn dispatch(
        &self,
        requests: &[ToolCallRequest],
        caller_phone: Option<&str>,
    ) -> (Vec<ToolOutput>, Vec<ToolInvocation>) {
        // Pre-fill every slot with the failure shape; successful calls
        // overwrite theirs, so alignment holds under any completion order.
        let mut outputs: Vec<ToolOutput> = requests
            .iter()
            .map(|request| ToolOutput {
                call_id: request.call_id.clone(),
                output: TOOL_ERROR_OUTPUT.to_string(),
            })
            .collect();
        let mut records: Vec<ToolInvocation> = requests
            .iter()
            .map(|request| ToolInvocation::error(&request.tool_name))
            .collect();

        let mut tasks = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            log::info!(
                "tool call {}: {} {}",
                request.call_id,
                request.tool_name,
                request.arguments
            );

            let phone = match caller_phone {
                Some(phone) => phone.to_string(),
                None => {
                    log::error!("caller identity missing for tool {}", request.tool_name);
                    records[index] = ToolInvocation::no_identity(&request.tool_name);
                    continue;
                }
            };

            let registry = self.registry.clone();
            let name = request.tool_name.clone();
            let arguments = request.arguments.clone();
            let handle = tokio::spawn(async move {
                let context = ToolContext::new().with_caller(&phone);
                registry.execute(&name, arguments, &context).await
            });
            tasks.push((index, handle));
        }

        let settled = join_all(
            tasks
                .into_iter()
                .map(|(index, handle)| async move { (index, handle.await) }),
        )
        .await;

        for (index, joined) in settled {
            let tool_name = requests[index].tool_name.clone();
            match joined {
                Ok(result) if result.success => {
                    log::info!("{}: {}", tool_name, result.content);
                    outputs[index].output = result.content;
                    records[index] = ToolInvocation::success(&tool_name);
                }
                Ok(result) => {
                    let msg = format!("Error running the tool {}: {}", tool_name, result.content);
                    log::error!("{}", msg);
                    self.alerter
                        .notify(&self.alert_recipient, "Assistant tool error", &msg)
                        .await;
                }
                Err(join_error) => {
                    // A panicking tool must not take its siblings down.
                    let msg = format!("Tool task {} aborted: {}", tool_name, join_error);
                    log::error!("{}", msg);
                    self.alerter
                        .notify(&self.alert_recipient, "Assistant tool error", &msg)
                        .await;
                }
            }
        }

        (outputs, records)
    }
}
