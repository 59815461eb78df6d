use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::ai::{
    Run, RunBackend, RunBackendError, RunStatus, ThreadMessage, ToolCallRequest, ToolOutput,
};
use crate::models::MessageRole;
use async_trait::async_trait;

/// HTTP client for the assistant thread/run API.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: Client,
    base_url: String,
    assistant_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ObjectWithId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
    status: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    #[serde(default)]
    submit_tool_outputs: Option<SubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputs {
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    /// JSON-encoded argument object, as the API ships it.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    value: String,
}

#[derive(Debug, Serialize)]
struct SubmitOutputsRequest<'a> {
    tool_outputs: Vec<WireToolOutput<'a>>,
}

#[derive(Debug, Serialize)]
struct WireToolOutput<'a> {
    tool_call_id: &'a str,
    output: &'a str,
}

impl AssistantClient {
    pub fn new(api_key: &str, assistant_id: &str) -> Result<Self, String> {
        Self::with_base_url(api_key, assistant_id, "https://api.openai.com/v1")
    }

    pub fn with_base_url(
        api_key: &str,
        assistant_id: &str,
        base_url: &str,
    ) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(
            "OpenAI-Beta",
            header::HeaderValue::from_static("assistants=v2"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            assistant_id: assistant_id.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read a successful response body, or convert an API error body into a
    /// `RunBackendError` carrying the status code.
    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, RunBackendError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(RunBackendError::api(parsed.error.message, status.as_u16()));
            }
            return Err(RunBackendError::api(
                format!("unexpected response body: {}", error_text),
                status.as_u16(),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RunBackendError::new(format!("failed to parse response: {}", e)))
    }

    fn run_from_response(response: RunResponse) -> Run {
        let required_actions = response
            .required_action
            .and_then(|ra| ra.submit_tool_outputs)
            .map(|sto| {
                sto.tool_calls
                    .into_iter()
                    .map(|call| ToolCallRequest {
                        call_id: call.id,
                        tool_name: call.function.name,
                        arguments: serde_json::from_str::<Value>(&call.function.arguments)
                            .unwrap_or_else(|_| json!({})),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Run {
            id: response.id,
            status: RunStatus::from_str(&response.status),
            required_actions,
        }
    }
}

#[async_trait]
impl RunBackend for AssistantClient {
    async fn create_thread(&self) -> Result<String, RunBackendError> {
        log::debug!("creating assistant thread");
        let response = self
            .client
            .post(self.url("/threads"))
            .json(&json!({}))
            .send()
            .await?;

        let thread: ObjectWithId = Self::read_json(response).await?;
        log::debug!("thread created: {}", thread.id);
        Ok(thread.id)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), RunBackendError> {
        let response = self
            .client
            .delete(self.url(&format!("/threads/{}", thread_id)))
            .send()
            .await?;

        let _: Value = Self::read_json(response).await?;
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<String, RunBackendError> {
        let response = self
            .client
            .post(self.url(&format!("/threads/{}/messages", thread_id)))
            .json(&json!({ "role": role.as_str(), "content": content }))
            .send()
            .await?;

        let message: ObjectWithId = Self::read_json(response).await?;
        Ok(message.id)
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, RunBackendError> {
        let response = self
            .client
            .post(self.url(&format!("/threads/{}/runs", thread_id)))
            .json(&json!({ "assistant_id": self.assistant_id }))
            .send()
            .await?;

        let run: RunResponse = Self::read_json(response).await?;
        Ok(Self::run_from_response(run))
    }

    async fn poll_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RunBackendError> {
        let response = self
            .client
            .get(self.url(&format!("/threads/{}/runs/{}", thread_id, run_id)))
            .send()
            .await?;

        let run: RunResponse = Self::read_json(response).await?;
        Ok(Self::run_from_response(run))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, RunBackendError> {
        let request = SubmitOutputsRequest {
            tool_outputs: outputs
                .iter()
                .map(|o| WireToolOutput {
                    tool_call_id: &o.call_id,
                    output: &o.output,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.url(&format!(
                "/threads/{}/runs/{}/submit_tool_outputs",
                thread_id, run_id
            )))
            .json(&request)
            .send()
            .await?;

        let run: RunResponse = Self::read_json(response).await?;
        Ok(Self::run_from_response(run))
    }

    async fn list_messages_after(
        &self,
        thread_id: &str,
        after_message_id: &str,
    ) -> Result<Vec<ThreadMessage>, RunBackendError> {
        let response = self
            .client
            .get(self.url(&format!("/threads/{}/messages", thread_id)))
            .query(&[("order", "asc"), ("after", after_message_id)])
            .send()
            .await?;

        let list: MessageList = Self::read_json(response).await?;

        Ok(list
            .data
            .into_iter()
            .map(|message| {
                let content = message
                    .content
                    .iter()
                    .filter(|block| block.block_type == "text")
                    .filter_map(|block| block.text.as_ref().map(|t| t.value.clone()))
                    .collect::<Vec<_>>()
                    .join("\n");
                ThreadMessage {
                    id: message.id,
                    role: MessageRole::from_str(&message.role).unwrap_or(MessageRole::Assistant),
                    content,
                }
            })
            .collect())
    }
}
