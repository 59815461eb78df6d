use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// JSON Schema property definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn string(description: &str) -> Self {
        PropertySchema {
            schema_type: "string".to_string(),
            description: description.to_string(),
            default: None,
            enum_values: None,
        }
    }
}

/// Tool input schema using JSON Schema format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: vec![],
        }
    }
}

impl ToolInputSchema {
    pub fn new(properties: Vec<(&str, PropertySchema)>, required: Vec<&str>) -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: properties
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
            required: required.into_iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Tool definition mirroring the schema declared on the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// Result of tool execution. `success` is the only failure signal: an empty
/// `content` on a successful call is a legitimate output, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let msg = message.into();
        ToolResult {
            success: false,
            content: msg.clone(),
            error: Some(msg),
        }
    }
}

/// Context provided to tools during execution. Every CRM tool requires the
/// caller identity; the dispatcher refuses to invoke a tool without one.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub caller_phone: Option<String>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caller(mut self, phone: &str) -> Self {
        self.caller_phone = Some(phone.to_string());
        self
    }

    pub fn caller_phone(&self) -> Option<&str> {
        self.caller_phone.as_deref()
    }
}
