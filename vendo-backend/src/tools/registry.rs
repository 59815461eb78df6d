use crate::tools::types::{ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition matching the assistant's declared schema
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given parameters
    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult;

    /// Returns the tool's name
    fn name(&self) -> String {
        self.definition().name
    }
}

/// Registry that holds all available tools, keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted for stable output
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get count of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Verify at startup that every tool name the assistant declares
    /// resolves here, so an unknown name fails fast instead of at call time.
    pub fn validate_declared(&self, declared: &[&str]) -> Result<(), String> {
        let missing: Vec<&str> = declared
            .iter()
            .copied()
            .filter(|name| !self.has_tool(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "declared tools missing from registry: {} (registered: {})",
                missing.join(", "),
                self.names().join(", ")
            ))
        }
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, params: Value, context: &ToolContext) -> ToolResult {
        let tool = match self.get(name) {
            Some(t) => t,
            None => return ToolResult::error(format!("Tool '{}' not found", name)),
        };

        tool.execute(params, context).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolInputSchema;

    struct MockTool {
        definition: ToolDefinition,
    }

    impl MockTool {
        fn new(name: &str) -> Self {
            MockTool {
                definition: ToolDefinition {
                    name: name.to_string(),
                    description: format!("Mock {} tool", name),
                    input_schema: ToolInputSchema::default(),
                },
            }
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn definition(&self) -> ToolDefinition {
            self.definition.clone()
        }

        async fn execute(&self, _params: Value, _context: &ToolContext) -> ToolResult {
            ToolResult::success("mock result")
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool::new("get_partner")));

        assert!(registry.has_tool("get_partner"));
        assert!(!registry.has_tool("nonexistent"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_declared_fails_fast_on_unknown_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool::new("get_partner")));

        assert!(registry.validate_declared(&["get_partner"]).is_ok());

        let err = registry
            .validate_declared(&["get_partner", "launch_rocket"])
            .unwrap_err();
        assert!(err.contains("launch_rocket"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_an_error_result() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("missing", serde_json::json!({}), &ToolContext::new())
            .await;
        assert!(!result.success);
        assert!(result.content.contains("not found"));
    }
}
