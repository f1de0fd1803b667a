//! MCP tool handlers.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mcp::protocol::{ContentBlock, Tool, ToolResult};
use crate::tools::ResourceCategory;

/// Handler for the tools of one resource category.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Category served by this handler.
    fn category(&self) -> ResourceCategory;

    /// Tool definitions, in declaration order.
    fn tools(&self) -> Vec<Tool>;

    /// Validate arguments and run the named tool.
    async fn handle_tool_call(&self, name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult>;
}

/// Registry of category handlers.
pub struct McpHandler {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl McpHandler {
    /// Create a new handler registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a category handler. A later handler for the same category replaces the earlier one.
    pub fn register<T: ToolHandler + 'static>(&mut self, handler: T) {
        self.register_arc(Arc::new(handler));
    }

    /// Register a category handler (Arc version).
    pub fn register_arc(&mut self, handler: Arc<dyn ToolHandler>) {
        let category = handler.category();
        self.handlers.retain(|h| h.category() != category);
        self.handlers.push(handler);
    }

    /// All declared tools, concatenated in registration order.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.handlers.iter().flat_map(|h| h.tools()).collect()
    }

    /// Get the handler for a category.
    pub fn get_handler(&self, category: ResourceCategory) -> Option<Arc<dyn ToolHandler>> {
        self.handlers
            .iter()
            .find(|h| h.category() == category)
            .cloned()
    }

    /// Route a tool call to its category handler.
    pub async fn call_tool(&self, name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult> {
        let handler = ResourceCategory::route(name)
            .and_then(|category| self.get_handler(category))
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        handler.handle_tool_call(name, arguments).await
    }

    /// Check if a tool exists.
    pub fn has_tool(&self, name: &str) -> bool {
        self.list_tools().iter().any(|t| t.name == name)
    }

    /// Get the number of declared tools.
    pub fn tool_count(&self) -> usize {
        self.handlers.iter().map(|h| h.tools().len()).sum()
    }
}

impl Default for McpHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper to create a text content block.
pub fn text_content(text: impl Into<String>) -> ContentBlock {
    ContentBlock::Text { text: text.into() }
}

/// Helper to create a successful tool result.
pub fn success_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: false,
    }
}

/// Helper to create a tool result holding pretty-printed JSON.
pub fn json_result(value: &Value) -> Result<ToolResult> {
    Ok(success_result(serde_json::to_string_pretty(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTools {
        category: ResourceCategory,
        names: Vec<&'static str>,
    }

    #[async_trait]
    impl ToolHandler for EchoTools {
        fn category(&self) -> ResourceCategory {
            self.category
        }

        fn tools(&self) -> Vec<Tool> {
            self.names
                .iter()
                .map(|name| Tool {
                    name: name.to_string(),
                    description: format!("Echo tool: {}", name),
                    input_schema: json!({"type": "object", "properties": {}}),
                })
                .collect()
        }

        async fn handle_tool_call(&self, name: &str, args: HashMap<String, Value>) -> Result<ToolResult> {
            if !self.names.contains(&name) {
                return Err(Error::ToolNotFound(name.to_string()));
            }
            Ok(success_result(format!("{} {}", name, args.len())))
        }
    }

    fn registry() -> McpHandler {
        let mut handler = McpHandler::new();
        handler.register(EchoTools {
            category: ResourceCategory::Projects,
            names: vec!["cucumberstudio_list_projects", "cucumberstudio_get_project"],
        });
        handler.register(EchoTools {
            category: ResourceCategory::TestRuns,
            names: vec!["cucumberstudio_list_builds"],
        });
        handler
    }

    #[test]
    fn test_handler_list_tools_keeps_order() {
        let handler = registry();
        let names: Vec<String> = handler.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "cucumberstudio_list_projects",
                "cucumberstudio_get_project",
                "cucumberstudio_list_builds"
            ]
        );
        assert_eq!(handler.tool_count(), 3);
        assert!(handler.has_tool("cucumberstudio_list_builds"));
        assert!(!handler.has_tool("cucumberstudio_list_scenarios"));
    }

    #[test]
    fn test_register_replaces_same_category() {
        let mut handler = registry();
        handler.register(EchoTools {
            category: ResourceCategory::Projects,
            names: vec!["cucumberstudio_list_projects"],
        });
        assert_eq!(handler.tool_count(), 2);
    }

    #[tokio::test]
    async fn test_call_tool_routes_by_category() {
        let handler = registry();
        let mut args = HashMap::new();
        args.insert("projectId".to_string(), json!("1"));

        let result = handler
            .call_tool("cucumberstudio_list_builds", args)
            .await
            .unwrap();
        match &result.content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "cucumberstudio_list_builds 1"),
        }
    }

    #[tokio::test]
    async fn test_call_tool_unknown() {
        let handler = registry();

        let err = handler
            .call_tool("cucumberstudio_unknown", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(ref n) if n == "cucumberstudio_unknown"));

        // Routed, but no scenario handler is registered.
        let err = handler
            .call_tool("cucumberstudio_list_scenarios", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[test]
    fn test_json_result_is_pretty() {
        let result = json_result(&json!({"projects": []})).unwrap();
        assert!(!result.is_error);
        match &result.content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "{\n  \"projects\": []\n}"),
        }
    }
}
