//! Action word tools.
//!
//! Action words are the reusable steps scenarios are built from.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::validation::{IdField, ToolArgs};
use super::{
    base_summary, detail_payload, filter_schema, list_payload, object_schema, pagination_schema,
    string_property, tool_def, ResourceCategory, TOOL_PREFIX,
};
use crate::api::client::CucumberStudioApi;
use crate::api::types::Resource;
use crate::error::{Error, Result};
use crate::mcp::handler::{json_result, ToolHandler};
use crate::mcp::protocol::{Tool, ToolResult};

pub struct ActionWordTools {
    client: Arc<dyn CucumberStudioApi>,
}

impl ActionWordTools {
    pub fn new(client: Arc<dyn CucumberStudioApi>) -> Self {
        Self { client }
    }

    async fn list_action_words(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "list_action_words")?;
        let params = args.list_params("list_action_words")?;
        let response = self.client.get_action_words(&project_id, &params).await?;
        Ok(list_payload("action_words", &response, action_word_summary, vec![]))
    }

    async fn get_action_word(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "get_action_word")?;
        let action_word_id = args.require_id(IdField::ActionWord, "get_action_word")?;
        let response = self
            .client
            .get_action_word(&project_id, &action_word_id)
            .await?;
        Ok(detail_payload("action_word", &response, action_word_summary))
    }

    async fn find_action_words_by_tags(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "find_action_words_by_tags")?;
        let tags = args.require_tags("find_action_words_by_tags")?;
        let params = args.page_params("find_action_words_by_tags")?;
        let response = self
            .client
            .find_action_words_by_tags(&project_id, &tags, &params)
            .await?;
        Ok(list_payload(
            "action_words",
            &response,
            action_word_summary,
            vec![("search_tags", json!(tags))],
        ))
    }
}

fn action_word_summary(action_word: &Resource) -> Value {
    let mut fields = base_summary(action_word, action_word.attr("name"));
    fields.insert(
        "description".to_string(),
        json!(action_word.attr_str_or("description", "")),
    );
    fields.insert(
        "definition".to_string(),
        json!(action_word.attr_str_or("definition", "")),
    );
    Value::Object(fields)
}

#[async_trait]
impl ToolHandler for ActionWordTools {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::ActionWords
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                "list_action_words",
                "List all action words (reusable test steps) in a project",
                object_schema(
                    vec![
                        ("projectId", string_property("The ID of the project")),
                        ("pagination", pagination_schema()),
                        ("filter", filter_schema("action words", true)),
                    ],
                    &["projectId"],
                ),
            ),
            tool_def(
                "get_action_word",
                "Get detailed information about a specific action word",
                object_schema(
                    vec![
                        ("projectId", string_property("The ID of the project")),
                        (
                            "actionWordId",
                            string_property("The ID of the action word to retrieve"),
                        ),
                    ],
                    &["projectId", "actionWordId"],
                ),
            ),
            tool_def(
                "find_action_words_by_tags",
                "Find action words by tags in a project",
                object_schema(
                    vec![
                        ("projectId", string_property("The ID of the project")),
                        ("tags", string_property("Tags to search for (comma-separated)")),
                        ("pagination", pagination_schema()),
                    ],
                    &["projectId", "tags"],
                ),
            ),
        ]
    }

    async fn handle_tool_call(&self, name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult> {
        let op = name.strip_prefix(TOOL_PREFIX).unwrap_or(name);
        debug!(tool = name, "Handling action word tool");
        let payload = match op {
            "list_action_words" => {
                self.list_action_words(ToolArgs::parse(arguments, op)?)
                    .await?
            }
            "get_action_word" => self.get_action_word(ToolArgs::parse(arguments, op)?).await?,
            "find_action_words_by_tags" => {
                self.find_action_words_by_tags(ToolArgs::parse(arguments, op)?)
                    .await?
            }
            _ => return Err(Error::ToolNotFound(name.to_string())),
        };
        json_result(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{args, payload, CannedApi};

    #[tokio::test]
    async fn test_list_action_words() {
        let api = CannedApi::new(json!({
            "data": [
                {"id": "7", "type": "actionwords", "attributes": {"name": "I log in", "definition": "I log in"}}
            ]
        }));
        let tools = ActionWordTools::new(api.clone());

        let result = tools
            .handle_tool_call(
                "cucumberstudio_list_action_words",
                args(json!({"projectId": "1", "pagination": {"page": 2}})),
            )
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["action_words"][0]["id"], "7");
        assert_eq!(body["action_words"][0]["definition"], "I log in");
        assert_eq!(body["meta"], json!({}));

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls[0].0, "/projects/1/actionwords");
        assert_eq!(calls[0].1, vec![("page[number]".to_string(), "2".to_string())]);
    }

    #[tokio::test]
    async fn test_get_action_word() {
        let api = CannedApi::new(json!({
            "data": {"id": "7", "type": "actionwords", "attributes": {"name": "I log in"}}
        }));
        let tools = ActionWordTools::new(api.clone());

        let result = tools
            .handle_tool_call(
                "cucumberstudio_get_action_word",
                args(json!({"projectId": "1", "actionWordId": "7"})),
            )
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["action_word"]["name"], "I log in");
        assert_eq!(body["action_word"]["type"], "actionwords");
        assert_eq!(api.endpoints(), vec!["/projects/1/actionwords/7"]);
    }

    #[tokio::test]
    async fn test_find_action_words_by_tags() {
        let api = CannedApi::new(json!({"data": []}));
        let tools = ActionWordTools::new(api.clone());

        let result = tools
            .handle_tool_call(
                "cucumberstudio_find_action_words_by_tags",
                args(json!({"projectId": "1", "tags": "ui"})),
            )
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["action_words"], json!([]));
        assert_eq!(body["search_tags"], "ui");
        assert_eq!(body["total_count"], 0);
        assert_eq!(api.endpoints(), vec!["/projects/1/actionwords/find_by_tags"]);
    }

    #[tokio::test]
    async fn test_get_action_word_requires_id() {
        let api = CannedApi::new(json!({}));
        let tools = ActionWordTools::new(api.clone());

        let err = tools
            .handle_tool_call(
                "cucumberstudio_get_action_word",
                args(json!({"projectId": "1", "actionWordId": ""})),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Action Word ID is required"));
        assert!(api.endpoints().is_empty());
    }
}
