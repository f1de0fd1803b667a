//! Scenario tools.

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

/// Tools over scenarios.
pub struct ScenarioTools {
    client: Arc<dyn CucumberStudioApi>,
}

impl ScenarioTools {
    pub fn new(client: Arc<dyn CucumberStudioApi>) -> Self {
        Self { client }
    }

    async fn list_scenarios(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "list_scenarios")?;
        let params = args.list_params("list_scenarios")?;
        let response = self.client.get_scenarios(&project_id, &params).await?;
        Ok(list_payload("scenarios", &response, scenario_summary, vec![]))
    }

    async fn get_scenario(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "get_scenario")?;
        let scenario_id = args.require_id(IdField::Scenario, "get_scenario")?;
        let response = self.client.get_scenario(&project_id, &scenario_id).await?;
        Ok(detail_payload("scenario", &response, scenario_summary))
    }

    async fn find_scenarios_by_tags(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "find_scenarios_by_tags")?;
        let tags = args.require_tags("find_scenarios_by_tags")?;
        let params = args.page_params("find_scenarios_by_tags")?;
        let response = self
            .client
            .find_scenarios_by_tags(&project_id, &tags, &params)
            .await?;
        Ok(list_payload(
            "scenarios",
            &response,
            scenario_summary,
            vec![("search_tags", json!(tags))],
        ))
    }
}

fn scenario_summary(scenario: &Resource) -> Value {
    let mut fields = base_summary(scenario, scenario.attr("name"));
    fields.insert(
        "description".to_string(),
        json!(scenario.attr_str_or("description", "")),
    );
    fields.insert(
        "definition".to_string(),
        json!(scenario.attr_str_or("definition", "")),
    );
    fields.insert("folder_id".to_string(), scenario.attr("folder_id"));
    Value::Object(fields)
}

#[async_trait]
impl ToolHandler for ScenarioTools {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Scenarios
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                "list_scenarios",
                "List all scenarios in a project",
                object_schema(
                    vec![
                        ("projectId", string_property("The ID of the project")),
                        ("pagination", pagination_schema()),
                        ("filter", filter_schema("scenarios", true)),
                    ],
                    &["projectId"],
                ),
            ),
            tool_def(
                "get_scenario",
                "Get detailed information about a specific scenario",
                object_schema(
                    vec![
                        ("projectId", string_property("The ID of the project")),
                        ("scenarioId", string_property("The ID of the scenario to retrieve")),
                    ],
                    &["projectId", "scenarioId"],
                ),
            ),
            tool_def(
                "find_scenarios_by_tags",
                "Find scenarios by tags in a project",
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
        debug!(tool = name, "Handling scenario tool");
        let payload = match op {
            "list_scenarios" => self.list_scenarios(ToolArgs::parse(arguments, op)?).await?,
            "get_scenario" => self.get_scenario(ToolArgs::parse(arguments, op)?).await?,
            "find_scenarios_by_tags" => {
                self.find_scenarios_by_tags(ToolArgs::parse(arguments, op)?)
                    .await?
            }
            _ => return Err(Error::ToolNotFound(name.to_string())),
        };
        json_result(&payload)
    }
}
