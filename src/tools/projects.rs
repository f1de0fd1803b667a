//! Project tools.

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

/// Tools over projects.
pub struct ProjectTools {
    client: Arc<dyn CucumberStudioApi>,
}

impl ProjectTools {
    pub fn new(client: Arc<dyn CucumberStudioApi>) -> Self {
        Self { client }
    }

    async fn list_projects(&self, args: ToolArgs) -> Result<Value> {
        let params = args.list_params("list_projects")?;
        let response = self.client.get_projects(&params).await?;
        Ok(list_payload("projects", &response, project_summary, vec![]))
    }

    async fn get_project(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "get_project")?;
        let response = self.client.get_project(&project_id).await?;
        Ok(detail_payload("project", &response, project_summary))
    }
}

fn project_summary(project: &Resource) -> Value {
    let mut fields = base_summary(project, json!(project.attr_str_or("name", "Unknown")));
    fields.insert(
        "description".to_string(),
        json!(project.attr_str_or("description", "")),
    );
    Value::Object(fields)
}

#[async_trait]
impl ToolHandler for ProjectTools {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Projects
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                "list_projects",
                "List all projects accessible to the authenticated user",
                object_schema(
                    vec![
                        ("pagination", pagination_schema()),
                        ("filter", filter_schema("projects", false)),
                    ],
                    &[],
                ),
            ),
            tool_def(
                "get_project",
                "Get detailed information about a specific project",
                object_schema(
                    vec![("projectId", string_property("The ID of the project to retrieve"))],
                    &["projectId"],
                ),
            ),
        ]
    }

    async fn handle_tool_call(&self, name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult> {
        let op = name.strip_prefix(TOOL_PREFIX).unwrap_or(name);
        debug!(tool = name, "Handling project tool");
        let payload = match op {
            "list_projects" => self.list_projects(ToolArgs::parse(arguments, op)?).await?,
            "get_project" => self.get_project(ToolArgs::parse(arguments, op)?).await?,
            _ => return Err(Error::ToolNotFound(name.to_string())),
        };
        json_result(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{args, payload, CannedApi};

    #[test]
    fn test_tool_definitions() {
        let tools = ProjectTools::new(CannedApi::new(json!({}))).tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cucumberstudio_list_projects", "cucumberstudio_get_project"]);
        assert_eq!(tools[1].input_schema["required"], json!(["projectId"]));
    }

    #[tokio::test]
    async fn test_list_projects() {
        let api = CannedApi::new(json!({
            "data": [
                {"id": "1", "type": "projects", "attributes": {"name": "Alpha", "created_at": "2024-01-01"}},
                {"id": "2", "type": "projects", "attributes": {}}
            ],
            "meta": {"total_count": 2}
        }));
        let tools = ProjectTools::new(api.clone());

        let result = tools
            .handle_tool_call(
                "cucumberstudio_list_projects",
                args(json!({"pagination": {"page": 1, "pageSize": 10}, "filter": {"name": "Al"}})),
            )
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["total_count"], 2);
        assert_eq!(body["projects"][0]["name"], "Alpha");
        assert_eq!(body["projects"][0]["created_at"], "2024-01-01");
        assert_eq!(body["projects"][1]["name"], "Unknown");
        assert_eq!(body["projects"][1]["description"], "");
        assert_eq!(body["meta"]["total_count"], 2);

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls[0].0, "/projects");
        assert!(calls[0].1.contains(&("page[size]".to_string(), "10".to_string())));
        assert!(calls[0].1.contains(&("filter[name]".to_string(), "Al".to_string())));
    }

    #[tokio::test]
    async fn test_get_project() {
        let api = CannedApi::new(json!({
            "data": {
                "id": "42",
                "type": "projects",
                "attributes": {"name": "Alpha", "description": "Main"},
                "relationships": {"scenarios": {}}
            }
        }));
        let tools = ProjectTools::new(api.clone());

        let result = tools
            .handle_tool_call("cucumberstudio_get_project", args(json!({"projectId": "42"})))
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["project"]["id"], "42");
        assert_eq!(body["project"]["type"], "projects");
        assert_eq!(body["project"]["description"], "Main");
        assert_eq!(body["project"]["relationships"], json!({"scenarios": {}}));
        assert_eq!(body["included"], json!([]));
        assert_eq!(api.calls.lock().unwrap()[0].0, "/projects/42");
    }

    #[tokio::test]
    async fn test_get_project_requires_id_before_upstream() {
        let api = CannedApi::new(json!({}));
        let tools = ProjectTools::new(api.clone());

        let err = tools
            .handle_tool_call("cucumberstudio_get_project", args(json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parameters for get_project: projectId: Project ID is required"
        );
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project_tool() {
        let tools = ProjectTools::new(CannedApi::new(json!({})));
        let err = tools
            .handle_tool_call("cucumberstudio_delete_project", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }
}
