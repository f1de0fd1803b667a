//! Test run tools.
//!
//! Covers test runs and their executions, builds and execution environments.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
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

pub struct TestRunTools {
    client: Arc<dyn CucumberStudioApi>,
}

impl TestRunTools {
    pub fn new(client: Arc<dyn CucumberStudioApi>) -> Self {
        Self { client }
    }

    async fn list_test_runs(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "list_test_runs")?;
        let params = args.list_params("list_test_runs")?;
        let response = self.client.get_test_runs(&project_id, &params).await?;
        Ok(list_payload("test_runs", &response, test_run_summary, vec![]))
    }

    async fn get_test_run(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "get_test_run")?;
        let test_run_id = args.require_id(IdField::TestRun, "get_test_run")?;
        let response = self.client.get_test_run(&project_id, &test_run_id).await?;
        Ok(detail_payload("test_run", &response, test_run_summary))
    }

    async fn get_test_executions(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "get_test_executions")?;
        let test_run_id = args.require_id(IdField::TestRun, "get_test_executions")?;
        let params = args.list_params("get_test_executions")?;
        let response = self
            .client
            .get_test_executions(&project_id, &test_run_id, &params)
            .await?;
        Ok(list_payload(
            "test_executions",
            &response,
            execution_summary,
            vec![("test_run_id", json!(test_run_id))],
        ))
    }

    async fn list_builds(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "list_builds")?;
        let params = args.list_params("list_builds")?;
        let response = self.client.get_builds(&project_id, &params).await?;
        Ok(list_payload("builds", &response, named_summary, vec![]))
    }

    async fn get_build(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "get_build")?;
        let build_id = args.require_id(IdField::Build, "get_build")?;
        let response = self.client.get_build(&project_id, &build_id).await?;
        Ok(detail_payload("build", &response, named_summary))
    }

    async fn list_execution_environments(&self, args: ToolArgs) -> Result<Value> {
        let project_id = args.require_id(IdField::Project, "list_execution_environments")?;
        let params = args.list_params("list_execution_environments")?;
        let response = self
            .client
            .get_execution_environments(&project_id, &params)
            .await?;
        Ok(list_payload(
            "execution_environments",
            &response,
            named_summary,
            vec![],
        ))
    }
}

fn named_summary(resource: &Resource) -> Value {
    Value::Object(base_summary(
        resource,
        json!(resource.attr_str_or("name", "Unknown")),
    ))
}

fn test_run_summary(test_run: &Resource) -> Value {
    let mut fields = base_summary(test_run, json!(test_run.attr_str_or("name", "Unknown")));
    fields.insert(
        "description".to_string(),
        json!(test_run.attr_str_or("description", "")),
    );
    fields.insert(
        "execution_environment".to_string(),
        json!(test_run.attr_str_or("execution_environment", "")),
    );
    Value::Object(fields)
}

fn execution_summary(execution: &Resource) -> Value {
    let mut fields = Map::new();
    fields.insert("id".to_string(), json!(execution.id));
    fields.insert(
        "status".to_string(),
        json!(execution.attr_str_or("status", "unknown")),
    );
    fields.insert("scenario_id".to_string(), execution.attr("scenario_id"));
    fields.insert("test_run_id".to_string(), execution.attr("test_run_id"));
    fields.insert("created_at".to_string(), execution.attr("created_at"));
    fields.insert("updated_at".to_string(), execution.attr("updated_at"));
    Value::Object(fields)
}

#[async_trait]
impl ToolHandler for TestRunTools {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::TestRuns
    }

    fn tools(&self) -> Vec<Tool> {
        let project = || ("projectId", string_property("The ID of the project"));
        vec![
            tool_def(
                "list_test_runs",
                "List all test runs in a project",
                object_schema(
                    vec![
                        project(),
                        ("pagination", pagination_schema()),
                        ("filter", filter_schema("test runs", false)),
                    ],
                    &["projectId"],
                ),
            ),
            tool_def(
                "get_test_run",
                "Get detailed information about a specific test run",
                object_schema(
                    vec![
                        project(),
                        ("testRunId", string_property("The ID of the test run to retrieve")),
                    ],
                    &["projectId", "testRunId"],
                ),
            ),
            tool_def(
                "get_test_executions",
                "Get test executions (individual test results) for a test run",
                object_schema(
                    vec![
                        project(),
                        ("testRunId", string_property("The ID of the test run")),
                        ("pagination", pagination_schema()),
                    ],
                    &["projectId", "testRunId"],
                ),
            ),
            tool_def(
                "list_builds",
                "List all builds in a project",
                object_schema(
                    vec![project(), ("pagination", pagination_schema())],
                    &["projectId"],
                ),
            ),
            tool_def(
                "get_build",
                "Get detailed information about a specific build",
                object_schema(
                    vec![
                        project(),
                        ("buildId", string_property("The ID of the build to retrieve")),
                    ],
                    &["projectId", "buildId"],
                ),
            ),
            tool_def(
                "list_execution_environments",
                "List all execution environments in a project",
                object_schema(
                    vec![project(), ("pagination", pagination_schema())],
                    &["projectId"],
                ),
            ),
        ]
    }

    async fn handle_tool_call(&self, name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult> {
        let op = name.strip_prefix(TOOL_PREFIX).unwrap_or(name);
        debug!(tool = name, "Handling test run tool");
        let args = match op {
            "list_test_runs" | "get_test_run" | "get_test_executions" | "list_builds"
            | "get_build" | "list_execution_environments" => ToolArgs::parse(arguments, op)?,
            _ => return Err(Error::ToolNotFound(name.to_string())),
        };
        let payload = match op {
            "list_test_runs" => self.list_test_runs(args).await?,
            "get_test_run" => self.get_test_run(args).await?,
            "get_test_executions" => self.get_test_executions(args).await?,
            "list_builds" => self.list_builds(args).await?,
            "get_build" => self.get_build(args).await?,
            _ => self.list_execution_environments(args).await?,
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
        let tools = TestRunTools::new(CannedApi::new(json!({}))).tools();
        assert_eq!(tools.len(), 6);
        for tool in &tools {
            assert_eq!(
                ResourceCategory::route(&tool.name),
                Some(ResourceCategory::TestRuns),
                "{} must route to test runs",
                tool.name
            );
            assert_eq!(tool.input_schema["required"][0], "projectId");
        }
    }

    #[tokio::test]
    async fn test_list_test_runs() {
        let api = CannedApi::new(json!({
            "data": [{"id": "5", "type": "test_runs", "attributes": {"name": "Nightly", "execution_environment": "CI"}}]
        }));
        let tools = TestRunTools::new(api.clone());

        let result = tools
            .handle_tool_call("cucumberstudio_list_test_runs", args(json!({"projectId": "1"})))
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["test_runs"][0]["name"], "Nightly");
        assert_eq!(body["test_runs"][0]["execution_environment"], "CI");
        assert_eq!(api.endpoints(), vec!["/projects/1/test_runs"]);
    }

    #[tokio::test]
    async fn test_get_test_executions() {
        let api = CannedApi::new(json!({
            "data": [
                {"id": "100", "type": "test_executions", "attributes": {"status": "passed", "scenario_id": 10}},
                {"id": "101", "type": "test_executions", "attributes": {}}
            ],
            "meta": {"total_count": 2}
        }));
        let tools = TestRunTools::new(api.clone());

        let result = tools
            .handle_tool_call(
                "cucumberstudio_get_test_executions",
                args(json!({"projectId": "1", "testRunId": "5"})),
            )
            .await
            .unwrap();

        let body = payload(&result);
        assert_eq!(body["test_run_id"], "5");
        assert_eq!(body["test_executions"][0]["status"], "passed");
        assert_eq!(body["test_executions"][0]["scenario_id"], 10);
        assert_eq!(body["test_executions"][1]["status"], "unknown");
        assert!(body["test_executions"][1].get("name").is_none());
        assert_eq!(body["total_count"], 2);
        assert_eq!(api.endpoints(), vec!["/projects/1/test_runs/5/test_executions"]);
    }

    #[tokio::test]
    async fn test_get_build_and_environments() {
        let api = CannedApi::new(json!({
            "data": {"id": "8", "type": "builds", "attributes": {"name": "v1.2"}}
        }));
        let tools = TestRunTools::new(api.clone());

        let result = tools
            .handle_tool_call(
                "cucumberstudio_get_build",
                args(json!({"projectId": "1", "buildId": "8"})),
            )
            .await
            .unwrap();
        let body = payload(&result);
        assert_eq!(body["build"]["name"], "v1.2");
        assert_eq!(body["build"]["type"], "builds");

        let result = tools
            .handle_tool_call(
                "cucumberstudio_list_execution_environments",
                args(json!({"projectId": "1"})),
            )
            .await
            .unwrap();
        let body = payload(&result);
        assert_eq!(body["execution_environments"][0]["id"], "8");

        assert_eq!(
            api.endpoints(),
            vec!["/projects/1/builds/8", "/projects/1/execution_environments"]
        );
    }

    #[tokio::test]
    async fn test_list_builds_rejects_bad_page_size() {
        let api = CannedApi::new(json!({}));
        let tools = TestRunTools::new(api.clone());

        let err = tools
            .handle_tool_call(
                "cucumberstudio_list_builds",
                args(json!({"projectId": "1", "pagination": {"pageSize": 500}})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToolArguments { .. }));
        assert!(api.endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_get_test_run_requires_id() {
        let tools = TestRunTools::new(CannedApi::new(json!({})));
        let err = tools
            .handle_tool_call("cucumberstudio_get_test_run", args(json!({"projectId": "1"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("testRunId: Test Run ID is required"));
    }
}
