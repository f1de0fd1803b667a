//! MCP tool implementations.
//!
//! Tools are grouped by upstream resource category:
//!
//! - `projects` - Projects (2 tools)
//! - `scenarios` - Scenarios (3 tools)
//! - `action_words` - Action words (3 tools)
//! - `test_runs` - Test runs, executions, builds and execution environments (6 tools)

pub mod action_words;
pub mod projects;
pub mod scenarios;
pub mod test_runs;
pub mod validation;

use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::api::client::CucumberStudioApi;
use crate::api::types::{ApiResponse, Resource};
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::Tool;

/// Prefix shared by every tool name.
pub const TOOL_PREFIX: &str = "cucumberstudio_";

/// Upstream resource category a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Projects,
    Scenarios,
    ActionWords,
    TestRuns,
}

impl ResourceCategory {
    /// All categories, in tool listing order.
    pub const ALL: [ResourceCategory; 4] = [
        ResourceCategory::Projects,
        ResourceCategory::Scenarios,
        ResourceCategory::ActionWords,
        ResourceCategory::TestRuns,
    ];

    /// Resolve a tool name to its category.
    ///
    /// Rules are checked in order and the first match wins.
    pub fn route(tool_name: &str) -> Option<Self> {
        if tool_name.contains("_project") {
            Some(Self::Projects)
        } else if tool_name.contains("_scenario") {
            Some(Self::Scenarios)
        } else if tool_name.contains("_action_word") {
            Some(Self::ActionWords)
        } else if ["_test_run", "_test_execution", "_build", "_execution_environment"]
            .iter()
            .any(|needle| tool_name.contains(needle))
        {
            Some(Self::TestRuns)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Scenarios => "scenarios",
            Self::ActionWords => "action_words",
            Self::TestRuns => "test_runs",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register every category handler, in listing order.
pub fn register_all_tools(handler: &mut McpHandler, client: Arc<dyn CucumberStudioApi>) {
    handler.register(projects::ProjectTools::new(client.clone()));
    handler.register(scenarios::ScenarioTools::new(client.clone()));
    handler.register(action_words::ActionWordTools::new(client.clone()));
    handler.register(test_runs::TestRunTools::new(client));
}

// ===== Schemas =====

/// Tool definition for operation `op` (the name without prefix).
fn tool_def(op: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: format!("{}{}", TOOL_PREFIX, op),
        description: description.to_string(),
        input_schema,
    }
}

fn pagination_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "page": { "type": "number", "minimum": 1, "description": "Page number" },
            "pageSize": {
                "type": "number",
                "minimum": 1,
                "maximum": validation::MAX_PAGE_SIZE,
                "description": "Number of items per page"
            }
        },
        "additionalProperties": false
    })
}

fn filter_schema(entity: &str, with_tags: bool) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "name".to_string(),
        json!({ "type": "string", "description": format!("Filter {} by name", entity) }),
    );
    if with_tags {
        properties.insert(
            "tags".to_string(),
            json!({ "type": "string", "description": format!("Filter {} by tags", entity) }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    })
}

fn string_property(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Object schema over `properties` with the given required keys.
fn object_schema(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let properties: Map<String, Value> = properties
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

// ===== Response shaping =====

/// `{ <key>: items, [extra...], meta, total_count }` for a list response.
fn list_payload(
    key: &str,
    response: &ApiResponse,
    summarize: impl Fn(&Resource) -> Value,
    extra: Vec<(&str, Value)>,
) -> Value {
    let items: Vec<Value> = response.resources().iter().map(summarize).collect();
    let total = items.len();

    let mut payload = Map::new();
    payload.insert(key.to_string(), Value::Array(items));
    for (k, v) in extra {
        payload.insert(k.to_string(), v);
    }
    payload.insert("meta".to_string(), response.meta_or_empty());
    payload.insert("total_count".to_string(), json!(total));
    Value::Object(payload)
}

/// `{ <key>: details, included }` for a single-resource response.
///
/// Details are the summary plus `type` and `relationships`.
fn detail_payload(key: &str, response: &ApiResponse, summarize: impl Fn(&Resource) -> Value) -> Value {
    let resource = response.resource();
    let mut details = summarize(&resource);
    if let Value::Object(fields) = &mut details {
        fields.insert("type".to_string(), json!(resource.kind));
        fields.insert("relationships".to_string(), resource.relationships_or_empty());
    }

    let mut payload = Map::new();
    payload.insert(key.to_string(), details);
    payload.insert("included".to_string(), response.included_or_empty());
    Value::Object(payload)
}

/// Fields every summary carries.
fn base_summary(resource: &Resource, name: Value) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("id".to_string(), json!(resource.id));
    fields.insert("name".to_string(), name);
    fields.insert("created_at".to_string(), resource.attr("created_at"));
    fields.insert("updated_at".to_string(), resource.attr("updated_at"));
    fields
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_by_category() {
        let cases = [
            ("cucumberstudio_list_projects", Some(ResourceCategory::Projects)),
            ("cucumberstudio_get_project", Some(ResourceCategory::Projects)),
            ("cucumberstudio_find_scenarios_by_tags", Some(ResourceCategory::Scenarios)),
            ("cucumberstudio_get_action_word", Some(ResourceCategory::ActionWords)),
            ("cucumberstudio_get_test_executions", Some(ResourceCategory::TestRuns)),
            ("cucumberstudio_list_builds", Some(ResourceCategory::TestRuns)),
            (
                "cucumberstudio_list_execution_environments",
                Some(ResourceCategory::TestRuns),
            ),
            ("cucumberstudio_list_folders", None),
            ("unknown", None),
        ];
        for (name, expected) in cases {
            assert_eq!(ResourceCategory::route(name), expected, "routing {}", name);
        }
    }

    #[test]
    fn test_route_is_order_sensitive() {
        // "_project" is checked before "_scenario".
        assert_eq!(
            ResourceCategory::route("x_project_scenario"),
            Some(ResourceCategory::Projects)
        );
        assert_eq!(
            ResourceCategory::route("x_scenario_build"),
            Some(ResourceCategory::Scenarios)
        );
    }

    #[test]
    fn test_every_tool_routes_to_its_handler() {
        let mut handler = McpHandler::new();
        register_all_tools(&mut handler, test_support::CannedApi::new(serde_json::json!({})));

        for category in ResourceCategory::ALL {
            let tools = handler.get_handler(category).unwrap().tools();
            assert!(!tools.is_empty(), "{} has no tools", category);
            for tool in tools {
                assert!(tool.name.starts_with(TOOL_PREFIX));
                assert_eq!(ResourceCategory::route(&tool.name), Some(category), "{}", tool.name);
            }
        }
    }

    #[test]
    fn test_object_schema_required() {
        let schema = object_schema(
            vec![("projectId", string_property("The ID of the project"))],
            &["projectId"],
        );
        assert_eq!(schema["required"], json!(["projectId"]));
        assert_eq!(schema["properties"]["projectId"]["type"], "string");

        let open = object_schema(vec![("pagination", pagination_schema())], &[]);
        assert!(open.get("required").is_none());
        assert_eq!(open["properties"]["pagination"]["properties"]["pageSize"]["maximum"], 100);
    }

    #[test]
    fn test_filter_schema_tags() {
        assert!(filter_schema("projects", false)["properties"].get("tags").is_none());
        assert_eq!(
            filter_schema("scenarios", true)["properties"]["tags"]["description"],
            "Filter scenarios by tags"
        );
    }

    #[test]
    fn test_list_payload_wraps_single_object() {
        let response: ApiResponse = serde_json::from_value(json!({
            "data": {"id": "1", "type": "projects", "attributes": {"name": "Alpha"}}
        }))
        .unwrap();
        let payload = list_payload(
            "projects",
            &response,
            |r| Value::Object(base_summary(r, json!(r.attr_str_or("name", "Unknown")))),
            vec![("search_tags", json!("smoke"))],
        );
        assert_eq!(payload["projects"][0]["name"], "Alpha");
        assert_eq!(payload["total_count"], 1);
        assert_eq!(payload["meta"], json!({}));
        assert_eq!(payload["search_tags"], "smoke");
    }

    #[test]
    fn test_detail_payload_adds_type_and_relationships() {
        let response: ApiResponse = serde_json::from_value(json!({
            "data": {"id": 5, "type": "builds", "attributes": {}},
            "included": [{"id": "9"}]
        }))
        .unwrap();
        let payload = detail_payload("build", &response, |r| {
            Value::Object(base_summary(r, json!(r.attr_str_or("name", "Unknown"))))
        });
        assert_eq!(payload["build"]["id"], "5");
        assert_eq!(payload["build"]["type"], "builds");
        assert_eq!(payload["build"]["name"], "Unknown");
        assert_eq!(payload["build"]["relationships"], json!({}));
        assert_eq!(payload["included"], json!([{"id": "9"}]));
    }
}
