//! Tool argument parsing and validation.
//!
//! Validation runs before any upstream call; every failure is an
//! [`Error::InvalidToolArguments`].

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::api::types::ListParams;
use crate::error::{Error, Result};

/// Largest page size the upstream accepts.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Identifier arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdField {
    Project,
    Scenario,
    ActionWord,
    TestRun,
    Build,
}

impl IdField {
    /// Argument name.
    pub fn arg(&self) -> &'static str {
        match self {
            IdField::Project => "projectId",
            IdField::Scenario => "scenarioId",
            IdField::ActionWord => "actionWordId",
            IdField::TestRun => "testRunId",
            IdField::Build => "buildId",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            IdField::Project => "Project",
            IdField::Scenario => "Scenario",
            IdField::ActionWord => "Action Word",
            IdField::TestRun => "Test Run",
            IdField::Build => "Build",
        }
    }
}

/// `pagination` argument.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// `filter` argument.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filter {
    pub name: Option<String>,
    pub tags: Option<String>,
}

/// Union of every argument a tool accepts.
///
/// Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolArgs {
    project_id: Option<String>,
    scenario_id: Option<String>,
    action_word_id: Option<String>,
    test_run_id: Option<String>,
    build_id: Option<String>,
    tags: Option<String>,
    pagination: Option<Pagination>,
    filter: Option<Filter>,
}

impl ToolArgs {
    /// Decode raw call arguments. `context` names the operation in errors.
    pub fn parse(arguments: HashMap<String, Value>, context: &str) -> Result<Self> {
        let object: Map<String, Value> = arguments.into_iter().collect();
        serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::invalid_args(Some(context), e.to_string()))
    }

    /// A required, non-empty identifier.
    pub fn require_id(&self, field: IdField, context: &str) -> Result<String> {
        let value = match field {
            IdField::Project => &self.project_id,
            IdField::Scenario => &self.scenario_id,
            IdField::ActionWord => &self.action_word_id,
            IdField::TestRun => &self.test_run_id,
            IdField::Build => &self.build_id,
        };
        match value.as_deref() {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(Error::invalid_args(
                Some(context),
                format!("{}: {} ID is required", field.arg(), field.label()),
            )),
        }
    }

    /// The required, non-empty `tags` argument.
    pub fn require_tags(&self, context: &str) -> Result<String> {
        match self.tags.as_deref() {
            Some(tags) if !tags.is_empty() => Ok(tags.to_string()),
            _ => Err(Error::invalid_args(
                Some(context),
                "tags: Tags parameter is required",
            )),
        }
    }

    /// Pagination and filter converted to upstream list params.
    pub fn list_params(&self, context: &str) -> Result<ListParams> {
        let mut params = self.page_params(context)?;
        if let Some(filter) = &self.filter {
            params.filter_name = filter.name.clone();
            params.filter_tags = filter.tags.clone();
        }
        Ok(params)
    }

    /// Pagination only; any `filter` is ignored.
    pub fn page_params(&self, context: &str) -> Result<ListParams> {
        let mut params = ListParams::default();
        let Some(pagination) = &self.pagination else {
            return Ok(params);
        };

        if let Some(page) = pagination.page {
            if page < 1 {
                return Err(Error::invalid_args(
                    Some(context),
                    "pagination.page: Number must be greater than or equal to 1",
                ));
            }
            params.page_number = Some(page as u32);
        }
        if let Some(size) = pagination.page_size {
            if !(1..=MAX_PAGE_SIZE).contains(&size) {
                return Err(Error::invalid_args(
                    Some(context),
                    format!(
                        "pagination.pageSize: Number must be between 1 and {}",
                        MAX_PAGE_SIZE
                    ),
                ));
            }
            params.page_size = Some(size as u32);
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_require_id() {
        let parsed = ToolArgs::parse(args(json!({"projectId": "42"})), "get_project").unwrap();
        assert_eq!(parsed.require_id(IdField::Project, "get_project").unwrap(), "42");

        let err = parsed
            .require_id(IdField::ActionWord, "get_action_word")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parameters for get_action_word: actionWordId: Action Word ID is required"
        );

        let empty = ToolArgs::parse(args(json!({"projectId": ""})), "get_project").unwrap();
        assert!(matches!(
            empty.require_id(IdField::Project, "get_project"),
            Err(Error::InvalidToolArguments { .. })
        ));
    }

    #[test]
    fn test_wrong_type_is_invalid_args() {
        let err = ToolArgs::parse(args(json!({"projectId": 42})), "get_project").unwrap_err();
        assert!(matches!(err, Error::InvalidToolArguments { .. }));
        assert!(err.to_string().starts_with("Invalid parameters for get_project:"));

        let err = ToolArgs::parse(args(json!({"pagination": {"page": 1.5}})), "list_projects")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToolArguments { .. }));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let parsed = ToolArgs::parse(args(json!({"projectId": "1", "extra": true})), "x").unwrap();
        assert!(parsed.require_id(IdField::Project, "x").is_ok());
    }

    #[test]
    fn test_pagination_bounds() {
        for bad in [json!({"page": 0}), json!({"pageSize": 0}), json!({"pageSize": 101})] {
            let parsed = ToolArgs::parse(args(json!({"pagination": bad})), "list_projects").unwrap();
            assert!(parsed.list_params("list_projects").is_err());
        }

        let parsed = ToolArgs::parse(
            args(json!({"pagination": {"page": 2, "pageSize": 100}})),
            "list_projects",
        )
        .unwrap();
        let params = parsed.list_params("list_projects").unwrap();
        assert_eq!(params.page_number, Some(2));
        assert_eq!(params.page_size, Some(100));
    }

    #[test]
    fn test_list_params_with_filter() {
        let parsed = ToolArgs::parse(
            args(json!({"projectId": "1", "filter": {"name": "login", "tags": "smoke"}})),
            "list_scenarios",
        )
        .unwrap();
        let query = parsed.list_params("list_scenarios").unwrap().to_query();
        assert_eq!(
            query,
            vec![
                ("filter[name]".to_string(), "login".to_string()),
                ("filter[tags]".to_string(), "smoke".to_string()),
            ]
        );

        assert!(parsed.page_params("list_builds").unwrap().to_query().is_empty());
    }

    #[test]
    fn test_require_tags() {
        let parsed = ToolArgs::parse(args(json!({"tags": ""})), "find_scenarios_by_tags").unwrap();
        let err = parsed.require_tags("find_scenarios_by_tags").unwrap_err();
        assert!(err.to_string().contains("Tags parameter is required"));

        let parsed = ToolArgs::parse(args(json!({"tags": "smoke,ui"})), "x").unwrap();
        assert_eq!(parsed.require_tags("x").unwrap(), "smoke,ui");
    }
}
