//! Cucumber Studio API types.
//!
//! The upstream speaks JSON:API: every response is an envelope around one
//! resource or a list of resources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response envelope returned by every upstream endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ApiResponse {
    /// Decode `data` as a list, wrapping a single object.
    pub fn resources(&self) -> Vec<Resource> {
        match &self.data {
            Value::Array(items) => items.iter().map(Resource::from_value).collect(),
            Value::Null => Vec::new(),
            single => vec![Resource::from_value(single)],
        }
    }

    /// Decode `data` as a single resource.
    pub fn resource(&self) -> Resource {
        match &self.data {
            Value::Array(items) => items.first().map(Resource::from_value).unwrap_or_default(),
            single => Resource::from_value(single),
        }
    }

    /// `meta`, or an empty object.
    pub fn meta_or_empty(&self) -> Value {
        self.meta.clone().unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// `included`, or an empty list.
    pub fn included_or_empty(&self) -> Value {
        Value::Array(self.included.clone().unwrap_or_default())
    }
}

/// A JSON:API resource object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Value>,
}

impl Resource {
    /// Lenient decode: anything unparseable becomes an empty resource.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Raw attribute value, `null` when absent.
    pub fn attr(&self, key: &str) -> Value {
        self.attributes.get(key).cloned().unwrap_or(Value::Null)
    }

    /// String attribute, falling back to `default` when absent or empty.
    pub fn attr_str_or(&self, key: &str, default: &str) -> String {
        self.attributes
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    /// `relationships`, or an empty object.
    pub fn relationships_or_empty(&self) -> Value {
        self.relationships
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Upstream error body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

impl ApiErrorBody {
    /// Joined `detail` strings, if there are any.
    pub fn summary(&self) -> Option<String> {
        let details: Vec<&str> = self
            .errors
            .iter()
            .map(|e| e.detail.as_str())
            .filter(|d| !d.is_empty())
            .collect();
        if details.is_empty() {
            None
        } else {
            Some(details.join("; "))
        }
    }
}

/// One upstream error entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub detail: String,
    #[serde(default, deserialize_with = "id_as_string")]
    pub status: String,
    #[serde(default)]
    pub title: String,
}

/// Query parameters for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    pub filter_name: Option<String>,
    pub filter_tags: Option<String>,
}

impl ListParams {
    /// Params that only set a page size.
    pub fn page_size(size: u32) -> Self {
        Self {
            page_size: Some(size),
            ..Self::default()
        }
    }

    /// Encode as upstream query pairs, skipping unset values.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(page) = self.page_number {
            query.push(("page[number]".to_string(), page.to_string()));
        }
        if let Some(size) = self.page_size {
            query.push(("page[size]".to_string(), size.to_string()));
        }
        if let Some(name) = self.filter_name.as_deref().filter(|s| !s.is_empty()) {
            query.push(("filter[name]".to_string(), name.to_string()));
        }
        if let Some(tags) = self.filter_tags.as_deref().filter(|s| !s.is_empty()) {
            query.push(("filter[tags]".to_string(), tags.to_string()));
        }
        query
    }
}
