//! Cucumber Studio upstream API.

pub mod client;
pub mod types;

pub use client::{http_client_factory, ApiClient, ApiClientFactory, CucumberStudioApi};
pub use types::{ApiErrorBody, ApiResponse, ListParams, Resource};
