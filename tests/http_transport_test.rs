//! Streamable HTTP transport tests against a stub Cucumber Studio API.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use cucumberstudio_mcp::api::{ApiClientFactory, ApiResponse, CucumberStudioApi};
use cucumberstudio_mcp::config::Config;
use cucumberstudio_mcp::error::{Error, Result};
use cucumberstudio_mcp::http::{StreamableHttpServer, SESSION_ID_HEADER};
use cucumberstudio_mcp::mcp::ServerFactory;
use cucumberstudio_mcp::metrics::Metrics;

/// Serves a fixed project list; every other endpoint is a 404.
struct StubApi;

#[async_trait]
impl CucumberStudioApi for StubApi {
    async fn get(&self, endpoint: &str, _query: &[(String, String)]) -> Result<ApiResponse> {
        if endpoint == "/projects" {
            let body = json!({
                "data": [
                    {"id": "1", "type": "projects", "attributes": {"name": "Checkout"}},
                    {"id": "2", "type": "projects", "attributes": {"name": "Search"}}
                ]
            });
            return Ok(serde_json::from_value(body)?);
        }
        Err(Error::api(Some(404), "Record not found", None))
    }
}

fn config() -> Config {
    Config {
        access_token: Some("token".to_string()),
        client_id: Some("client".to_string()),
        uid: Some("tester@example.com".to_string()),
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

async fn start() -> (StreamableHttpServer, SocketAddr, Arc<Metrics>) {
    let metrics = Metrics::new();
    let client_factory: ApiClientFactory =
        Arc::new(|| Ok(Arc::new(StubApi) as Arc<dyn CucumberStudioApi>));
    let factory = ServerFactory::with_client_factory(config(), client_factory, metrics.clone());
    let server = StreamableHttpServer::new(config(), factory, metrics.clone());
    let addr = server.start().await.unwrap();
    (server, addr, metrics)
}

fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {"protocolVersion": "2025-03-26", "capabilities": {}}
    })
}

async fn initialize(client: &reqwest::Client, addr: SocketAddr) -> String {
    let resp = client
        .post(format!("http://{}/mcp", addr))
        .header("Accept", "application/json")
        .json(&initialize_request())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    resp.headers()[SESSION_ID_HEADER].to_str().unwrap().to_string()
}

async fn call_tool(
    client: &reqwest::Client,
    addr: SocketAddr,
    session_id: &str,
    name: &str,
    arguments: Value,
) -> Value {
    client
        .post(format!("http://{}/mcp", addr))
        .header("Accept", "application/json")
        .header(SESSION_ID_HEADER, session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_tool_call_through_session() {
    let (server, addr, metrics) = start().await;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, addr).await;

    let body = call_tool(&client, addr, &session_id, "cucumberstudio_list_projects", json!({})).await;
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["projects"].as_array().unwrap().len(), 2);
    assert_eq!(payload["projects"][0]["name"], "Checkout");

    let body = call_tool(
        &client,
        addr,
        &session_id,
        "cucumberstudio_get_project",
        json!({"projectId": "99"}),
    )
    .await;
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(
        body["error"]["message"],
        "Cucumber Studio API error (tool call: cucumberstudio_get_project): Record not found"
    );

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.tool_calls, 2);
    assert_eq!(snapshot.upstream_errors, 1);

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_initializes_mint_distinct_sessions() {
    let (server, addr, _) = start().await;
    let client = reqwest::Client::new();

    let (a, b) = tokio::join!(initialize(&client, addr), initialize(&client, addr));
    assert_ne!(a, b);
    assert_eq!(server.sessions().len().await, 2);

    server.close().await.unwrap();
    assert!(server.sessions().is_empty().await);
}

#[tokio::test]
async fn test_post_answered_as_event_stream() {
    let (server, addr, _) = start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/mcp", addr))
        .header("Accept", "application/json, text/event-stream")
        .json(&initialize_request())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(resp.headers().contains_key(SESSION_ID_HEADER));
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let text = resp.text().await.unwrap();
    assert!(text.contains("event: message"));
    assert!(text.contains("\"protocolVersion\":\"2025-03-26\""));

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_server_refuses_connections() {
    let (server, addr, _) = start().await;
    let client = reqwest::Client::new();
    initialize(&client, addr).await;

    server.close().await.unwrap();
    assert!(client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .is_err());
}
