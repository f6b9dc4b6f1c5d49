//! API Server Module
//!
//! This module implements a small HTTP server exposing watchdog health.
//! Operators can either `GET /health` or send a JSON-RPC request for the
//! `watchdog_health` method to `POST /`.

use crate::{
    config::ApiConfig,
    watchdog::{HealthHandle, HealthSnapshot},
};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// The health API server
pub struct Server {
    config: ApiConfig,
    health: HealthHandle,
}

impl Server {
    /// Creates a new API server instance
    ///
    /// # Arguments
    /// * `config` - Bind address
    /// * `health` - Health handle the watchdog publishes to
    pub fn new(config: ApiConfig, health: HealthHandle) -> Self {
        Self { config, health }
    }

    /// Starts the API server and begins listening for incoming requests
    ///
    /// # Returns
    /// `Ok(())` when the server shuts down, or an error if binding fails
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.health);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Health API listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Build the router serving the health endpoints
pub fn router(health: HealthHandle) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/", post(handle_rpc))
        .with_state(health)
}

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    #[allow(dead_code)]
    params: Value,
    id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` is populated, never both.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

async fn handle_health(State(health): State<HealthHandle>) -> Json<HealthSnapshot> {
    Json(health.snapshot().await)
}

async fn handle_rpc(
    State(health): State<HealthHandle>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    debug!("Received RPC request: {}", request.method);

    match request.method.as_str() {
        "watchdog_health" => {
            let snapshot = health.snapshot().await;
            let response = match serde_json::to_value(snapshot) {
                Ok(result) => JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    result: Some(result),
                    error: None,
                    id: request.id,
                },
                Err(e) => JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32603, // Internal error
                        message: format!("Failed to encode health: {}", e),
                    }),
                    id: request.id,
                },
            };
            Json(response)
        }
        _ => Json(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code: -32601, // Method not found
                message: "Method not found".to_string(),
            }),
            id: request.id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::HealthStatus;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_health_returns_snapshot() {
        let health = HealthHandle::new();
        health
            .update(|h| {
                h.status = HealthStatus::Degraded;
                h.consecutive_failures = 3;
                h.last_error = Some("transport error: 503".into());
            })
            .await;

        let response = router(health)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["phase"], "polling");
        assert_eq!(json["consecutive_failures"], 3);
        assert_eq!(json["triggered"], false);
    }

    #[tokio::test]
    async fn test_rpc_health_method() {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","method":"watchdog_health","params":[],"id":7}"#,
            ))
            .unwrap();

        let response = router(HealthHandle::new()).oneshot(request).await.unwrap();
        let json = body_json(response).await;

        assert_eq!(json["id"], 7);
        assert_eq!(json["result"]["status"], "starting");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_rpc_unknown_method() {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","method":"sendTransaction","params":{},"id":1}"#,
            ))
            .unwrap();

        let response = router(HealthHandle::new()).oneshot(request).await.unwrap();
        let json = body_json(response).await;

        assert_eq!(json["error"]["code"], -32601);
        assert!(json.get("result").is_none());
    }
}
