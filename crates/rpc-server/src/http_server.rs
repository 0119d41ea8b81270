//! HTTP JSON-RPC Server
//!
//! Provides the HTTP endpoint for JSON-RPC methods.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::methods::{
    handle_get_fault_evidence, handle_get_head, handle_get_head_status, handle_get_health,
    handle_get_lookahead, handle_submit_commitment, RpcContext, RpcError,
    SubmitCommitmentRequest,
};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    /// Create a new HTTP RPC server
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP RPC server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = dispatch_method(&context, &request.method, request.params);

    let response = match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Dispatch to the appropriate method handler
fn dispatch_method(ctx: &RpcContext, method: &str, params: Value) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    match method {
        "getHealth" => {
            let health = handle_get_health(ctx)?;
            Ok(json!(health))
        }

        "getHead" => {
            let head = handle_get_head(ctx)?;
            serde_json::to_value(head).map_err(|e| RpcError::Internal(e.to_string()))
        }

        "getHeadStatus" => {
            let status = handle_get_head_status(ctx)?;
            serde_json::to_value(status).map_err(|e| RpcError::Internal(e.to_string()))
        }

        "getLookahead" => {
            let now = preconf_consensus::unix_now();
            let lookahead = handle_get_lookahead(ctx, now)?;
            serde_json::to_value(lookahead).map_err(|e| RpcError::Internal(e.to_string()))
        }

        "getFaultEvidence" => {
            let evidence = handle_get_fault_evidence(ctx)?;
            serde_json::to_value(evidence).map_err(|e| RpcError::Internal(e.to_string()))
        }

        "submitCommitment" => {
            let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();
            let commitment = params
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| RpcError::InvalidParams("Missing commitment".to_string()))?;
            let tx_list = params
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            let request = SubmitCommitmentRequest {
                commitment: commitment.to_string(),
                tx_list: tx_list.to_string(),
            };

            let hash = handle_submit_commitment(ctx, request)?;
            Ok(json!(hash))
        }

        _ => Err(RpcError::MethodNotFound),
    }
}

fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound => -32601,
        RpcError::Internal(_) => -32603,
    }
}
