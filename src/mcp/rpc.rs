//! JSON-RPC envelopes and response formatting
//!
//! Parses inbound request envelopes and renders dispatcher outcomes into the
//! wire envelope plus the HTTP status that goes with it.

use axum::http::StatusCode;
use rust_mcp_sdk::schema::{ContentBlock, TextContent};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::DispatchError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const REQUEST_CANCELLED: i64 = -32800;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub id: Value,
    pub method: String,
    pub params: Value,
    notification: bool,
}

/// A request that failed before it could be routed, with whatever id was recoverable.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: Value,
    pub error: DispatchError,
}

impl RequestEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, Rejection> {
        let payload: Value = serde_json::from_slice(body).map_err(|_| Rejection {
            id: Value::Null,
            error: DispatchError::Parse,
        })?;

        Self::from_value(payload)
    }

    pub fn from_value(payload: Value) -> Result<Self, Rejection> {
        let Value::Object(mut object) = payload else {
            return Err(Rejection {
                id: Value::Null,
                error: DispatchError::InvalidRequest,
            });
        };

        let notification = !object.contains_key("id");
        let id = object.remove("id").unwrap_or(Value::Null);
        let version_ok = object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION);

        let method = match object.remove("method") {
            Some(Value::String(method)) if version_ok => method,
            _ => {
                return Err(Rejection {
                    id,
                    error: DispatchError::InvalidRequest,
                })
            }
        };

        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok(Self {
            id,
            method,
            params,
            notification,
        })
    }

    /// True when the request carried no `id` member at all.
    pub fn is_notification(&self) -> bool {
        self.notification
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success {
        jsonrpc: &'static str,
        id: Value,
        result: Value,
    },
    Failure {
        jsonrpc: &'static str,
        id: Value,
        error: RpcErrorBody,
    },
}

impl ResponseEnvelope {
    pub fn success(id: Value, result: Value) -> Self {
        Self::Success {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::Failure {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: RpcErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn from_error(id: Value, error: &DispatchError) -> Self {
        Self::failure(id, error.code(), error.to_string())
    }

    pub fn from_result(id: Value, outcome: Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::from_error(id, &error),
        }
    }

    /// Envelope plus the HTTP status the stateless surface answers with.
    pub fn from_outcome(id: Value, outcome: Result<Value, DispatchError>) -> (StatusCode, Self) {
        let status = match &outcome {
            Ok(_) => StatusCode::OK,
            Err(error) => error.status(),
        };
        (status, Self::from_result(id, outcome))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Single text block carrying a tool's return value.
pub fn text_content(text: String) -> Vec<ContentBlock> {
    vec![ContentBlock::from(TextContent::new(text, None, None))]
}

/// Display form of a tool return value: strings verbatim, everything else as JSON text.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
