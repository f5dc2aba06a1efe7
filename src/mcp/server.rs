//! The request dispatcher
//!
//! Decodes a JSON-RPC body, routes `tools/list` and `tools/call` against the
//! registry, validates tool arguments and runs the handler off the async
//! executor. Every failure becomes a [`DispatchError`] before it leaves here.

use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::domain::{
    registry::{ToolHandler, ToolRegistry},
    schema::Arguments,
};
use crate::errors::DispatchError;
use crate::mcp::rpc::{display_text, text_content, RequestEnvelope, ResponseEnvelope};

pub async fn dispatch(registry: &ToolRegistry, body: &[u8]) -> (StatusCode, ResponseEnvelope) {
    match RequestEnvelope::from_slice(body) {
        Ok(request) => handle_request(registry, request).await,
        Err(rejection) => {
            warn!(error = %rejection.error, "rejected json-rpc envelope");
            ResponseEnvelope::from_outcome(rejection.id, Err(rejection.error))
        }
    }
}

pub async fn handle_request(
    registry: &ToolRegistry,
    request: RequestEnvelope,
) -> (StatusCode, ResponseEnvelope) {
    let audit_params = redact_audit_value(&request.params);
    let outcome = route(registry, &request.method, request.params).await;

    info!(
        method = %request.method,
        params = %audit_params,
        outcome = if outcome.is_ok() { "success" } else { "failure" },
        "mcp action audited"
    );

    ResponseEnvelope::from_outcome(request.id, outcome)
}

pub async fn route(
    registry: &ToolRegistry,
    method: &str,
    params: Value,
) -> Result<Value, DispatchError> {
    match method {
        "tools/list" => Ok(tools_list_result(registry)),
        "tools/call" => {
            let text = call_tool(registry, params).await?;
            serde_json::to_value(text_content(text))
                .map_err(|err| DispatchError::Internal(err.to_string()))
        }
        other => Err(DispatchError::MethodNotFound(other.to_string())),
    }
}

pub fn tools_list_result(registry: &ToolRegistry) -> Value {
    let tools = registry
        .list()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "inputSchema": tool.schema().raw(),
            })
        })
        .collect::<Vec<_>>();

    json!({ "tools": tools })
}

/// A validated invocation, ready to run.
pub struct ToolCall {
    name: String,
    handler: ToolHandler,
    arguments: Arguments,
}

impl ToolCall {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub fn resolve_call(registry: &ToolRegistry, params: Value) -> Result<ToolCall, DispatchError> {
    let Value::Object(mut params) = params else {
        return Err(DispatchError::invalid_params("params must be an object"));
    };

    let name = match params.remove("name") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(name)) => name.trim().to_string(),
        Some(_) => return Err(DispatchError::invalid_params("name must be a string")),
    };

    let tool = registry
        .lookup(&name)
        .ok_or_else(|| DispatchError::MethodNotFound(name.clone()))?;

    let arguments = match params.remove("arguments") {
        None => Map::new(),
        Some(Value::Object(arguments)) => arguments,
        Some(_) => return Err(DispatchError::invalid_params("arguments must be an object")),
    };

    let arguments = tool
        .schema()
        .validate(arguments)
        .map_err(|violation| DispatchError::invalid_params(violation.to_string()))?;

    Ok(ToolCall {
        name,
        handler: tool.handler(),
        arguments,
    })
}

/// Runs the handler on the blocking pool and returns its display text.
pub async fn invoke(call: ToolCall) -> Result<String, DispatchError> {
    let ToolCall {
        name,
        handler,
        arguments,
    } = call;

    match tokio::task::spawn_blocking(move || handler(&arguments)).await {
        Ok(Ok(value)) => Ok(display_text(&value)),
        Ok(Err(err)) => {
            warn!(tool = %name, error = %err, "tool handler failed");
            Err(DispatchError::Internal(err.to_string()))
        }
        Err(join_error) => {
            error!(tool = %name, error = %join_error, "tool handler aborted");
            Err(DispatchError::Internal(format!(
                "tool `{name}` did not complete"
            )))
        }
    }
}

pub async fn call_tool(registry: &ToolRegistry, params: Value) -> Result<String, DispatchError> {
    let call = resolve_call(registry, params)?;
    invoke(call).await
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::domain::{
        registry::{ToolDefinition, ToolError},
        tools::default_registry,
    };

    fn registry() -> ToolRegistry {
        default_registry().expect("default registry")
    }

    fn call_params(name: &str, arguments: Value) -> Value {
        json!({"name": name, "arguments": arguments})
    }

    #[tokio::test]
    async fn call_tool_renders_display_text() {
        let registry = registry();

        let text = call_tool(&registry, call_params("add", json!({"a": 2, "b": 3})))
            .await
            .expect("add succeeds");
        assert_eq!(text, "5");

        let text = call_tool(
            &registry,
            call_params("zodiac_sign", json!({"birthdate": "2024-01-01"})),
        )
        .await
        .expect("zodiac succeeds");
        assert_eq!(text, "Capricornio");
    }

    #[tokio::test]
    async fn tool_name_is_trimmed() {
        let text = call_tool(&registry(), call_params("  subtract ", json!({"a": 2, "b": 3})))
            .await
            .expect("subtract succeeds");
        assert_eq!(text, "-1");
    }

    #[test]
    fn unknown_tool_is_method_not_found() {
        let error = resolve_call(&registry(), call_params("nonexistent", json!({})))
            .err()
            .expect("unknown tool");
        assert_eq!(error, DispatchError::MethodNotFound("nonexistent".to_string()));
    }

    #[test]
    fn missing_name_is_method_not_found_for_empty_name() {
        let error = resolve_call(&registry(), json!({}))
            .err()
            .expect("no name");
        assert_eq!(error, DispatchError::MethodNotFound(String::new()));
    }

    #[test]
    fn lookup_happens_before_argument_shape_check() {
        let error = resolve_call(&registry(), call_params("nonexistent", json!([1, 2])))
            .err()
            .expect("unknown tool wins");
        assert!(matches!(error, DispatchError::MethodNotFound(_)));

        let error = resolve_call(&registry(), call_params("add", json!([1, 2])))
            .err()
            .expect("array arguments");
        assert_eq!(
            error,
            DispatchError::invalid_params("arguments must be an object")
        );
    }

    #[test]
    fn non_object_params_are_invalid() {
        let error = resolve_call(&registry(), json!("add")).err().expect("string");
        assert!(matches!(error, DispatchError::InvalidParams(_)));

        let error = resolve_call(&registry(), json!({"name": 3}))
            .err()
            .expect("numeric name");
        assert!(matches!(error, DispatchError::InvalidParams(_)));
    }

    #[test]
    fn schema_violation_names_the_field() {
        let error = resolve_call(&registry(), call_params("subtract", json!({"a": 2, "b": "x"})))
            .err()
            .expect("type mismatch");
        assert_eq!(
            error.to_string(),
            "Invalid params: field `b` must be of type integer"
        );
    }

    #[tokio::test]
    async fn handler_failure_is_internal_error() {
        let error = call_tool(
            &registry(),
            call_params("zodiac_sign", json!({"birthdate": "2023-02-30"})),
        )
        .await
        .expect_err("impossible date");
        assert!(matches!(error, DispatchError::Internal(_)));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn handler_panic_is_internal_error() {
        let registry = ToolRegistry::builder()
            .register(
                ToolDefinition::new(
                    "explode",
                    "always panics",
                    json!({"type": "object"}),
                    |_arguments: &Arguments| -> Result<Value, ToolError> { panic!("boom") },
                )
                .expect("definition"),
            )
            .expect("unique")
            .build();

        let error = call_tool(&registry, call_params("explode", json!({})))
            .await
            .expect_err("panic is contained");
        assert_eq!(
            error,
            DispatchError::Internal("tool `explode` did not complete".to_string())
        );
    }

    #[tokio::test]
    async fn tools_list_is_stable_across_calls() {
        let registry = Arc::new(registry());
        let first = route(&registry, "tools/list", json!({})).await.expect("list");
        let _ = route(&registry, "tools/call", call_params("add", json!({"a": 1, "b": 1}))).await;
        let second = route(&registry, "tools/list", json!("ignored"))
            .await
            .expect("list ignores params");

        assert_eq!(first, second);
        assert_eq!(first["tools"][0]["name"], "zodiac_sign");
        assert_eq!(first["tools"][1]["inputSchema"]["additionalProperties"], false);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let error = route(&registry(), "resources/list", json!({}))
            .await
            .expect_err("unsupported method");
        assert_eq!(error.to_string(), "Method not found: resources/list");
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "add",
            "arguments": {
                "a": 1,
                "api_key": "should-not-appear",
                "nested": {"client_secret": "should-not-appear"}
            }
        });

        let redacted = redact_audit_value(&params);

        assert_eq!(redacted["name"], json!("add"));
        assert_eq!(redacted["arguments"]["a"], json!(1));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["client_secret"],
            json!("[REDACTED]")
        );
    }
}
