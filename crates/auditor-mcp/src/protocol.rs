//! JSON-RPC 2.0 and MCP wire types.
//!
//! Workers speak newline-delimited JSON-RPC 2.0 over their stdio. The
//! methods used here are the MCP discovery/invocation subset: `initialize`,
//! `notifications/initialized`, `tools/list` and `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision sent during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request. A request without an `id` is a notification and
/// expects no response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: None,
            method: method.into(),
            params: Value::Null,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    /// Echoed request id. Kept as a raw value so a misbehaving worker cannot
    /// fail the whole frame parse with an odd id type.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Value::from(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Value::from(id),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// One tool as declared by a worker in its `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// `tools/list` result payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolRecord>,
}

/// `tools/call` result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: Some(true),
        }
    }

    /// Flatten all text blocks into one string for the conversation history.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// MCP content blocks. Workers in this system only produce text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_with_id() {
        let request = RpcRequest::new(7, "tools/list", json!({}));
        let line = serde_json::to_string(&request).unwrap();
        assert!(line.contains("\"jsonrpc\":\"2.0\""));
        assert!(line.contains("\"id\":7"));
        assert!(line.contains("\"method\":\"tools/list\""));
    }

    #[test]
    fn test_notification_omits_id() {
        let notification = RpcRequest::notification("notifications/initialized");
        let line = serde_json::to_string(&notification).unwrap();
        assert!(!line.contains("\"id\""));
    }

    #[test]
    fn test_response_success_and_error_are_exclusive() {
        let ok = RpcResponse::success(1, json!({"tools": []}));
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err = RpcResponse::error(1, RpcError::METHOD_NOT_FOUND, "no such method");
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, RpcError::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_record_uses_camel_case_schema_key() {
        let json = r#"{
            "name": "get_open_ports",
            "description": "List listening ports",
            "inputSchema": {"type": "object", "properties": {}}
        }"#;
        let record: ToolRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, "get_open_ports");
        assert_eq!(record.input_schema["type"], "object");
    }

    #[test]
    fn test_tool_record_tolerates_missing_description() {
        let record: ToolRecord = serde_json::from_str(r#"{"name": "t"}"#).unwrap();
        assert!(record.description.is_none());
        assert!(record.input_schema.is_null());
    }

    #[test]
    fn test_call_result_joined_text() {
        let result = CallToolResult {
            content: vec![
                ToolContent::Text {
                    text: "first".into(),
                },
                ToolContent::Text {
                    text: "second".into(),
                },
            ],
            is_error: None,
        };
        assert_eq!(result.joined_text(), "first\nsecond");
    }

    #[test]
    fn test_call_result_error_flag_roundtrip() {
        let line = serde_json::to_string(&CallToolResult::error("boom")).unwrap();
        assert!(line.contains("\"isError\":true"));
        let parsed: CallToolResult = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.is_error, Some(true));
        assert_eq!(parsed.joined_text(), "boom");
    }
}
