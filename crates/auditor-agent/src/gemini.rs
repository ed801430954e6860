//! Gemini-backed decision client.
//!
//! Talks to the `generateContent` REST endpoint with function calling.
//! History maps onto Gemini `contents`: assistant tool requests become
//! `functionCall` parts, observations become `functionResponse` parts, and
//! the tool catalogue becomes `functionDeclarations`. Gemini does not return
//! correlation ids for the calls it requests, so ids are minted here when
//! the response is decoded, before the calls ever enter history.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use auditor_core::{Message, ToolCall};
use auditor_mcp::ToolDescriptor;

use crate::client::{Decision, DecisionClient, DecisionError};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Read the API key from `GEMINI_API_KEY`, falling back to
    /// `GOOGLE_API_KEY`.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .context("GEMINI_API_KEY or GOOGLE_API_KEY must be set")?;
        Ok(Self::new(api_key, Self::DEFAULT_MODEL))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl DecisionClient for GeminiClient {
    async fn decide(
        &self,
        history: &[Message],
        catalogue: &[ToolDescriptor],
    ) -> Result<Decision, DecisionError> {
        let body = build_request(history, catalogue);
        let url = format!("{API_BASE}/{}:generateContent", self.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| DecisionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail = detail.chars().take(500).collect::<String>();
            return Err(DecisionError::Request(format!("HTTP {status}: {detail}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DecisionError::Malformed(e.to_string()))?;
        decode_response(&payload)
    }
}

/// Map history + catalogue onto a `generateContent` request body.
fn build_request(history: &[Message], catalogue: &[ToolDescriptor]) -> Value {
    // Observations carry only a call id; Gemini wants the function name.
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    for message in history {
        if let Message::AssistantToolRequest { calls } = message {
            for call in calls {
                call_names.insert(call.id.as_str(), call.name.as_str());
            }
        }
    }

    let mut system_instruction = None;
    let mut contents: Vec<Value> = Vec::new();
    for message in history {
        match message {
            Message::System { content } => {
                system_instruction = Some(json!({ "parts": [{ "text": content }] }));
            }
            Message::User { content } => {
                contents.push(json!({ "role": "user", "parts": [{ "text": content }] }));
            }
            Message::AssistantText { content } => {
                contents.push(json!({ "role": "model", "parts": [{ "text": content }] }));
            }
            Message::AssistantToolRequest { calls } => {
                let parts: Vec<Value> = calls
                    .iter()
                    .map(|call| {
                        json!({ "functionCall": { "name": call.name, "args": call.arguments } })
                    })
                    .collect();
                contents.push(json!({ "role": "model", "parts": parts }));
            }
            Message::ToolObservation { result } => {
                let name = call_names
                    .get(result.call_id.as_str())
                    .copied()
                    .unwrap_or("unknown_tool");
                let part = json!({
                    "functionResponse": {
                        "name": name,
                        "response": {
                            "content": result.content,
                            "is_error": result.is_error,
                        },
                    },
                });
                // Sibling observations of one turn share a single user entry.
                match contents.last_mut() {
                    Some(last)
                        if last["role"] == "user"
                            && last["parts"][0].get("functionResponse").is_some() =>
                    {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.push(part);
                        }
                    }
                    _ => contents.push(json!({ "role": "user", "parts": [part] })),
                }
            }
        }
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": { "temperature": 0 },
    });
    if let Some(system) = system_instruction {
        body["systemInstruction"] = system;
    }
    if !catalogue.is_empty() {
        let declarations: Vec<Value> = catalogue
            .iter()
            .map(|descriptor| {
                json!({
                    "name": descriptor.name,
                    "description": descriptor.description,
                    "parameters": descriptor.input_schema(),
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    body
}

fn decode_response(payload: &Value) -> Result<Decision, DecisionError> {
    let candidate = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| DecisionError::Malformed("response has no candidates".into()))?;

    let empty = Vec::new();
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut calls = Vec::new();
    let mut text_parts = Vec::new();
    for part in parts {
        if let Some(function_call) = part.get("functionCall") {
            let name = function_call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| DecisionError::Malformed("functionCall without a name".into()))?;
            let arguments = function_call
                .get("args")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            calls.push(ToolCall::new(name, arguments));
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            text_parts.push(text);
        }
    }

    if !calls.is_empty() {
        Ok(Decision::ToolRequests(calls))
    } else if !text_parts.is_empty() {
        Ok(Decision::Final(text_parts.join("\n")))
    } else {
        Err(DecisionError::Malformed(
            "response contained neither text nor function calls".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::ToolResult;
    use auditor_mcp::{ParamKind, ParameterSpec};
    use serde_json::Map;

    fn catalogue() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "get_open_ports".into(),
            description: "List listening ports".into(),
            parameters: vec![ParameterSpec {
                name: "limit".into(),
                kind: ParamKind::Integer,
                required: false,
                default: None,
            }],
        }]
    }

    #[test]
    fn test_build_request_maps_roles_and_tools() {
        let history = vec![
            Message::System {
                content: "directive".into(),
            },
            Message::User {
                content: "list open ports".into(),
            },
        ];
        let body = build_request(&history, &catalogue());

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "directive");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["temperature"], 0);
        let declaration = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "get_open_ports");
        assert_eq!(
            declaration["parameters"]["properties"]["limit"]["type"],
            "integer"
        );
    }

    #[test]
    fn test_build_request_groups_observations_by_turn() {
        let call_a = ToolCall::new("get_open_ports", Map::new());
        let call_b = ToolCall::new("get_cpu_usage", Map::new());
        let history = vec![
            Message::User {
                content: "audit".into(),
            },
            Message::AssistantToolRequest {
                calls: vec![call_a.clone(), call_b.clone()],
            },
            Message::ToolObservation {
                result: ToolResult::ok(&call_a.id, "[]"),
            },
            Message::ToolObservation {
                result: ToolResult::error(&call_b.id, "timed out"),
            },
        ];
        let body = build_request(&history, &[]);

        let contents = body["contents"].as_array().unwrap();
        // user, model functionCalls, one grouped user functionResponse entry
        assert_eq!(contents.len(), 3);
        let responses = contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0]["functionResponse"]["name"],
            "get_open_ports"
        );
        assert_eq!(
            responses[1]["functionResponse"]["response"]["is_error"],
            true
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_decode_function_call_response() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "functionCall": {
                            "name": "get_open_ports",
                            "args": { "limit": 10 }
                        }
                    }]
                }
            }]
        });
        let decision = decode_response(&payload).unwrap();
        match decision {
            Decision::ToolRequests(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_open_ports");
                assert_eq!(calls[0].arguments["limit"], json!(10));
                assert!(!calls[0].id.is_empty());
            }
            other => panic!("expected tool requests, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_text_response() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "System is very clean." }] }
            }]
        });
        assert_eq!(
            decode_response(&payload).unwrap(),
            Decision::Final("System is very clean.".into())
        );
    }

    #[test]
    fn test_decode_empty_response_is_malformed() {
        let payload = json!({ "candidates": [] });
        assert!(matches!(
            decode_response(&payload),
            Err(DecisionError::Malformed(_))
        ));
    }
}
