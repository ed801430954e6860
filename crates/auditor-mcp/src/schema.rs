//! Schema compilation and argument validation.
//!
//! Tools and their parameter shapes are discovered at runtime, so each
//! worker-declared `inputSchema` is compiled once, at discovery time, into an
//! explicit [`ParameterSpec`] contract. The dispatch executor validates every
//! requested call against that contract before the call crosses the process
//! boundary, which turns shape mistakes into descriptive error observations
//! the decision client can self-correct from.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

use crate::protocol::ToolRecord;

/// The runtime kind of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Object,
}

impl ParamKind {
    /// Map a declared JSON-schema type to a kind. Unknown declarations
    /// degrade to `String` rather than failing discovery; an unusual tool
    /// should degrade, not block the whole worker.
    pub fn from_declared(declared: &str) -> Self {
        match declared {
            "string" => ParamKind::String,
            "integer" => ParamKind::Integer,
            "number" => ParamKind::Float,
            "boolean" => ParamKind::Boolean,
            "array" => ParamKind::List,
            "object" => ParamKind::Object,
            _ => ParamKind::String,
        }
    }

    /// The JSON-schema type name for re-emission to the decision client.
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Float => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::List => "array",
            ParamKind::Object => "object",
        }
    }
}

/// One compiled parameter of a tool's argument contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A discovered tool: immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDescriptor {
    /// Compile a worker's raw `tools/list` record into a descriptor.
    pub fn from_record(worker: &str, record: &ToolRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record
                .description
                .clone()
                .unwrap_or_else(|| format!("Tool exposed by worker '{worker}'")),
            parameters: compile_input_schema(&record.input_schema),
        }
    }

    /// Re-emit the compiled contract as a JSON schema for the decision
    /// client's tool catalogue.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.kind.json_type()));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(json!(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Argument shape mismatch. The message is deliberately descriptive: it is
/// fed back to the decision client as an error observation.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required parameter '{name}'")]
    MissingRequired { name: String },

    #[error("parameter '{name}' expected {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },
}

/// Compile a declared `{type: "object", properties, required}` schema into
/// parameter specs. Anything unrecognized degrades instead of erroring.
pub fn compile_input_schema(schema: &Value) -> Vec<ParameterSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, definition)| ParameterSpec {
            name: name.clone(),
            kind: definition
                .get("type")
                .and_then(Value::as_str)
                .map(ParamKind::from_declared)
                .unwrap_or(ParamKind::String),
            required: required.contains(&name.as_str()),
            default: definition.get("default").cloned(),
        })
        .collect()
}

/// Validate `arguments` against the compiled contract.
///
/// Every required parameter must be present (or carry a declared default),
/// every present argument must match its declared kind, coercing only where
/// unambiguous. Extra undeclared arguments pass through untouched, since the
/// decision client may supply optional parameters the worker understands but
/// never declared.
pub fn validate_arguments(
    specs: &[ParameterSpec],
    arguments: &Map<String, Value>,
) -> Result<Map<String, Value>, ValidationError> {
    let mut validated = arguments.clone();
    for spec in specs {
        match arguments.get(&spec.name) {
            Some(value) => {
                let coerced = coerce(spec, value)?;
                validated.insert(spec.name.clone(), coerced);
            }
            None => {
                if let Some(default) = &spec.default {
                    validated.insert(spec.name.clone(), default.clone());
                } else if spec.required {
                    return Err(ValidationError::MissingRequired {
                        name: spec.name.clone(),
                    });
                }
            }
        }
    }
    Ok(validated)
}

fn coerce(spec: &ParameterSpec, value: &Value) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        name: spec.name.clone(),
        expected: spec.kind.json_type(),
        found: json_type_of(value).to_string(),
    };

    match spec.kind {
        ParamKind::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch()),
        },
        ParamKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamKind::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        ParamKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        ParamKind::List => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        ParamKind::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
    }
}

fn json_type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
