//! Schema-driven argument validation
//!
//! Every tool call passes through `Arguments::validate` before dispatch, so
//! missing parameters and failed coercions surface as one `InvalidArguments`
//! failure regardless of which tool was targeted.

use super::{ParamType, ToolDescriptor, ToolError, ToolParameter};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Arguments that passed validation: coerced to their declared types, with
/// defaults filled in and undeclared keys dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn validate(descriptor: &ToolDescriptor, raw: Value) -> Result<Self, ToolError> {
        let mut supplied = match raw {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ToolError::invalid(format!(
                    "arguments must be a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let mut coerced = Map::new();
        for param in &descriptor.parameters {
            match supplied.remove(&param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    coerced.insert(param.name.clone(), coerce(param, value)?);
                }
                None if param.required => {
                    return Err(ToolError::invalid(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
                None => {
                    if let Some(default) = &param.default {
                        coerced.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        if !supplied.is_empty() {
            let ignored: Vec<&String> = supplied.keys().collect();
            tracing::debug!(tool = %descriptor.name, ?ignored, "Dropping undeclared arguments");
        }

        Ok(Self(coerced))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Deserialize into a tool's typed argument struct
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| ToolError::invalid(e.to_string()))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn coerce(param: &ToolParameter, value: Value) -> Result<Value, ToolError> {
    let mismatch = |value: &Value| {
        ToolError::invalid(format!(
            "parameter '{}' must be {}, got {}",
            param.name,
            expected(param.param_type),
            type_name(value)
        ))
    };

    match param.param_type {
        ParamType::String => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        ParamType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(mismatch(other)),
        },
        ParamType::Integer => {
            let number = match &value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| mismatch(&value))?;

            if let Some(minimum) = param.minimum {
                if number < minimum {
                    return Err(ToolError::invalid(format!(
                        "parameter '{}' must be at least {}, got {}",
                        param.name, minimum, number
                    )));
                }
            }
            Ok(Value::from(number))
        }
        ParamType::Array => match value {
            Value::String(single) => Ok(Value::Array(vec![Value::String(single)])),
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(Value::Array(items)),
            other => Err(mismatch(&other)),
        },
    }
}

fn expected(param_type: ParamType) -> &'static str {
    match param_type {
        ParamType::String => "a string",
        ParamType::Integer => "an integer",
        ParamType::Boolean => "a boolean",
        ParamType::Array => "a list of strings",
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
