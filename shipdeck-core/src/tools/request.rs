//! Typed access to tool call arguments

use serde_json::{Map, Value};

use crate::tools::schema::ToolSchema;
use crate::{Error, Result};

/// Named parameters of one tool call, with schema defaults filled in
#[derive(Debug, Clone, Default)]
pub struct ToolRequest {
    values: Map<String, Value>,
}

impl ToolRequest {
    /// Build a request from raw arguments, applying defaults for absent parameters.
    /// Null and empty-string values count as absent; keys the schema does not
    /// declare are dropped.
    pub fn from_arguments(schema: &ToolSchema, arguments: Value) -> Result<Self> {
        let mut values = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => {
                return Err(Error::invalid(
                    "arguments",
                    "expected an object of named parameters",
                ));
            }
        };
        values.retain(|name, v| !is_absent(v) && schema.get(name).is_some());

        for param in &schema.params {
            if let Some(default) = &param.default
                && !values.contains_key(&param.name)
            {
                values.insert(param.name.clone(), default.clone());
            }
        }
        Ok(Self { values })
    }

    /// Non-empty string value
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn str_or<'a>(&'a self, name: &str, fallback: &'a str) -> &'a str {
        self.get_str(name).unwrap_or(fallback)
    }

    /// Required string value; absent or empty yields `"<name> is required"`
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get_str(name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))
    }

    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Comma-separated list parameter, trimmed, empty items dropped
    pub fn list(&self, name: &str) -> Vec<&str> {
        self.get_str(name)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
