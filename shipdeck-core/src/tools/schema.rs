//! Declarative tool schemas and argument validation

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Parameter value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Boolean,
}

impl ParamKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One named tool parameter
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub enum_values: Vec<String>,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::String,
            description: description.into(),
            required: false,
            enum_values: Vec::new(),
            default: None,
        }
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ParamKind::Boolean,
            ..Self::string(name, description)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict a string parameter to a fixed set of values
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| (*v).to_string()).collect();
        self
    }

    pub fn default_str(mut self, value: impl Into<String>) -> Self {
        self.default = Some(Value::String(value.into()));
        self
    }

    pub fn default_bool(mut self, value: bool) -> Self {
        self.default = Some(Value::Bool(value));
        self
    }

    fn to_property(&self) -> Value {
        let mut prop = Map::new();
        let kind = match self.kind {
            ParamKind::String => "string",
            ParamKind::Boolean => "boolean",
        };
        prop.insert("type".into(), Value::from(kind));
        prop.insert("description".into(), Value::from(self.description.as_str()));
        if !self.enum_values.is_empty() {
            prop.insert("enum".into(), Value::from(self.enum_values.clone()));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        Value::Object(prop)
    }

    fn check(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        if !self.kind.matches(value) {
            let expected = match self.kind {
                ParamKind::String => "expected a string",
                ParamKind::Boolean => "expected a boolean",
            };
            return Err(Error::invalid(&self.name, expected));
        }
        if let Some(s) = value.as_str()
            && !s.is_empty()
            && !self.enum_values.is_empty()
            && !self.enum_values.iter().any(|allowed| allowed == s)
        {
            return Err(Error::invalid(
                &self.name,
                format!(
                    "'{}' is not one of [{}]",
                    s,
                    self.enum_values.join(", ")
                ),
            ));
        }
        Ok(())
    }
}

/// Immutable description of one MCP tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON Schema advertised as `inputSchema` in `tools/list`
    pub fn to_input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(param.name.clone(), param.to_property());
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        let mut schema = serde_json::json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty()
            && let Some(obj) = schema.as_object_mut()
        {
            obj.insert("required".into(), Value::from(required));
        }
        schema
    }

    /// Type and enum checks on raw call arguments.
    ///
    /// Required parameters are enforced later by the handler so that a missing
    /// value surfaces as a tool error rather than a protocol error. The empty
    /// string is treated as absent and never fails an enum check.
    pub fn validate(&self, arguments: &Value) -> Result<()> {
        let args = match arguments {
            Value::Null => return Ok(()),
            Value::Object(map) => map,
            _ => {
                return Err(Error::invalid(
                    "arguments",
                    "expected an object of named parameters",
                ));
            }
        };
        for param in &self.params {
            if let Some(value) = args.get(&param.name) {
                param.check(value)?;
            }
        }
        Ok(())
    }
}
