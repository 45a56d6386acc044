//! Tool catalog data model: tool descriptors, their parameters, and the
//! parsed, order-preserving shape grammar synthesis consumes.

use serde::{Deserialize, Serialize};

/// Parameter type. Unknown JSON-schema `type` values are preserved verbatim
/// in [`ParamType::Unknown`] rather than rejected, per the "unknown types
/// are preserved as strings" rule for the parsed tool list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// The original `type` text, for a value this synthesizer has no
    /// dedicated rule for. Falls back to the generic JSON value rule.
    Unknown(String),
}

impl ParamType {
    /// Map a raw JSON-schema `type` string onto a [`ParamType`].
    #[must_use]
    pub fn from_schema_str(raw: &str) -> Self {
        match raw {
            "string" => ParamType::String,
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "boolean" => ParamType::Boolean,
            "object" => ParamType::Object,
            "array" => ParamType::Array,
            other => ParamType::Unknown(other.to_string()),
        }
    }
}

/// A single parameter of a tool's `arguments` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub param_type: ParamType,
    /// Finite set of string-valued enum alternatives, in declaration order.
    pub enum_values: Option<Vec<String>>,
}

/// A parsed, resolved tool descriptor. Declaration order of
/// `params` is preserved because grammar generation depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTool {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamDescriptor>,
    /// Names of required parameters. Missing `required` resolves to empty.
    pub required: Vec<String>,
}

impl ParsedTool {
    /// Parameters in declaration order, not in `required`.
    #[must_use]
    pub fn required_params(&self) -> Vec<&ParamDescriptor> {
        self.params
            .iter()
            .filter(|p| self.required.iter().any(|r| r == &p.name))
            .collect()
    }

    /// Parameters in declaration order, not in `required`.
    #[must_use]
    pub fn optional_params(&self) -> Vec<&ParamDescriptor> {
        self.params
            .iter()
            .filter(|p| !self.required.iter().any(|r| r == &p.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_preserves_original_text() {
        assert_eq!(
            ParamType::from_schema_str("geo-point"),
            ParamType::Unknown("geo-point".to_string())
        );
    }

    #[test]
    fn required_and_optional_partition_params() {
        let tool = ParsedTool {
            name: "get_weather".to_string(),
            description: String::new(),
            params: vec![
                ParamDescriptor {
                    name: "location".to_string(),
                    param_type: ParamType::String,
                    enum_values: None,
                },
                ParamDescriptor {
                    name: "units".to_string(),
                    param_type: ParamType::String,
                    enum_values: Some(vec!["celsius".to_string(), "fahrenheit".to_string()]),
                },
            ],
            required: vec!["location".to_string()],
        };
        assert_eq!(tool.required_params().len(), 1);
        assert_eq!(tool.optional_params().len(), 1);
        assert_eq!(tool.optional_params()[0].name, "units");
    }
}
