//! Tool-schema parser: turns an OpenAI-style tool JSON array into a
//! [`ParsedTool`] list, tolerating one extra level of `function` nesting
//! and dropping malformed entries rather than aborting the whole catalog.

use llama_chat_types::{CatalogError, ParamDescriptor, ParamType, ParsedTool};

use crate::primitives::{extract_string, scan_object_members, scan_string_array, split_top_level_array};

fn string_value(raw: &str) -> Option<String> {
    extract_string(raw.trim(), 0).map(|(s, _)| s)
}

/// Normalise a single tool entry's text: if the entry is doubly-wrapped
/// (`{"function":{"type":"function","function":{...}}}`), replace it with
/// the inner `{"type":"function","function":{...}}` value. Idempotent: an
/// already-normal entry (one carrying a top-level `type` key) is returned
/// unchanged.
#[must_use]
pub fn normalize_entry(entry: &str) -> String {
    let members = scan_object_members(entry);
    if members.iter().any(|(k, _)| k == "type") {
        return entry.trim().to_string();
    }
    if let Some((_, func_val)) = members.iter().find(|(k, _)| k == "function") {
        let inner = scan_object_members(func_val);
        let is_function_type = inner
            .iter()
            .find(|(k, _)| k == "type")
            .and_then(|(_, v)| string_value(v))
            .is_some_and(|t| t == "function");
        let has_nested_function = inner.iter().any(|(k, _)| k == "function");
        if is_function_type && has_nested_function {
            return func_val.trim().to_string();
        }
    }
    entry.trim().to_string()
}

fn parse_param(name: String, schema: &str) -> ParamDescriptor {
    let schema_members = scan_object_members(schema);
    let type_str = schema_members
        .iter()
        .find(|(k, _)| k == "type")
        .and_then(|(_, v)| string_value(v))
        .unwrap_or_else(|| "string".to_string());
    let enum_values = schema_members
        .iter()
        .find(|(k, _)| k == "enum")
        .map(|(_, v)| scan_string_array(v))
        .filter(|v| !v.is_empty());
    ParamDescriptor {
        name,
        param_type: ParamType::from_schema_str(&type_str),
        enum_values,
    }
}

fn parse_parameters(params_obj: &str) -> (Vec<ParamDescriptor>, Vec<String>) {
    let members = scan_object_members(params_obj);
    let required = members
        .iter()
        .find(|(k, _)| k == "required")
        .map(|(_, v)| scan_string_array(v))
        .unwrap_or_default();
    let params = members
        .iter()
        .find(|(k, _)| k == "properties")
        .map(|(_, props)| {
            scan_object_members(props)
                .into_iter()
                .map(|(name, schema)| parse_param(name, &schema))
                .collect()
        })
        .unwrap_or_default();
    (params, required)
}

fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse one (already-normalised) tool entry. Returns `None` for any
/// structural failure: missing `type: "function"`, missing/invalid `name`,
/// unterminated strings, or unbalanced braces — callers drop the entry and
/// continue with the rest of the catalog.
fn parse_entry(entry: &str) -> Option<ParsedTool> {
    let top = scan_object_members(entry);
    let is_function = top
        .iter()
        .find(|(k, _)| k == "type")
        .and_then(|(_, v)| string_value(v))
        .is_some_and(|t| t == "function");
    if !is_function {
        return None;
    }
    let func_val = top.iter().find(|(k, _)| k == "function").map(|(_, v)| v)?;
    let func_members = scan_object_members(func_val);
    let name = func_members
        .iter()
        .find(|(k, _)| k == "name")
        .and_then(|(_, v)| string_value(v))?;
    if !is_valid_tool_name(&name) {
        return None;
    }
    let description = func_members
        .iter()
        .find(|(k, _)| k == "description")
        .and_then(|(_, v)| string_value(v))
        .unwrap_or_default();
    let (params, required) = func_members
        .iter()
        .find(|(k, _)| k == "parameters")
        .map(|(_, v)| parse_parameters(v))
        .unwrap_or_default();
    Some(ParsedTool {
        name,
        description,
        params,
        required,
    })
}

/// Parse a UTF-8 tool-catalog payload (an array of
/// `{"type":"function","function":{...}}` objects, optionally
/// double-wrapped) into a [`ParsedTool`] list. Malformed entries are
/// dropped; if every entry fails, the returned list is empty.
#[must_use]
pub fn parse_tool_catalog(payload: &str) -> Vec<ParsedTool> {
    split_top_level_array(payload)
        .into_iter()
        .filter_map(|raw_entry| parse_entry(&normalize_entry(raw_entry)))
        .collect()
}

/// Validate a tool-catalog payload at `enable` time: invalid schema or an
/// empty catalog is reported synchronously. Does not return the parsed
/// tools themselves; callers still call [`parse_tool_catalog`] to get
/// them.
pub fn validate_catalog(payload: &str) -> Result<(), CatalogError> {
    let trimmed = payload.trim();
    if !trimmed.starts_with('[') {
        return Err(CatalogError::InvalidJson(
            "catalog payload must be a JSON array".to_string(),
        ));
    }
    if split_top_level_array(payload).is_empty() {
        return Err(CatalogError::Empty);
    }
    if parse_tool_catalog(payload).is_empty() {
        return Err(CatalogError::AllEntriesFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tool_round_trip() {
        let catalog = r#"[{"type":"function","function":{"name":"get_weather","description":"Get weather","parameters":{"type":"object","properties":{"location":{"type":"string"},"units":{"type":"string","enum":["celsius","fahrenheit"]}},"required":["location"]}}}]"#;
        let tools = parse_tool_catalog(catalog);
        assert_eq!(tools.len(), 1);
        let tool = &tools[0];
        assert_eq!(tool.name, "get_weather");
        assert_eq!(tool.required, vec!["location"]);
        assert_eq!(tool.params.len(), 2);
        assert_eq!(tool.params[0].name, "location");
        assert_eq!(tool.params[1].enum_values, Some(vec!["celsius".to_string(), "fahrenheit".to_string()]));
    }

    #[test]
    fn double_nested_catalog_normalises_to_one_tool() {
        let catalog = r#"[{"function":{"type":"function","function":{"name":"t","parameters":{"type":"object","properties":{},"required":[]}}}}]"#;
        let tools = parse_tool_catalog(catalog);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "t");
    }

    #[test]
    fn normalisation_is_idempotent() {
        let doubly = r#"{"function":{"type":"function","function":{"name":"t"}}}"#;
        let once = normalize_entry(doubly);
        let twice = normalize_entry(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalisation_does_not_alter_single_wrapped_input() {
        let normal = r#"{"type":"function","function":{"name":"t"}}"#;
        assert_eq!(normalize_entry(normal), normal);
    }

    #[test]
    fn missing_required_keys_drops_entry_but_keeps_others() {
        let catalog = r#"[{"type":"function","function":{"description":"no name"}},{"type":"function","function":{"name":"ok"}}]"#;
        let tools = parse_tool_catalog(catalog);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ok");
    }

    #[test]
    fn all_entries_failing_yields_empty_list() {
        let catalog = r#"[{"type":"function","function":{"description":"no name"}}]"#;
        assert!(parse_tool_catalog(catalog).is_empty());
    }

    #[test]
    fn missing_required_array_resolves_to_empty() {
        let catalog = r#"[{"type":"function","function":{"name":"t","parameters":{"type":"object","properties":{"x":{"type":"string"}}}}}]"#;
        let tools = parse_tool_catalog(catalog);
        assert!(tools[0].required.is_empty());
    }

    #[test]
    fn unknown_param_type_is_preserved() {
        let catalog = r#"[{"type":"function","function":{"name":"t","parameters":{"type":"object","properties":{"loc":{"type":"geo-point"}}}}}]"#;
        let tools = parse_tool_catalog(catalog);
        assert_eq!(tools[0].params[0].param_type, ParamType::Unknown("geo-point".to_string()));
    }

    #[test]
    fn validate_catalog_rejects_non_array_payload() {
        let err = validate_catalog(r#"{"type":"function"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidJson(_)));
    }

    #[test]
    fn validate_catalog_rejects_empty_array() {
        assert_eq!(validate_catalog("[]").unwrap_err(), CatalogError::Empty);
    }

    #[test]
    fn validate_catalog_rejects_all_entries_failing() {
        let catalog = r#"[{"type":"function","function":{"description":"no name"}}]"#;
        assert_eq!(validate_catalog(catalog).unwrap_err(), CatalogError::AllEntriesFailed);
    }

    #[test]
    fn validate_catalog_accepts_a_well_formed_entry() {
        let catalog = r#"[{"type":"function","function":{"name":"t"}}]"#;
        assert!(validate_catalog(catalog).is_ok());
    }
}
