//! GBNF grammar synthesizer: turns a [`ParsedTool`] list into a GBNF string
//! enforcing the tool-call envelope and per-tool argument schemas, or the
//! generic fallback grammar when typed synthesis is unavailable.
//!
//! Required parameters are emitted as a fixed in-order sequence; optional
//! parameters are chained so the grammar accepts any declaration-order
//! prefix of them, rather than every permutation.

use llama_chat_types::{ParamDescriptor, ParamType, ParsedTool};

/// JSON grammar terminal productions shared by every generated grammar.
const JSON_COMMON_TERMINALS: &str = r#"value ::= object | array | string | number | "true" | "false" | "null"
object ::= "{" ws (member ("," ws member)*)? ws "}"
member ::= string ws ":" ws value
array ::= "[" ws (value ("," ws value)*)? ws "]"
string ::= "\"" chars "\""
chars ::= char*
char ::= [^"\\] | "\\" escape-char
escape-char ::= ["\\bfnrt/] | "u" hex hex hex hex
hex ::= [0-9a-fA-F]
number ::= "-"? integer fraction? exponent?
integer ::= "0" | [1-9] [0-9]*
fraction ::= "." [0-9]+
exponent ::= [eE] [+-]? [0-9]+
ws ::= [ \t\n]*
"#;

fn sanitize_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Escape a string for use inside a GBNF double-quoted literal.
fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quoted(s: &str) -> String {
    format!("\"\\\"{}\\\"\"", escape_literal(s))
}

/// Value rule reference for a parameter. Enum parameters get a dedicated
/// per-tool-per-parameter alternation rule, appended to `rules`; other
/// types reference the shared JSON terminals.
fn value_ref(param: &ParamDescriptor, tool_id: &str, rules: &mut String) -> String {
    if let Some(values) = &param.enum_values {
        if !values.is_empty() {
            let rule_name = format!("enum_{tool_id}_{}", sanitize_ident(&param.name));
            let alts: Vec<String> = values.iter().map(|v| quoted(v)).collect();
            rules.push_str(&format!("{rule_name} ::= {}\n", alts.join(" | ")));
            return rule_name;
        }
    }
    match &param.param_type {
        ParamType::String => "string".to_string(),
        ParamType::Number | ParamType::Integer => "number".to_string(),
        ParamType::Boolean => "(\"true\" | \"false\")".to_string(),
        ParamType::Object => "object".to_string(),
        ParamType::Array => "array".to_string(),
        ParamType::Unknown(_) => "value".to_string(),
    }
}

fn kv_rule(param: &ParamDescriptor, tool_id: &str, rules: &mut String) -> String {
    let value = value_ref(param, tool_id, rules);
    format!("{} ws \":\" ws {}", quoted(&param.name), value)
}

/// Build the chain `opt_i ::= kv_i (ws "," ws opt_{i+1})?` from the last
/// optional parameter back to the first, so the grammar accepts any
/// declaration-order *prefix* of the optional parameters.
fn build_optional_chain(
    optional: &[&ParamDescriptor],
    tool_id: &str,
    rules: &mut String,
) -> Option<String> {
    let mut next: Option<String> = None;
    for (i, param) in optional.iter().enumerate().rev() {
        let group_name = format!("opt_{tool_id}_{i}");
        let kv = kv_rule(param, tool_id, rules);
        let body = match &next {
            Some(next_name) => format!("{kv} (ws \",\" ws {next_name})?"),
            None => kv,
        };
        rules.push_str(&format!("{group_name} ::= {body}\n"));
        next = Some(group_name);
    }
    next
}

fn build_args_rule(tool: &ParsedTool, tool_id: &str, rules: &mut String) -> String {
    let args_name = format!("args_{tool_id}");
    let required: Vec<&ParamDescriptor> = tool.required_params();
    let optional: Vec<&ParamDescriptor> = tool.optional_params();

    if required.is_empty() && optional.is_empty() {
        rules.push_str(&format!("{args_name} ::= \"{{\" ws \"}}\"\n"));
        return args_name;
    }

    let required_kvs: Vec<String> = required.iter().map(|p| kv_rule(p, tool_id, rules)).collect();
    let opt_group = build_optional_chain(&optional, tool_id, rules);

    let body = match (required_kvs.is_empty(), opt_group) {
        (true, Some(group)) => format!("({group})?"),
        (true, None) => String::new(),
        (false, Some(group)) => format!("{} (ws \",\" ws {group})?", required_kvs.join(" ws \",\" ws ")),
        (false, None) => required_kvs.join(" ws \",\" ws "),
    };
    rules.push_str(&format!("{args_name} ::= \"{{\" ws {body} ws \"}}\"\n"));
    args_name
}

/// Synthesize the typed GBNF grammar for a parsed tool list. Returns an
/// empty string if `tools` is empty, signalling that the generic fallback
/// grammar should be used instead.
#[must_use]
pub fn synthesize_typed_grammar(tools: &[ParsedTool]) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let mut rules = String::new();
    rules.push_str("root ::= ws toolcall ws\n");
    rules.push_str(
        "toolcall ::= \"{\" ws \"\\\"tool_calls\\\"\" ws \":\" ws \"[\" ws call ws \"]\" ws \"}\"\n",
    );

    let call_names: Vec<String> = tools
        .iter()
        .map(|t| format!("call_{}", sanitize_ident(&t.name)))
        .collect();
    rules.push_str(&format!("call ::= {}\n", call_names.join(" | ")));

    for tool in tools {
        let id = sanitize_ident(&tool.name);
        let args_rule = build_args_rule(tool, &id, &mut rules);
        rules.push_str(&format!(
            "call_{id} ::= \"{{\" ws \"\\\"name\\\"\" ws \":\" ws {} ws \",\" ws \"\\\"arguments\\\"\" ws \":\" ws {args_rule} ws \"}}\"\n",
            quoted(&tool.name),
        ));
    }

    rules.push_str(JSON_COMMON_TERMINALS);
    rules
}

/// The generic fallback grammar: enforces the envelope and a `name` drawn
/// from the known tool names, but leaves `arguments` as an opaque JSON
/// object.
#[must_use]
pub fn synthesize_fallback_grammar(tool_names: &[&str]) -> String {
    if tool_names.is_empty() {
        return String::new();
    }
    let alts: Vec<String> = tool_names.iter().map(|n| quoted(n)).collect();
    let mut grammar = String::new();
    grammar.push_str("root ::= ws toolcall ws\n");
    grammar.push_str(
        "toolcall ::= \"{\" ws \"\\\"tool_calls\\\"\" ws \":\" ws \"[\" ws call ws \"]\" ws \"}\"\n",
    );
    grammar.push_str(&format!(
        "call ::= \"{{\" ws \"\\\"name\\\"\" ws \":\" ws name ws \",\" ws \"\\\"arguments\\\"\" ws \":\" ws object ws \"}}\"\n"
    ));
    grammar.push_str(&format!("name ::= {}\n", alts.join(" | ")));
    grammar.push_str(JSON_COMMON_TERMINALS);
    grammar
}

#[cfg(test)]
mod tests {
    use super::*;
    use llama_chat_types::ParamType;

    fn weather_tool() -> ParsedTool {
        ParsedTool {
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
        }
    }

    #[test]
    fn empty_tool_list_returns_empty_grammar() {
        assert!(synthesize_typed_grammar(&[]).is_empty());
    }

    #[test]
    fn zero_param_tool_has_empty_object_args() {
        let tool = ParsedTool {
            name: "ping".to_string(),
            description: String::new(),
            params: vec![],
            required: vec![],
        };
        let grammar = synthesize_typed_grammar(&[tool]);
        assert!(grammar.contains(r#"args_ping ::= "{" ws "}""#));
    }

    #[test]
    fn single_required_param_has_no_optional_wrapping() {
        let tool = ParsedTool {
            name: "echo".to_string(),
            description: String::new(),
            params: vec![ParamDescriptor {
                name: "text".to_string(),
                param_type: ParamType::String,
                enum_values: None,
            }],
            required: vec!["text".to_string()],
        };
        let grammar = synthesize_typed_grammar(&[tool]);
        assert!(grammar.contains(r#"args_echo ::= "{" ws "\"text\"" ws ":" ws string ws "}""#));
    }

    #[test]
    fn optional_only_tool_builds_prefix_chain() {
        let tool = ParsedTool {
            name: "search".to_string(),
            description: String::new(),
            params: vec![
                ParamDescriptor {
                    name: "query".to_string(),
                    param_type: ParamType::String,
                    enum_values: None,
                },
                ParamDescriptor {
                    name: "limit".to_string(),
                    param_type: ParamType::Integer,
                    enum_values: None,
                },
            ],
            required: vec![],
        };
        let grammar = synthesize_typed_grammar(&[tool]);
        assert!(grammar.contains("args_search ::= \"{\" ws (opt_search_0)? ws \"}\""));
        assert!(grammar.contains("opt_search_0 ::= \"\\\"query\\\"\" ws \":\" ws string (ws \",\" ws opt_search_1)?"));
        assert!(grammar.contains("opt_search_1 ::= \"\\\"limit\\\"\" ws \":\" ws number"));
    }

    #[test]
    fn required_then_optional_wraps_optional_block_in_comma() {
        let grammar = synthesize_typed_grammar(&[weather_tool()]);
        assert!(grammar.contains("(ws \",\" ws opt_get_weather_0)?"));
    }

    #[test]
    fn enum_param_generates_dedicated_alternation() {
        let grammar = synthesize_typed_grammar(&[weather_tool()]);
        assert!(grammar.contains("enum_get_weather_units ::= \"\\\"celsius\\\"\" | \"\\\"fahrenheit\\\"\""));
    }

    #[test]
    fn multiple_tools_produce_call_disjunction() {
        let tools = vec![weather_tool(), ParsedTool {
            name: "search".to_string(),
            description: String::new(),
            params: vec![],
            required: vec![],
        }];
        let grammar = synthesize_typed_grammar(&tools);
        assert!(grammar.contains("call ::= call_get_weather | call_search"));
    }

    #[test]
    fn root_accepts_envelope_shape() {
        let grammar = synthesize_typed_grammar(&[weather_tool()]);
        assert!(grammar.contains(r#"toolcall ::= "{" ws "\"tool_calls\"" ws ":" ws "[" ws call ws "]" ws "}""#));
    }

    #[test]
    fn fallback_grammar_leaves_arguments_opaque() {
        let grammar = synthesize_fallback_grammar(&["get_weather", "search"]);
        assert!(grammar.contains("ws \"\\\"arguments\\\"\" ws \":\" ws object"));
        assert!(grammar.contains(r#"name ::= "\"get_weather\"" | "\"search\"""#));
    }

    #[test]
    fn fallback_grammar_empty_when_no_tools() {
        assert!(synthesize_fallback_grammar(&[]).is_empty());
    }
}
