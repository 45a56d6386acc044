//! Configuration types for the tool-calling orchestration core.
//!
//! Plain data: every type derives `serde::{Serialize, Deserialize}` so a
//! caller may load it from TOML/JSON the same way a web request body
//! deserializes into a config struct.

use llama_chat_types::{ChatMessage, GrammarMode, Role, SamplerParams};
use serde::{Deserialize, Serialize};

/// Chat-template family, used to select per-model stop strings. Falls back
/// to `Generic`'s fixed safety-net list when the family of the loaded
/// model isn't recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplateFamily {
    ChatMl,
    Llama3,
    Gemma,
    Generic,
}

/// Safety-net stop strings appended regardless of chat-template family.
pub const SAFETY_NET_STOP_STRINGS: &[&str] =
    &["\nUser:", "\nHuman:", "\n### User", "\n<|user|>"];

impl ChatTemplateFamily {
    /// Per-model stop strings for this chat-template family: `<end_of_turn>`,
    /// `<|im_end|>`, `<|eot_id|>`, `<|end|>`, `</s>`, `<|END_OF_TURN_TOKEN|>`.
    #[must_use]
    pub fn template_stop_strings(self) -> &'static [&'static str] {
        match self {
            ChatTemplateFamily::ChatMl => &["<|im_end|>"],
            ChatTemplateFamily::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
            ChatTemplateFamily::Gemma => &["<end_of_turn>"],
            ChatTemplateFamily::Generic => &["</s>", "<|end|>", "<|END_OF_TURN_TOKEN|>"],
        }
    }

    /// All stop strings active for this family: template-specific strings
    /// followed by the fixed safety net.
    #[must_use]
    pub fn all_stop_strings(self) -> Vec<String> {
        self.template_stop_strings()
            .iter()
            .chain(SAFETY_NET_STOP_STRINGS.iter())
            .map(|s| (*s).to_string())
            .collect()
    }

    /// Per-role (open, close) wrap tags. A minimal built-in template, not
    /// a general Jinja-style renderer: each family's turn-wrapping tags
    /// are fixed string literals.
    fn role_tags(self, role: Role) -> (&'static str, &'static str) {
        match (self, role) {
            (ChatTemplateFamily::ChatMl, Role::System) => ("<|im_start|>system\n", "<|im_end|>\n"),
            (ChatTemplateFamily::ChatMl, Role::User) => ("<|im_start|>user\n", "<|im_end|>\n"),
            (ChatTemplateFamily::ChatMl, Role::Assistant) => ("<|im_start|>assistant\n", "<|im_end|>\n"),
            (ChatTemplateFamily::ChatMl, Role::Tool) => ("<|im_start|>tool\n", "<|im_end|>\n"),

            (ChatTemplateFamily::Llama3, Role::System) => {
                ("<|start_header_id|>system<|end_header_id|>\n\n", "<|eot_id|>")
            }
            (ChatTemplateFamily::Llama3, Role::User) => {
                ("<|start_header_id|>user<|end_header_id|>\n\n", "<|eot_id|>")
            }
            (ChatTemplateFamily::Llama3, Role::Assistant) => {
                ("<|start_header_id|>assistant<|end_header_id|>\n\n", "<|eot_id|>")
            }
            (ChatTemplateFamily::Llama3, Role::Tool) => {
                ("<|start_header_id|>tool<|end_header_id|>\n\n", "<|eot_id|>")
            }

            // Gemma has no dedicated system/tool role; fold both into the
            // "user" turn.
            (ChatTemplateFamily::Gemma, Role::System | Role::User | Role::Tool) => {
                ("<start_of_turn>user\n", "<end_of_turn>\n")
            }
            (ChatTemplateFamily::Gemma, Role::Assistant) => ("<start_of_turn>model\n", "<end_of_turn>\n"),

            (ChatTemplateFamily::Generic, Role::System) => ("System: ", "\n\n"),
            (ChatTemplateFamily::Generic, Role::User) => ("User: ", "\n\n"),
            (ChatTemplateFamily::Generic, Role::Assistant) => ("Assistant: ", "\n\n"),
            (ChatTemplateFamily::Generic, Role::Tool) => ("Tool: ", "\n\n"),
        }
    }

    /// The tag that opens a new assistant turn, appended after the last
    /// message so the decoder continues generation in that role.
    fn assistant_open_tag(self) -> &'static str {
        self.role_tags(Role::Assistant).0
    }

    /// Render a message list into a single prompt string using this
    /// family's wrap tags, ending with an open assistant turn so the
    /// decoder's next tokens are the reply.
    #[must_use]
    pub fn render_prompt(self, messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();
        for message in messages {
            let (open, close) = self.role_tags(message.role);
            prompt.push_str(open);
            prompt.push_str(&message.content);
            prompt.push_str(close);
        }
        prompt.push_str(self.assistant_open_tag());
        prompt
    }
}

/// Configuration for a `generate_with_tools` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Round budget; conversation terminates with `max rounds exceeded`
    /// once reached.
    pub max_rounds: usize,
    /// New tokens requested per round's generation call.
    pub max_tokens_per_turn: u32,
    /// Grammar activation mode.
    pub grammar_mode: GrammarMode,
    /// Chat-template family, used to resolve per-model stop strings.
    pub chat_template_family: ChatTemplateFamily,
    /// Additional caller-supplied stop strings, beyond the family defaults.
    pub extra_stop_strings: Vec<String>,
    /// Cached sampler parameters, rebuilt verbatim each round.
    pub sampler: SamplerParams,
    /// Optional caller-supplied instruction prepended to the fixed
    /// tool-calling system preamble.
    pub system_preamble: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            max_tokens_per_turn: 512,
            grammar_mode: GrammarMode::Lazy,
            chat_template_family: ChatTemplateFamily::Generic,
            extra_stop_strings: Vec::new(),
            sampler: SamplerParams::default(),
            system_preamble: None,
        }
    }
}

impl OrchestratorConfig {
    /// Effective stop-string list: chat-template family strings, the fixed
    /// safety net, then caller-supplied extras.
    #[must_use]
    pub fn stop_strings(&self) -> Vec<String> {
        let mut strings = self.chat_template_family.all_stop_strings();
        strings.extend(self.extra_stop_strings.iter().cloned());
        strings
    }
}
