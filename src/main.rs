//! Interactive CLI for the tool-calling orchestration core. Without
//! `--model` (or without the `llama-cpp` feature), it drives a
//! deterministic built-in demo conversation against
//! [`llama_chat_cli::ScriptedBackend`] so the binary is runnable with no
//! GGUF model on disk.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use llama_chat_cli::{
    demo_backend, generate_with_tools, validate_catalog, ChatTemplateFamily, GrammarMode, OrchestratorConfig,
    ProcessState, SamplerParams, ShellCommandExecutor, Sinks, DEMO_CATALOG_JSON,
};

#[cfg(feature = "llama-cpp")]
use llama_chat_cli::LlamaBackend;

/// Drive one user turn of the tool-calling orchestration core.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a tool-catalog JSON file (OpenAI function-calling array).
    /// Falls back to a small built-in demo catalog (`echo`, `get_time`)
    /// when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// The user's message for this turn.
    #[arg(long, default_value = "What time is it?")]
    message: String,

    /// Optional instruction prepended to the fixed tool-calling system
    /// preamble.
    #[arg(long)]
    system: Option<String>,

    /// Round budget before the orchestrator gives up.
    #[arg(long, default_value_t = 8)]
    max_rounds: usize,

    /// New tokens requested per round.
    #[arg(long, default_value_t = 512)]
    max_tokens_per_turn: u32,

    /// Grammar activation mode.
    #[arg(long, value_enum, default_value_t = GrammarModeArg::Lazy)]
    grammar_mode: GrammarModeArg,

    /// Chat-template family used to resolve per-model stop strings.
    #[arg(long, value_enum, default_value_t = ChatTemplateFamilyArg::Generic)]
    chat_template: ChatTemplateFamilyArg,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.8)]
    temperature: f32,

    /// Top-k cutoff.
    #[arg(long, default_value_t = 40)]
    top_k: i32,

    /// Top-p cutoff.
    #[arg(long, default_value_t = 0.95)]
    top_p: f32,

    /// Min-p cutoff.
    #[arg(long, default_value_t = 0.05)]
    min_p: f32,

    /// Sampler seed.
    #[arg(long, default_value_t = 0xFFFF_FFFF)]
    seed: u32,

    /// Path to a GGUF model file. Requires the `llama-cpp` feature; when
    /// omitted, the built-in demo conversation runs instead.
    #[arg(long)]
    #[cfg_attr(not(feature = "llama-cpp"), allow(dead_code))]
    model: Option<PathBuf>,

    /// Context size, in tokens, for the loaded model. Only used with
    /// `--model`.
    #[arg(long, default_value_t = 4096)]
    #[cfg_attr(not(feature = "llama-cpp"), allow(dead_code))]
    context_size: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GrammarModeArg {
    Strict,
    Lazy,
}

impl From<GrammarModeArg> for GrammarMode {
    fn from(value: GrammarModeArg) -> Self {
        match value {
            GrammarModeArg::Strict => GrammarMode::Strict,
            GrammarModeArg::Lazy => GrammarMode::Lazy,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChatTemplateFamilyArg {
    ChatMl,
    Llama3,
    Gemma,
    Generic,
}

impl From<ChatTemplateFamilyArg> for ChatTemplateFamily {
    fn from(value: ChatTemplateFamilyArg) -> Self {
        match value {
            ChatTemplateFamilyArg::ChatMl => ChatTemplateFamily::ChatMl,
            ChatTemplateFamilyArg::Llama3 => ChatTemplateFamily::Llama3,
            ChatTemplateFamilyArg::Gemma => ChatTemplateFamily::Gemma,
            ChatTemplateFamilyArg::Generic => ChatTemplateFamily::Generic,
        }
    }
}

fn load_catalog_text(path: Option<&PathBuf>) -> Result<String> {
    let text = match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("reading tool catalog {}", p.display()))?,
        None => DEMO_CATALOG_JSON.to_string(),
    };
    validate_catalog(&text).context("tool catalog failed validation")?;
    Ok(text)
}

fn build_config(args: &Args) -> OrchestratorConfig {
    OrchestratorConfig {
        max_rounds: args.max_rounds,
        max_tokens_per_turn: args.max_tokens_per_turn,
        grammar_mode: args.grammar_mode.into(),
        chat_template_family: args.chat_template.into(),
        extra_stop_strings: Vec::new(),
        sampler: SamplerParams {
            top_k: args.top_k,
            top_p: args.top_p,
            temperature: args.temperature,
            min_p: args.min_p,
            seed: args.seed,
            ..SamplerParams::default()
        },
        system_preamble: args.system.clone(),
    }
}

fn make_sinks<'a>(
    tokens_out: &'a mut dyn std::io::Write,
) -> (
    impl FnMut(&str) + 'a,
    impl FnMut(&llama_chat_cli::ToolCall) + 'a,
    impl FnMut(&llama_chat_cli::OrchestratorError) + 'a,
    impl FnMut(&str) + 'a,
) {
    let on_token = move |chunk: &str| {
        let _ = write!(tokens_out, "{chunk}");
        let _ = tokens_out.flush();
    };
    let on_tool_call_detected = |call: &llama_chat_cli::ToolCall| {
        tracing::info!(tool = %call.name, arguments = %call.arguments, "tool call detected");
    };
    let on_error = |err: &llama_chat_cli::OrchestratorError| {
        tracing::error!(error = %err, "generation failed");
    };
    let on_done = |_final_text: &str| {
        println!();
    };
    (on_token, on_tool_call_detected, on_error, on_done)
}

#[cfg(feature = "llama-cpp")]
async fn run_with_model(model: &std::path::Path, args: &Args, catalog_text: &str) -> Result<()> {
    let n_ctx =
        std::num::NonZeroU32::new(args.context_size).context("--context-size must be nonzero")?;
    let backend = LlamaBackend::load(
        model.to_str().context("model path must be valid UTF-8")?,
        n_ctx,
        args.chat_template.into(),
    )
    .context("loading model")?;
    let config = build_config(args);
    let process = ProcessState::new(backend, config.grammar_mode, config.sampler.clone());
    let executor = ShellCommandExecutor::new();
    let cancel = AtomicBool::new(false);

    let mut stdout = std::io::stdout();
    let (mut on_token, mut on_tool_call_detected, mut on_error, mut on_done) = make_sinks(&mut stdout);
    let sinks = Sinks {
        on_token: &mut on_token,
        on_tool_call_detected: &mut on_tool_call_detected,
        on_error: &mut on_error,
        on_done: &mut on_done,
    };
    generate_with_tools(&process, catalog_text, &args.message, &executor, &config, &cancel, sinks).await;
    Ok(())
}

async fn run_demo(args: &Args, catalog_text: &str) -> Result<()> {
    let config = build_config(args);
    let process = ProcessState::new(demo_backend(), config.grammar_mode, config.sampler.clone());
    let executor = ShellCommandExecutor::new();
    let cancel = AtomicBool::new(false);

    let mut stdout = std::io::stdout();
    let (mut on_token, mut on_tool_call_detected, mut on_error, mut on_done) = make_sinks(&mut stdout);
    let sinks = Sinks {
        on_token: &mut on_token,
        on_tool_call_detected: &mut on_tool_call_detected,
        on_error: &mut on_error,
        on_done: &mut on_done,
    };
    generate_with_tools(&process, catalog_text, &args.message, &executor, &config, &cancel, sinks).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let catalog_text = load_catalog_text(args.catalog.as_ref())?;

    #[cfg(feature = "llama-cpp")]
    {
        if let Some(model) = &args.model {
            return run_with_model(model, &args, &catalog_text).await;
        }
    }

    run_demo(&args, &catalog_text).await
}
