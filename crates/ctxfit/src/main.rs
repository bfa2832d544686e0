//! Inspect and compact LLM conversations against a token budget.
//!
//! Conversations are JSON arrays of messages in the Anthropic messages shape;
//! tool files are JSON arrays of `{name, description, input_schema}`.
//!
//! # Examples
//!
//! ```sh
//! # Per-role counts and usage against a 32k budget
//! ctxfit stats conversation.json --max-tokens 32000
//!
//! # Exit status 0 if it fits, 2 if not
//! ctxfit fits conversation.json --tools tools.json --max-tokens 8000
//!
//! # Compact and print the result, report on stderr
//! cat conversation.json | ctxfit compact - --max-tokens 8000 --report
//!
//! # Apply a single edit
//! ctxfit trim conversation.json --op keep-recent --limit 10
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use ctxfit::context::{
    self, ContextManager, ContextManagerConfig, ContextStats, ContextUsage, UsageLevel,
};
use ctxfit::{Message, MessageRole, ToolSchema};
use serde::Serialize;
use std::io::{self, Read};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status of `fits` when the conversation is over budget.
const EXIT_OVER_BUDGET: i32 = 2;

/// Inspect and compact LLM conversations against a token budget.
#[derive(Parser)]
#[command(name = "ctxfit", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log compaction decisions to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print message counts, estimated tokens and budget usage
    Stats(Input),
    /// Print whether the conversation fits the budget
    Fits(Input),
    /// Compact the conversation to fit the budget
    Compact {
        #[command(flatten)]
        input: Input,

        /// Write the compaction report to stderr
        #[arg(long)]
        report: bool,
    },
    /// Apply a single stateless edit
    Trim {
        #[command(flatten)]
        input: Input,

        /// Edit to apply
        #[arg(long, value_enum)]
        op: EditOp,

        /// Message limit for keep-recent and summarize-early
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Role to drop with drop-role
        #[arg(long)]
        role: Option<String>,
    },
}

#[derive(Args)]
struct Input {
    /// Conversation JSON file, or `-` for stdin
    conversation: String,

    /// JSON file with an array of tool schemas
    #[arg(long)]
    tools: Option<String>,

    /// JSON file with manager configuration
    #[arg(long)]
    config: Option<String>,

    // ── Overrides ──────────────────────────────────────────────
    /// Token ceiling for messages plus tools
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Advisory compaction threshold (fraction of the ceiling)
    #[arg(long)]
    threshold: Option<f64>,

    /// Do not truncate tool results during compaction
    #[arg(long)]
    keep_tool_results: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EditOp {
    KeepRecent,
    SummarizeEarly,
    DropRole,
    ClearToolResults,
    TextOnly,
}

#[derive(Serialize)]
struct StatsOutput {
    #[serde(flatten)]
    stats: ContextStats,
    usage: ContextUsage,
    level: UsageLevel,
    fits: bool,
    pairing_violations: Vec<usize>,
}

// ── Loading ────────────────────────────────────────────────────────

fn read_source(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| format!("failed to read '{path}': {e}"))
}

fn load_conversation(path: &str) -> Result<Vec<Message>, String> {
    let content = read_source(path)?;
    serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse conversation '{path}': {e}"))
}

fn load_tools(path: &str) -> Result<Vec<ToolSchema>, String> {
    let content = read_source(path)?;
    serde_json::from_str(&content).map_err(|e| format!("failed to parse tools file '{path}': {e}"))
}

/// Config file values, then command-line overrides.
fn build_config(input: &Input) -> Result<ContextManagerConfig, String> {
    let mut config = match &input.config {
        Some(path) => {
            let content = read_source(path)?;
            serde_json::from_str(&content)
                .map_err(|e| format!("failed to parse config file '{path}': {e}"))?
        }
        None => ContextManagerConfig::default(),
    };
    if let Some(max) = input.max_tokens {
        config = config.with_max_tokens(max);
    }
    if let Some(threshold) = input.threshold {
        config = config.with_compact_threshold(threshold);
    }
    if input.keep_tool_results {
        config = config.with_clear_tool_results(false);
    }
    Ok(config)
}

fn load(input: &Input) -> Result<(ContextManager, Vec<Message>, Vec<ToolSchema>), String> {
    let manager = ContextManager::new(build_config(input)?);
    let messages = load_conversation(&input.conversation)?;
    let tools = match &input.tools {
        Some(path) => load_tools(path)?,
        None => Vec::new(),
    };
    debug!(
        "Loaded {} message(s) and {} tool(s), budget {}",
        messages.len(),
        tools.len(),
        manager.max_context_tokens()
    );
    Ok((manager, messages, tools))
}

// ── Commands ───────────────────────────────────────────────────────

fn apply_edit(
    messages: &[Message],
    op: EditOp,
    limit: usize,
    role: Option<&str>,
) -> Result<Vec<Message>, String> {
    let edited = match op {
        EditOp::KeepRecent => context::keep_recent(messages, limit),
        EditOp::SummarizeEarly => context::summarize_early(messages, limit),
        EditOp::DropRole => {
            let role = role.ok_or_else(|| "--op drop-role requires --role".to_string())?;
            context::remove_by_role(messages, &MessageRole::from(role))
        }
        EditOp::ClearToolResults => context::clear_tool_results(messages),
        EditOp::TextOnly => context::extract_text_only(messages),
    };
    Ok(edited)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))
}

/// Run a command, returning its stdout text and exit status.
fn run(cli: &Cli) -> Result<(String, i32), String> {
    match &cli.command {
        Command::Stats(input) => {
            let (manager, messages, tools) = load(input)?;
            let usage = manager.usage(&messages, &tools);
            let output = StatsOutput {
                stats: manager.stats(&messages),
                level: usage.level(manager.compact_threshold()),
                fits: usage.fits(),
                usage,
                pairing_violations: context::pairing_violations(&messages),
            };
            Ok((to_json(&output)?, 0))
        }
        Command::Fits(input) => {
            let (manager, messages, tools) = load(input)?;
            let fits = manager.fits_in_context(&messages, &tools);
            let status = if fits { 0 } else { EXIT_OVER_BUDGET };
            Ok((fits.to_string(), status))
        }
        Command::Compact { input, report } => {
            let (manager, messages, tools) = load(input)?;
            let compaction = manager.compact_with_report(&messages, &tools);
            if *report {
                eprintln!("{}", to_json(&compaction.report)?);
            }
            Ok((to_json(&compaction.messages)?, 0))
        }
        Command::Trim {
            input,
            op,
            limit,
            role,
        } => {
            let messages = load_conversation(&input.conversation)?;
            let edited = apply_edit(&messages, *op, *limit, role.as_deref())?;
            Ok((to_json(&edited)?, 0))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok((output, status)) => {
            println!("{output}");
            process::exit(status);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
