//! CLI argument parsing for the review workflow.
//!
//! The CLI is intentionally thin: it wires the review loop without embedding
//! policy or heuristics, so the same core logic can be reused elsewhere.
use crate::strategy::Strategy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the proposal review workflow.
#[derive(Parser, Debug)]
#[command(
    name = "derisk",
    version,
    about = "Iterative review-and-revise workflow for mAb regulatory proposals",
    after_help = "Commands:\n  review --proposal-file <FILE>   Run a review session (evidence, assess, critique, rewrite)\n  prompts --strategy <NAME>       Print the prompt set a strategy resolves to\n  trail --session <KEY>           Replay a recorded session's stage checkpoints\n  config-stub                     Print a starter config.json\n\nExamples:\n  derisk review --proposal-file proposal.txt\n  derisk review --proposal \"Respilimab for severe asthma...\" --strategy combined\n  derisk review --proposal-file proposal.txt --max-iterations 3 --rating-gate 8 --json\n  derisk review --proposal-file proposal.txt --lm \"ollama run llama3.2\"\n  derisk prompts --strategy langflow\n  derisk trail --session 1700000000000\n  derisk config-stub > config.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Review(ReviewArgs),
    Prompts(PromptsArgs),
    Trail(TrailArgs),
    ConfigStub(ConfigStubArgs),
}

/// Review command inputs for a single session.
#[derive(Parser, Debug)]
#[command(about = "Run a review session over a proposal")]
pub struct ReviewArgs {
    /// Proposal text given inline
    #[arg(long, value_name = "TEXT", conflicts_with = "proposal_file")]
    pub proposal: Option<String>,

    /// File containing the proposal text
    #[arg(long, value_name = "FILE")]
    pub proposal_file: Option<PathBuf>,

    /// Prompt strategy to run with
    #[arg(long, value_name = "NAME", value_enum)]
    pub strategy: Option<Strategy>,

    /// Upper bound on critique/rewrite cycles
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Accept early once the rating reaches this threshold (1-10)
    #[arg(long, value_name = "N")]
    pub rating_gate: Option<u8>,

    /// Model name passed to the generation endpoint
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Generation endpoint base URL
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Shell command to use as the generation backend instead of the endpoint
    #[arg(long, value_name = "CMD", conflicts_with = "script")]
    pub lm: Option<String>,

    /// Scripted-responses file for deterministic offline runs
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Path to a config.json overriding defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory session trails and reports are written under
    #[arg(long, value_name = "DIR")]
    pub sessions_root: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Emit a verbose transcript of the session
    #[arg(long)]
    pub verbose: bool,
}

/// Prompts command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print the prompt set a strategy resolves to")]
pub struct PromptsArgs {
    /// Prompt strategy to print
    #[arg(long, value_name = "NAME", value_enum, default_value_t = Strategy::Default)]
    pub strategy: Strategy,
}

/// Trail command inputs for replaying a recorded session.
#[derive(Parser, Debug)]
#[command(about = "Replay a recorded session's stage checkpoints")]
pub struct TrailArgs {
    /// Session key to replay; omit to list recorded sessions
    #[arg(long, value_name = "KEY")]
    pub session: Option<String>,

    /// Directory session trails and reports are written under
    #[arg(long, value_name = "DIR")]
    pub sessions_root: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Config-stub command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print a starter config.json to stdout")]
pub struct ConfigStubArgs {}
