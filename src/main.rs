use anyhow::{anyhow, Context, Result};
use clap::Parser;

mod cli;
mod config;
mod evidence;
mod generate;
mod session;
mod state;
mod strategy;
mod trail;

use cli::{Command, PromptsArgs, ReviewArgs, RootArgs, TrailArgs};
use config::{Overrides, Settings};
use generate::{CommandGenerator, Generator, OllamaGenerator, ScriptedGenerator};
use session::{run_session, SessionContext, SessionSettings, Stage, StageSink};
use state::ReviewState;
use strategy::prompt_set;
use trail::{SessionPaths, SessionTrail};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Review(args) => cmd_review(args),
        Command::Prompts(args) => cmd_prompts(args),
        Command::Trail(args) => cmd_trail(args),
        Command::ConfigStub(_) => cmd_config_stub(),
    }
}

fn cmd_review(args: ReviewArgs) -> Result<()> {
    let proposal = load_proposal(&args)?;

    let config = match &args.config {
        Some(path) => Some(config::load_config(path)?),
        None => None,
    };
    let overrides = Overrides {
        model: args.model.clone(),
        endpoint: args.endpoint.clone(),
        lm_command: args.lm.clone(),
        max_iterations: args.max_iterations,
        strategy: args.strategy,
        rating_gate: args.rating_gate,
        sessions_root: args.sessions_root.clone(),
    };
    let settings = config::resolve(&overrides, config.as_ref())?;

    let generator = build_generator(&args, &settings)?;
    let evidence = evidence::PrecedentLibrary;
    let prompts = prompt_set(settings.strategy);

    let sessions_root = match &settings.sessions_root {
        Some(root) => root.clone(),
        None => trail::default_sessions_root()?,
    };
    let session_key = trail::new_session_key()?;
    let paths = SessionPaths::new(sessions_root, &session_key);
    let mut sink = TranscriptSink {
        inner: SessionTrail::new(paths.clone()),
        verbose: args.verbose,
    };

    let ctx = SessionContext {
        generator: generator.as_ref(),
        evidence: &evidence,
        prompts: &prompts,
        strategy: settings.strategy,
        settings: SessionSettings {
            max_iterations: settings.max_iterations,
            rating_gate: settings.rating_gate,
        },
        session_key: session_key.clone(),
    };

    let report = run_session(proposal, &ctx, &mut sink)?;
    trail::write_report(&paths, &report)?;
    tracing::info!(
        session_key = %report.session_key,
        iterations = report.iteration_count,
        rating = report.rating,
        "review session complete"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Session {} finished after {} iteration(s) with strategy {}.",
        report.session_key, report.iteration_count, report.strategy
    );
    if let (Some(grade), Some(rating)) = (report.grade, report.rating) {
        println!("Grade: {}  Rating: {rating}/10", grade.as_str());
    }
    if !report.evidence.is_empty() {
        println!("\nEvidence:");
        for snippet in &report.evidence {
            println!("- {snippet}");
        }
    }
    if let Some(summary) = &report.risk_summary {
        println!("\nRisk summary:\n{summary}");
    }
    if let Some(critique) = &report.critique {
        println!("\nCritique:\n{critique}");
    }
    println!("\nImproved proposal:\n{}", report.improved_proposal);
    println!("\nWrote report to {}", paths.report_path().display());
    Ok(())
}

fn cmd_prompts(args: PromptsArgs) -> Result<()> {
    let prompts = prompt_set(args.strategy);
    println!("Strategy: {}\n", args.strategy);
    for (role, text) in [
        ("evidence_retriever", prompts.evidence_retriever),
        ("risk_assessment", prompts.risk_assessment),
        ("risk_critiquer", prompts.risk_critiquer),
        ("proposal_writer", prompts.proposal_writer),
    ] {
        println!("--- {role} ---");
        println!("{}\n", text.trim_end());
    }
    Ok(())
}

fn cmd_trail(args: TrailArgs) -> Result<()> {
    let root = match &args.sessions_root {
        Some(root) => root.clone(),
        None => trail::default_sessions_root()?,
    };

    let Some(session_key) = &args.session else {
        let keys = trail::list_sessions(&root)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&keys)?);
        } else if keys.is_empty() {
            println!("No recorded sessions under {}", root.display());
        } else {
            for key in keys {
                println!("{key}");
            }
        }
        return Ok(());
    };

    let paths = SessionPaths::new(root, session_key);
    let entries = trail::load_trail(&paths)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        let rating = entry
            .state
            .rating
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  iteration={} rating={} stage={}",
            entry.ts_epoch_ms, entry.state.iteration_count, rating, entry.stage
        );
    }
    println!("{} checkpoint(s)", entries.len());
    Ok(())
}

fn cmd_config_stub() -> Result<()> {
    println!("{}", config::config_stub());
    Ok(())
}

fn load_proposal(args: &ReviewArgs) -> Result<String> {
    if let Some(text) = &args.proposal {
        if text.trim().is_empty() {
            return Err(anyhow!("proposal text must be non-empty"));
        }
        return Ok(text.clone());
    }
    if let Some(path) = &args.proposal_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read proposal {}", path.display()))?;
        if text.trim().is_empty() {
            return Err(anyhow!("proposal file {} is empty", path.display()));
        }
        return Ok(text.trim_end().to_string());
    }
    Err(anyhow!("either --proposal or --proposal-file is required"))
}

fn build_generator(args: &ReviewArgs, settings: &Settings) -> Result<Box<dyn Generator>> {
    if let Some(script) = &args.script {
        return Ok(Box::new(ScriptedGenerator::load(script)?));
    }
    if let Some(command) = &settings.lm_command {
        return Ok(Box::new(CommandGenerator::new(command.clone())));
    }
    Ok(Box::new(OllamaGenerator::new(
        settings.endpoint.clone(),
        settings.model.clone(),
    )))
}

/// Sink that forwards to the trail and, when verbose, narrates each stage
/// on stderr.
struct TranscriptSink {
    inner: SessionTrail,
    verbose: bool,
}

impl StageSink for TranscriptSink {
    fn record(&mut self, stage: Stage, state: &ReviewState) -> Result<()> {
        if self.verbose {
            match stage {
                Stage::RetrieveEvidence => eprintln!(
                    "[pass {}] retrieved {} evidence snippet(s)",
                    state.iteration_count + 1,
                    state.evidence.len()
                ),
                Stage::Assess => eprintln!(
                    "[pass {}] assessed: grade={} rating={}",
                    state.iteration_count + 1,
                    state.grade.map(|g| g.as_str()).unwrap_or("-"),
                    state
                        .rating
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string())
                ),
                Stage::Critique => eprintln!("[pass {}] critique drafted", state.iteration_count + 1),
                Stage::Rewrite => eprintln!("[pass {}] proposal rewritten", state.iteration_count + 1),
                Stage::Decide => eprintln!(
                    "[pass {n}] decide: iteration_count={n}",
                    n = state.iteration_count
                ),
            }
        }
        self.inner.record(stage, state)
    }
}
