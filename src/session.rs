//! The review loop: a fixed stage sequence per pass and a termination
//! policy.
//!
//! One session runs `RetrieveEvidence -> Assess -> Critique -> Rewrite ->
//! Decide` per pass, strictly sequentially, with every collaborator call
//! blocking until it returns. `Decide` either terminates the session
//! (Accepted) or re-enters the sequence for another pass (Rejected +
//! Feedback). Termination is iteration-count-bounded by default; an
//! optional rating gate additionally accepts early when the latest rating
//! clears it.
//!
//! Collaborator failures are fatal to the session: no retry, no partial
//! result, no checkpoint rollback. The state is checkpointed through a
//! `StageSink` after every stage so an external trail can make the session
//! resumable by key.

use crate::evidence::EvidenceSource;
use crate::generate::Generator;
use crate::state::{ReviewState, StageUpdate};
use crate::strategy::{PromptSet, Strategy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Driver-owned prefix of every rewrite-stage input. The scripted backend
/// keys on it to tell the two free-text roles apart.
pub const REWRITE_INPUT_PREFIX: &str = "Rewrite the following proposal using these insights:";

/// Schema version for session reports.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Stages of one pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RetrieveEvidence,
    Assess,
    Critique,
    Rewrite,
    Decide,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::RetrieveEvidence => "retrieve_evidence",
            Stage::Assess => "assess",
            Stage::Critique => "critique",
            Stage::Rewrite => "rewrite",
            Stage::Decide => "decide",
        }
    }
}

/// Where `Decide` routes after a completed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Accepted,
    RejectedWithFeedback,
}

/// Termination policy knobs for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Upper bound on completed critique/rewrite cycles.
    pub max_iterations: u32,
    /// Optional early-accept threshold on the latest rating. `None` keeps
    /// the primary iteration-only policy.
    pub rating_gate: Option<u8>,
}

/// Checkpoint target invoked after every stage with the updated state.
pub trait StageSink {
    fn record(&mut self, stage: Stage, state: &ReviewState) -> Result<()>;
}

/// Sink that drops checkpoints, for callers that keep no trail.
pub struct NullSink;

impl StageSink for NullSink {
    fn record(&mut self, _stage: Stage, _state: &ReviewState) -> Result<()> {
        Ok(())
    }
}

/// Final result of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub schema_version: u32,
    pub session_key: String,
    pub strategy: Strategy,
    pub started_at_epoch_ms: u128,
    pub finished_at_epoch_ms: u128,
    /// The proposal the session was opened with.
    pub initial_proposal: String,
    /// Latest rewrite, or the original if zero passes ran.
    pub improved_proposal: String,
    #[serde(default)]
    pub grade: Option<crate::state::Grade>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub risk_summary: Option<String>,
    #[serde(default)]
    pub critique: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub iteration_count: u32,
}

/// Everything a session needs besides the proposal itself.
pub struct SessionContext<'a> {
    pub generator: &'a dyn Generator,
    pub evidence: &'a dyn EvidenceSource,
    pub prompts: &'a PromptSet,
    pub strategy: Strategy,
    pub settings: SessionSettings,
    pub session_key: String,
}

/// Route after a completed pass: accept when the iteration budget is
/// exhausted, or early when the optional rating gate is cleared.
pub fn route_proposal(state: &ReviewState, settings: &SessionSettings) -> Route {
    if state.iteration_count >= settings.max_iterations {
        return Route::Accepted;
    }
    if let (Some(gate), Some(rating)) = (settings.rating_gate, state.rating) {
        if rating >= gate {
            return Route::Accepted;
        }
    }
    Route::RejectedWithFeedback
}

/// Assess-stage input. The first pass reviews the original proposal; later
/// passes review the latest rewrite together with the previous critique.
fn assess_input(state: &ReviewState) -> String {
    if state.iteration_count == 0 {
        format!(
            "Review this proposal: {}\nReturn a 1-10 rating",
            state.proposal_text
        )
    } else {
        format!(
            "Review this revised proposal: {}\nPrevious feedback: {}\nReturn a 1-10 rating",
            state.proposal_text,
            state.critique.as_deref().unwrap_or_default()
        )
    }
}

fn critique_input(state: &ReviewState) -> String {
    format!(
        "Proposal:\n{}\n\nRisk Assessment:\n{}",
        state.proposal_text,
        state.risk_summary.as_deref().unwrap_or_default()
    )
}

fn rewrite_input(state: &ReviewState) -> String {
    format!(
        "{REWRITE_INPUT_PREFIX}\nOriginal Proposal:\n{}\nRisk Assessment:\n{}\nCritique:\n{}",
        state.proposal_text,
        state.risk_summary.as_deref().unwrap_or_default(),
        state.critique.as_deref().unwrap_or_default()
    )
}

/// Run one session to termination and build its report.
pub fn run_session(
    initial_proposal: String,
    ctx: &SessionContext<'_>,
    sink: &mut dyn StageSink,
) -> Result<SessionReport> {
    let started_at_epoch_ms = crate::trail::now_epoch_ms()?;
    let mut state = ReviewState::new(initial_proposal.clone());

    while state.iteration_count < ctx.settings.max_iterations {
        let pass = state.iteration_count + 1;

        let snippets = ctx
            .evidence
            .retrieve(&state.proposal_text)
            .context("retrieve evidence")?;
        state.apply(StageUpdate::Evidence(snippets));
        sink.record(Stage::RetrieveEvidence, &state)?;
        tracing::debug!(pass, stage = "retrieve_evidence", "stage complete");

        let assessment = ctx
            .generator
            .assess(ctx.prompts.risk_assessment, &assess_input(&state))
            .context("assess proposal")?;
        state.apply(StageUpdate::Assessed(assessment));
        sink.record(Stage::Assess, &state)?;
        tracing::debug!(pass, stage = "assess", rating = state.rating, "stage complete");

        let critique = ctx
            .generator
            .draft(ctx.prompts.risk_critiquer, &critique_input(&state))
            .context("critique proposal")?;
        state.apply(StageUpdate::Critiqued(critique));
        sink.record(Stage::Critique, &state)?;
        tracing::debug!(pass, stage = "critique", "stage complete");

        let rewrite = ctx
            .generator
            .draft(ctx.prompts.proposal_writer, &rewrite_input(&state))
            .context("rewrite proposal")?;
        state.apply(StageUpdate::Rewritten(rewrite));
        sink.record(Stage::Rewrite, &state)?;
        tracing::debug!(pass, stage = "rewrite", "stage complete");

        state.apply(StageUpdate::IterationCompleted);
        sink.record(Stage::Decide, &state)?;

        match route_proposal(&state, &ctx.settings) {
            Route::Accepted => break,
            Route::RejectedWithFeedback => {}
        }
    }

    let finished_at_epoch_ms = crate::trail::now_epoch_ms()?;
    Ok(SessionReport {
        schema_version: REPORT_SCHEMA_VERSION,
        session_key: ctx.session_key.clone(),
        strategy: ctx.strategy,
        started_at_epoch_ms,
        finished_at_epoch_ms,
        initial_proposal,
        improved_proposal: state.proposal_text,
        grade: state.grade,
        rating: state.rating,
        risk_summary: state.risk_summary,
        critique: state.critique,
        evidence: state.evidence,
        iteration_count: state.iteration_count,
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
