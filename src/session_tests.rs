use super::*;
use crate::generate::Generator;
use crate::state::{Assessment, Grade};
use crate::strategy::prompt_set;
use std::cell::{Cell, RefCell};

/// Generator that records every call and replays canned outputs, so tests
/// can assert on the exact inputs each stage builds.
struct RecordingGenerator {
    assess_inputs: RefCell<Vec<String>>,
    draft_inputs: RefCell<Vec<String>>,
    ratings: Vec<u8>,
    assess_cursor: Cell<usize>,
    rewrite_cursor: Cell<usize>,
}

impl RecordingGenerator {
    fn with_ratings(ratings: Vec<u8>) -> Self {
        RecordingGenerator {
            assess_inputs: RefCell::new(Vec::new()),
            draft_inputs: RefCell::new(Vec::new()),
            ratings,
            assess_cursor: Cell::new(0),
            rewrite_cursor: Cell::new(0),
        }
    }
}

impl Generator for RecordingGenerator {
    fn draft(&self, _instructions: &str, input: &str) -> anyhow::Result<String> {
        self.draft_inputs.borrow_mut().push(input.to_string());
        if input.starts_with(REWRITE_INPUT_PREFIX) {
            let n = self.rewrite_cursor.get() + 1;
            self.rewrite_cursor.set(n);
            Ok(format!("rewrite-{n}"))
        } else {
            Ok("tighten the immunogenicity rationale".to_string())
        }
    }

    fn assess(&self, _instructions: &str, input: &str) -> anyhow::Result<Assessment> {
        let n = self.assess_cursor.get();
        self.assess_cursor.set(n + 1);
        self.assess_inputs.borrow_mut().push(input.to_string());
        let rating = *self.ratings.get(n).unwrap_or(&5);
        Ok(Assessment {
            grade: if rating >= 7 { Grade::Pass } else { Grade::Fail },
            rating,
            summary: format!("assessment-{}", n + 1),
        })
    }
}

/// Evidence source that counts fetches and varies its snippets per call.
struct CountingEvidence {
    calls: Cell<u32>,
}

impl CountingEvidence {
    fn new() -> Self {
        CountingEvidence { calls: Cell::new(0) }
    }
}

impl crate::evidence::EvidenceSource for CountingEvidence {
    fn retrieve(&self, _proposal_text: &str) -> anyhow::Result<Vec<String>> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        Ok(vec![format!("precedent-fetch-{n}")])
    }
}

fn context<'a>(
    generator: &'a RecordingGenerator,
    evidence: &'a CountingEvidence,
    prompts: &'a crate::strategy::PromptSet,
    settings: SessionSettings,
) -> SessionContext<'a> {
    SessionContext {
        generator,
        evidence,
        prompts,
        strategy: Strategy::Default,
        settings,
        session_key: "test-session".to_string(),
    }
}

#[test]
fn stops_after_exactly_max_iterations() {
    let generator = RecordingGenerator::with_ratings(vec![4, 5]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 2,
            rating_gate: None,
        },
    );

    let report = run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap();

    assert_eq!(report.iteration_count, 2);
    assert_eq!(generator.assess_cursor.get(), 2);
    assert_eq!(report.improved_proposal, "rewrite-2");
}

#[test]
fn second_assess_reviews_the_first_rewrite_verbatim() {
    let generator = RecordingGenerator::with_ratings(vec![3, 6]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 2,
            rating_gate: None,
        },
    );

    run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap();

    let inputs = generator.assess_inputs.borrow();
    assert!(inputs[0].starts_with("Review this proposal: proposal"));
    assert!(inputs[1].starts_with("Review this revised proposal: rewrite-1"));
    assert!(inputs[1].contains("Previous feedback: tighten the immunogenicity rationale"));
}

#[test]
fn evidence_is_fetched_fresh_each_pass_and_replaced() {
    let generator = RecordingGenerator::with_ratings(vec![3, 6]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 2,
            rating_gate: None,
        },
    );

    let report = run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap();

    assert_eq!(evidence.calls.get(), 2);
    // Replaced, not accumulated: only the latest fetch survives.
    assert_eq!(report.evidence, vec!["precedent-fetch-2".to_string()]);
}

#[test]
fn rating_gate_accepts_early() {
    let generator = RecordingGenerator::with_ratings(vec![9]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 4,
            rating_gate: Some(8),
        },
    );

    let report = run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap();

    assert_eq!(report.iteration_count, 1);
    assert_eq!(report.rating, Some(9));
    assert_eq!(report.grade, Some(Grade::Pass));
}

#[test]
fn rating_gate_below_threshold_keeps_iterating() {
    let generator = RecordingGenerator::with_ratings(vec![6, 7]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 2,
            rating_gate: Some(8),
        },
    );

    let report = run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap();

    assert_eq!(report.iteration_count, 2);
}

#[test]
fn zero_max_iterations_returns_the_original() {
    let generator = RecordingGenerator::with_ratings(vec![]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 0,
            rating_gate: None,
        },
    );

    let report = run_session("untouched".to_string(), &ctx, &mut NullSink).unwrap();

    assert_eq!(report.iteration_count, 0);
    assert_eq!(report.improved_proposal, "untouched");
    assert!(report.rating.is_none());
    assert_eq!(evidence.calls.get(), 0);
}

#[test]
fn sink_sees_every_stage_in_order() {
    struct Tape(Vec<&'static str>);
    impl StageSink for Tape {
        fn record(&mut self, stage: Stage, _state: &crate::state::ReviewState) -> anyhow::Result<()> {
            self.0.push(stage.as_str());
            Ok(())
        }
    }

    let generator = RecordingGenerator::with_ratings(vec![4]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 1,
            rating_gate: None,
        },
    );

    let mut tape = Tape(Vec::new());
    run_session("proposal".to_string(), &ctx, &mut tape).unwrap();

    assert_eq!(
        tape.0,
        vec!["retrieve_evidence", "assess", "critique", "rewrite", "decide"]
    );
}

#[test]
fn generator_failure_aborts_the_session() {
    struct FailingGenerator;
    impl Generator for FailingGenerator {
        fn draft(&self, _instructions: &str, _input: &str) -> anyhow::Result<String> {
            anyhow::bail!("backend unavailable")
        }
        fn assess(&self, _instructions: &str, _input: &str) -> anyhow::Result<Assessment> {
            anyhow::bail!("backend unavailable")
        }
    }

    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = SessionContext {
        generator: &FailingGenerator,
        evidence: &evidence,
        prompts: &prompts,
        strategy: Strategy::Default,
        settings: SessionSettings {
            max_iterations: 2,
            rating_gate: None,
        },
        session_key: "test-session".to_string(),
    };

    let err = run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap_err();
    assert!(err.to_string().contains("assess proposal"));
}

#[test]
fn report_serializes_round_trip() {
    let generator = RecordingGenerator::with_ratings(vec![4, 8]);
    let evidence = CountingEvidence::new();
    let prompts = prompt_set(Strategy::Default);
    let ctx = context(
        &generator,
        &evidence,
        &prompts,
        SessionSettings {
            max_iterations: 2,
            rating_gate: None,
        },
    );

    let report = run_session("proposal".to_string(), &ctx, &mut NullSink).unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let back: SessionReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.schema_version, REPORT_SCHEMA_VERSION);
    assert_eq!(back.improved_proposal, report.improved_proposal);
    assert_eq!(back.iteration_count, 2);
}
