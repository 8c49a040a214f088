//! Session state for the review loop.
//!
//! One `ReviewState` is threaded through every stage of a session. Stages
//! never mutate the state directly; they produce a `StageUpdate` that is
//! merged in additively, so a stage can add or replace its own fields but
//! can never remove another stage's output.

use serde::{Deserialize, Serialize};

/// Lowest rating the assessor may assign.
pub const RATING_MIN: u8 = 1;
/// Highest rating the assessor may assign.
pub const RATING_MAX: u8 = 10;

/// Pass/fail decision attached to an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Pass,
    Fail,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Pass => "pass",
            Grade::Fail => "fail",
        }
    }
}

/// Structured result of one assessment stage.
///
/// Grade, rating, and summary are produced together by construction; a
/// backend response missing any of the three is rejected at the parse
/// boundary (see `generate::parse_assessment`) and never reaches the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub grade: Grade,
    /// Numeric quality score, always within `RATING_MIN..=RATING_MAX`.
    pub rating: u8,
    /// Free-text rationale behind the grade.
    pub summary: String,
}

/// The single mutable record for one review session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewState {
    /// Current text under review; replaced by each rewrite.
    pub proposal_text: String,

    /// Precedent snippets gathered this pass, in retrieval order.
    /// Replaced (not accumulated) on every pass.
    #[serde(default)]
    pub evidence: Vec<String>,

    /// Rationale from the latest assessment.
    #[serde(default)]
    pub risk_summary: Option<String>,

    /// Latest pass/fail decision.
    #[serde(default)]
    pub grade: Option<Grade>,

    /// Latest numeric quality score.
    #[serde(default)]
    pub rating: Option<u8>,

    /// Bulleted improvement feedback from the latest critique stage.
    #[serde(default)]
    pub critique: Option<String>,

    /// Number of completed critique/rewrite cycles. Starts at 0 and
    /// increases by exactly 1 per completed pass.
    #[serde(default)]
    pub iteration_count: u32,
}

impl ReviewState {
    /// Fresh state for an incoming proposal: only the proposal is set.
    pub fn new(proposal_text: String) -> Self {
        Self {
            proposal_text,
            evidence: Vec::new(),
            risk_summary: None,
            grade: None,
            rating: None,
            critique: None,
            iteration_count: 0,
        }
    }

    /// Merge one stage's partial result into the state.
    pub fn apply(&mut self, update: StageUpdate) {
        match update {
            StageUpdate::Evidence(snippets) => {
                self.evidence = snippets;
            }
            StageUpdate::Assessed(assessment) => {
                // The three assessment fields always land together.
                self.risk_summary = Some(assessment.summary);
                self.grade = Some(assessment.grade);
                self.rating = Some(assessment.rating);
            }
            StageUpdate::Critiqued(critique) => {
                self.critique = Some(critique);
            }
            StageUpdate::Rewritten(proposal) => {
                self.proposal_text = proposal;
            }
            StageUpdate::IterationCompleted => {
                self.iteration_count += 1;
            }
        }
    }
}

/// Partial result returned by one stage, merged into `ReviewState`.
#[derive(Debug, Clone)]
pub enum StageUpdate {
    /// Evidence fetched this pass; replaces the previous list.
    Evidence(Vec<String>),
    /// Assessment landed: risk summary, grade, and rating together.
    Assessed(Assessment),
    /// Critique text from the critiquer.
    Critiqued(String),
    /// Rewritten proposal; becomes the text under review.
    Rewritten(String),
    /// A full critique/rewrite cycle finished.
    IterationCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(grade: Grade, rating: u8) -> Assessment {
        Assessment {
            grade,
            rating,
            summary: "endpoint powering is weak".to_string(),
        }
    }

    #[test]
    fn new_state_has_only_the_proposal() {
        let state = ReviewState::new("Drug X, 300mg SC q4w".to_string());
        assert_eq!(state.proposal_text, "Drug X, 300mg SC q4w");
        assert!(state.evidence.is_empty());
        assert!(state.risk_summary.is_none());
        assert!(state.grade.is_none());
        assert!(state.rating.is_none());
        assert!(state.critique.is_none());
        assert_eq!(state.iteration_count, 0);
    }

    #[test]
    fn assessment_fields_land_together() {
        let mut state = ReviewState::new("proposal".to_string());
        state.apply(StageUpdate::Assessed(assessment(Grade::Fail, 4)));
        assert_eq!(state.grade, Some(Grade::Fail));
        assert_eq!(state.rating, Some(4));
        assert_eq!(state.risk_summary.as_deref(), Some("endpoint powering is weak"));
    }

    #[test]
    fn evidence_is_replaced_not_accumulated() {
        let mut state = ReviewState::new("proposal".to_string());
        state.apply(StageUpdate::Evidence(vec!["first".to_string()]));
        state.apply(StageUpdate::Evidence(vec![
            "second".to_string(),
            "third".to_string(),
        ]));
        assert_eq!(state.evidence, vec!["second", "third"]);
    }

    #[test]
    fn rewrite_replaces_proposal_without_touching_other_fields() {
        let mut state = ReviewState::new("original".to_string());
        state.apply(StageUpdate::Assessed(assessment(Grade::Fail, 3)));
        state.apply(StageUpdate::Critiqued("- tighten endpoints".to_string()));
        state.apply(StageUpdate::Rewritten("revised".to_string()));
        assert_eq!(state.proposal_text, "revised");
        assert_eq!(state.rating, Some(3));
        assert_eq!(state.critique.as_deref(), Some("- tighten endpoints"));
    }

    #[test]
    fn iteration_count_only_moves_forward_by_one() {
        let mut state = ReviewState::new("proposal".to_string());
        state.apply(StageUpdate::IterationCompleted);
        assert_eq!(state.iteration_count, 1);
        state.apply(StageUpdate::IterationCompleted);
        assert_eq!(state.iteration_count, 2);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = ReviewState::new("proposal".to_string());
        state.apply(StageUpdate::Assessed(assessment(Grade::Pass, 9)));
        let json = serde_json::to_string(&state).expect("serialize state");
        let back: ReviewState = serde_json::from_str(&json).expect("parse state");
        assert_eq!(back.grade, Some(Grade::Pass));
        assert_eq!(back.rating, Some(9));
    }
}
