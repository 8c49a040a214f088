//! Named prompt strategies and their role instruction sets.
//!
//! Strategies form a closed enumeration: an unknown name is an error at
//! construction time rather than a silent fallback to some default set.
//! The instruction texts ship as markdown assets under `prompts/` and are
//! compiled in.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Prompt templates loaded at compile time
const DEFAULT_RISK_ASSESSMENT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/default/risk_assessment.md"
));
const DEFAULT_RISK_CRITIQUER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/default/risk_critiquer.md"
));
const DEFAULT_PROPOSAL_WRITER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/default/proposal_writer.md"
));
const LANGFLOW_RISK_ASSESSMENT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/langflow/risk_assessment.md"
));
const LANGFLOW_RISK_CRITIQUER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/langflow/risk_critiquer.md"
));
const LANGFLOW_PROPOSAL_WRITER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/langflow/proposal_writer.md"
));
const COMBINED_EVIDENCE_RETRIEVER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/combined/evidence_retriever.md"
));
const COMBINED_RISK_ASSESSMENT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/combined/risk_assessment.md"
));
const COMBINED_RISK_CRITIQUER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/combined/risk_critiquer.md"
));
const COMBINED_PROPOSAL_WRITER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/combined/proposal_writer.md"
));

/// Closed set of prompt strategies a session can run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Short single-paragraph instructions.
    Default,
    /// Tool-centric YAML-schema instructions exported from a Langflow build.
    Langflow,
    /// The merged set covering all four roles.
    Combined,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Default => "default",
            Strategy::Langflow => "langflow",
            Strategy::Combined => "combined",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "default" => Ok(Strategy::Default),
            "langflow" => Ok(Strategy::Langflow),
            "combined" => Ok(Strategy::Combined),
            other => Err(anyhow::anyhow!(
                "unknown strategy {other:?} (expected \"default\", \"langflow\", or \"combined\")"
            )),
        }
    }
}

/// The four role instruction sets the loop's stages use in one session.
#[derive(Debug, Clone, Copy)]
pub struct PromptSet {
    pub evidence_retriever: &'static str,
    pub risk_assessment: &'static str,
    pub risk_critiquer: &'static str,
    pub proposal_writer: &'static str,
}

/// Instruction set for a strategy.
///
/// The default and langflow sources define only the three generation roles;
/// they share the combined evidence-retriever text, which the simulated
/// evidence stage never consumes anyway.
pub fn prompt_set(strategy: Strategy) -> PromptSet {
    match strategy {
        Strategy::Default => PromptSet {
            evidence_retriever: COMBINED_EVIDENCE_RETRIEVER,
            risk_assessment: DEFAULT_RISK_ASSESSMENT,
            risk_critiquer: DEFAULT_RISK_CRITIQUER,
            proposal_writer: DEFAULT_PROPOSAL_WRITER,
        },
        Strategy::Langflow => PromptSet {
            evidence_retriever: COMBINED_EVIDENCE_RETRIEVER,
            risk_assessment: LANGFLOW_RISK_ASSESSMENT,
            risk_critiquer: LANGFLOW_RISK_CRITIQUER,
            proposal_writer: LANGFLOW_PROPOSAL_WRITER,
        },
        Strategy::Combined => PromptSet {
            evidence_retriever: COMBINED_EVIDENCE_RETRIEVER,
            risk_assessment: COMBINED_RISK_ASSESSMENT,
            risk_critiquer: COMBINED_RISK_CRITIQUER,
            proposal_writer: COMBINED_PROPOSAL_WRITER,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_parse() {
        assert_eq!("default".parse::<Strategy>().unwrap(), Strategy::Default);
        assert_eq!("langflow".parse::<Strategy>().unwrap(), Strategy::Langflow);
        assert_eq!("combined".parse::<Strategy>().unwrap(), Strategy::Combined);
    }

    #[test]
    fn unknown_name_is_a_construction_error() {
        let err = "bogus".parse::<Strategy>().unwrap_err();
        assert!(err.to_string().contains("unknown strategy"));
    }

    #[test]
    fn every_strategy_has_all_four_roles() {
        for strategy in [Strategy::Default, Strategy::Langflow, Strategy::Combined] {
            let prompts = prompt_set(strategy);
            assert!(!prompts.evidence_retriever.trim().is_empty());
            assert!(!prompts.risk_assessment.trim().is_empty());
            assert!(!prompts.risk_critiquer.trim().is_empty());
            assert!(!prompts.proposal_writer.trim().is_empty());
        }
    }

    #[test]
    fn strategies_do_not_share_assessment_instructions() {
        let default = prompt_set(Strategy::Default);
        let langflow = prompt_set(Strategy::Langflow);
        let combined = prompt_set(Strategy::Combined);
        assert_ne!(default.risk_assessment, langflow.risk_assessment);
        assert_ne!(default.risk_assessment, combined.risk_assessment);
        assert_ne!(langflow.risk_assessment, combined.risk_assessment);
    }

    #[test]
    fn config_names_round_trip_through_serde() {
        let json = serde_json::to_string(&Strategy::Langflow).unwrap();
        assert_eq!(json, "\"langflow\"");
        let back: Strategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Strategy::Langflow);
    }
}
