//! Evidence collaborator: precedent snippets for a proposal.
//!
//! The loop treats retrieval as an opaque enrichment step behind
//! `EvidenceSource`. The shipped implementation is a simulated precedent
//! library standing in for a real vector-store search over FDA BLA reviews
//! and trial summaries. Evidence is fetched fresh on every pass and
//! replaces the previous list; it is deliberately not accumulated across
//! iterations.

use anyhow::Result;

/// Precedent lookup for a proposal. Ordering is retrieval order and carries
/// no significance to the loop.
pub trait EvidenceSource {
    fn retrieve(&self, proposal_text: &str) -> Result<Vec<String>>;
}

/// Simulated retrieval returning fixed precedent outcomes that match the
/// mechanism/indication space of mAb respiratory proposals.
pub struct PrecedentLibrary;

impl EvidenceSource for PrecedentLibrary {
    fn retrieve(&self, _proposal_text: &str) -> Result<Vec<String>> {
        Ok(vec![
            "Lebrikizumab failed Phase 3 for asthma (NCT02918071) due to weak correlation \
             of AER with symptom control."
                .to_string(),
            "Dupilumab succeeded in similar eosinophilic population with endpoint of FEV1 + \
             biomarker stratification (BLA761469)."
                .to_string(),
        ])
    }
}
