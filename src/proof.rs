//! Builds the `why` response: the justification summary for one fact plus
//! a bounded-depth proof tree walking premises back to their own
//! justifications.

use std::collections::HashSet;

use serde::Serialize;

use crate::justification::JustificationGraph;
use crate::store::{FactId, FactStore};

#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceView {
    pub source: Option<String>,
    pub doc_id: Option<String>,
    pub span: Option<String>,
    pub extractor: Option<String>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProofNode {
    pub fact_id: u64,
    pub term: String,
    pub rule: Option<String>,
    pub premises: Vec<ProofNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhyResult {
    pub node_id: u64,
    pub rules: Vec<String>,
    pub supports: Vec<u64>,
    pub provenance: Option<ProvenanceView>,
    pub proof_tree: Option<ProofNode>,
    pub has_proof: bool,
}

pub fn explain(
    facts: &FactStore,
    justifications: &JustificationGraph,
    fact_id: FactId,
    max_depth: u32,
) -> Option<WhyResult> {
    let fact = facts.get_any(fact_id)?;
    let justs = justifications.get(fact_id);
    let rules: Vec<String> = justs.iter().filter_map(|j| j.rule.clone()).collect();
    let supports: Vec<u64> = justs.iter().flat_map(|j| j.premises.iter().map(FactId::get)).collect();
    let provenance = fact.provenance.as_ref().map(|p| ProvenanceView {
        source: p.source.clone(),
        doc_id: p.doc_id.clone(),
        span: p.span.clone(),
        extractor: p.extractor.clone(),
        model_version: p.model_version.clone(),
    });
    let has_proof = !justs.is_empty();

    let mut on_path = HashSet::new();
    let proof_tree = build_tree(facts, justifications, fact_id, max_depth, &mut on_path);

    Some(WhyResult { node_id: fact_id.get(), rules, supports, provenance, proof_tree, has_proof })
}

/// Depth-bounded recursive descent through the justification graph. Guards
/// against a justification cycle (shouldn't occur given
/// [`JustificationGraph::add_logical`]'s self-support rejection, but a
/// cross-fact cycle is not itself ruled out) by tracking the path.
fn build_tree(
    facts: &FactStore,
    justifications: &JustificationGraph,
    fact_id: FactId,
    depth_remaining: u32,
    on_path: &mut HashSet<FactId>,
) -> Option<ProofNode> {
    let fact = facts.get_any(fact_id)?;
    let term = fact.term.to_string();

    if depth_remaining == 0 || !on_path.insert(fact_id) {
        return Some(ProofNode { fact_id: fact_id.get(), term, rule: None, premises: Vec::new() });
    }

    let justs = justifications.get(fact_id);
    let (rule, premises) = match justs.first() {
        Some(j) => {
            let premises = j
                .premises
                .iter()
                .filter_map(|p| build_tree(facts, justifications, *p, depth_remaining - 1, on_path))
                .collect();
            (j.rule.clone(), premises)
        }
        None => (None, Vec::new()),
    };

    on_path.remove(&fact_id);
    Some(ProofNode { fact_id: fact_id.get(), term, rule, premises })
}
