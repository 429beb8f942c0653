//! The gRPC bridge: a `tonic`-generated `Semnet` service impl dispatching
//! to the same [`EngineHandle`] the HTTP bridge uses. Narrower than the
//! HTTP surface by design — core read/write/explain only, no
//! retract/subgraph/rules/contradictions/render here.

use std::collections::HashMap;

use tonic::{Request, Response, Status};

use crate::errors::EngineError;
use crate::query::QueryFilters;
use crate::store::{FactId, Provenance};
use crate::term::Term;

use super::AppState;

pub mod pb {
    tonic::include_proto!("semnet");
}

use pb::semnet_server::Semnet;
use pb::{
    AssertItem, AssertReply, AssertRequest, Binding as PbBinding, HealthReply, HealthRequest,
    JustificationNode, Match, QueryReply, QueryRequest, WhyReply, WhyRequest,
};

pub struct SemnetService {
    state: AppState,
}

impl SemnetService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

fn to_status(err: EngineError) -> Status {
    use crate::errors::ErrorKind::*;
    let message = err.to_string();
    match err.kind() {
        BadRequest | ValidationFailed => Status::invalid_argument(message),
        NotFound => Status::not_found(message),
        CapacityExhausted => Status::resource_exhausted(message),
        Cancelled => Status::cancelled(message),
        Unsupported => Status::unimplemented(message),
        Internal => Status::internal(message),
    }
}

#[tonic::async_trait]
impl Semnet for SemnetService {
    async fn health(&self, _request: Request<HealthRequest>) -> Result<Response<HealthReply>, Status> {
        let (fact_count, rule_count) = self.state.engine.health().await;
        Ok(Response::new(HealthReply {
            status: "healthy".to_string(),
            fact_count: fact_count as u64,
            rule_count: rule_count as u64,
        }))
    }

    async fn assert(&self, request: Request<AssertRequest>) -> Result<Response<AssertReply>, Status> {
        let req = request.into_inner();
        let mut items = Vec::with_capacity(req.assertions.len());

        for assertion in req.assertions {
            let term = Term::compound(
                assertion.predicate.clone(),
                vec![Term::atom(assertion.subject.clone()), Term::atom(assertion.object.clone())],
            );
            let report = self
                .state
                .engine
                .validate(&assertion.subject, &assertion.predicate, &Term::atom(assertion.object.clone()))
                .await;
            if !report.conforms {
                items.push(AssertItem {
                    admitted: false,
                    fact_id: 0,
                    conforms: false,
                    violations: report.violations.iter().map(|v| v.message.clone()).collect(),
                });
                continue;
            }

            let confidence = assertion.confidence.unwrap_or(1.0);
            let outcomes = self
                .state
                .engine
                .assert_batch(vec![(term, confidence, None::<Provenance>)])
                .await
                .map_err(to_status)?;
            match outcomes.into_iter().next() {
                Some(Ok(outcome)) => items.push(AssertItem {
                    admitted: outcome.admitted,
                    fact_id: outcome.fact_id.get(),
                    conforms: true,
                    violations: Vec::new(),
                }),
                Some(Err(e)) => return Err(to_status(e)),
                None => return Err(Status::internal("engine returned no outcome")),
            }
        }

        Ok(Response::new(AssertReply { items }))
    }

    async fn query(&self, request: Request<QueryRequest>) -> Result<Response<QueryReply>, Status> {
        run_query(&self.state, request).await
    }

    async fn search(&self, request: Request<QueryRequest>) -> Result<Response<QueryReply>, Status> {
        run_query(&self.state, request).await
    }

    async fn why(&self, request: Request<WhyRequest>) -> Result<Response<WhyReply>, Status> {
        let req = request.into_inner();
        let max_depth = if req.max_depth == 0 { 50 } else { req.max_depth };
        let result = self.state.engine.why(FactId::from_raw(req.fact_id), max_depth).await;
        match result {
            Some(r) => Ok(Response::new(WhyReply {
                has_proof: r.has_proof,
                proof_tree: r.proof_tree.map(to_pb_node),
            })),
            None => Err(Status::not_found(format!("fact {}", req.fact_id))),
        }
    }
}

async fn run_query(state: &AppState, request: Request<QueryRequest>) -> Result<Response<QueryReply>, Status> {
    let req = request.into_inner();
    let pattern = crate::query::parse_pattern(&req.pattern).map_err(to_status)?;
    let limit = if req.limit == 0 { state.config.max_query_results } else { (req.limit as usize).min(state.config.max_query_results) };
    let filters = QueryFilters {
        limit,
        min_confidence: req.min_confidence,
        include_justification: req.include_justification,
    };
    let matches = state.engine.query(&pattern, &filters).await;
    let count = matches.len() as u32;
    let results = matches
        .into_iter()
        .map(|m| Match {
            fact_id: m.fact_id.get(),
            bindings: Some(PbBinding { values: m.binding.to_map().into_iter().collect::<HashMap<_, _>>() }),
            confidence: m.confidence,
            justification_summary: m.justification_summary,
        })
        .collect();
    Ok(Response::new(QueryReply { results, count }))
}

fn to_pb_node(node: crate::proof::ProofNode) -> JustificationNode {
    JustificationNode {
        fact_id: node.fact_id,
        term: node.term,
        rule: node.rule.unwrap_or_default(),
        premises: node.premises.into_iter().map(to_pb_node).collect(),
    }
}
