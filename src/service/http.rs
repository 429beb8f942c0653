//! The JSON/HTTP bridge: an `axum` `Router` over [`super::AppState`],
//! built the way the engine's own REST demonstrations are built — typed
//! `State`, `tower-http` CORS, JSON bodies, `tracing` spans per request.

use std::collections::{BTreeMap, HashMap, HashSet};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::errors::{EngineError, ErrorKind};
use crate::query::QueryFilters;
use crate::store::{FactId, Provenance};
use crate::subgraph::{FocusSpec, SubgraphRequest};
use crate::term::Term;

use super::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/assert", post(assert_handler))
        .route("/retract", post(retract_handler))
        .route("/query", get(query_handler))
        .route("/why", get(why_handler))
        .route("/subgraph", get(subgraph_handler))
        .route("/render", get(render_handler))
        .route("/rules/load", post(rules_load_handler))
        .route("/rules/stat", get(rules_stat_handler))
        .route("/contradictions", get(contradictions_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wraps [`EngineError`] for the `IntoResponse` impl; the bridge is the
/// only layer allowed to flatten an engine error into a transport status.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error_kind: ErrorKind,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::BadRequest | ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::CapacityExhausted => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unsupported => StatusCode::NOT_IMPLEMENTED,
        };
        let body = ErrorEnvelope { error_kind: self.0.kind(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (fact_count, rule_count) = state.engine.health().await;
    Json(serde_json::json!({
        "status": "healthy",
        "service": "semnet-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "engine": { "fact_count": fact_count, "rule_count": rule_count },
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProvenanceInput {
    source: Option<String>,
    doc_id: Option<String>,
    span: Option<String>,
    extractor: Option<String>,
    model_version: Option<String>,
}

impl From<ProvenanceInput> for Provenance {
    fn from(p: ProvenanceInput) -> Self {
        Provenance { source: p.source, doc_id: p.doc_id, span: p.span, extractor: p.extractor, model_version: p.model_version }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AssertionInput {
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
    pattern: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    provenance: Option<ProvenanceInput>,
}

impl AssertionInput {
    fn to_term(&self) -> Result<Term, EngineError> {
        if let Some(pattern) = &self.pattern {
            return crate::query::parse_pattern(pattern);
        }
        match (&self.subject, &self.predicate, &self.object) {
            (Some(s), Some(p), Some(o)) => {
                Ok(Term::compound(p.clone(), vec![Term::atom(s.clone()), Term::atom(o.clone())]))
            }
            _ => Err(EngineError::bad_request("assertion needs subject/predicate/object or pattern")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssertRequestBody {
    #[serde(flatten)]
    single: AssertionInput,
    #[serde(default)]
    assertions: Vec<AssertionInput>,
}

#[derive(Serialize)]
struct ValidationSummary {
    conforms: bool,
    violations: Vec<String>,
}

#[derive(Serialize)]
struct AssertResponseItem {
    fact_id: u64,
    admitted: bool,
    validation: ValidationSummary,
}

#[derive(Serialize)]
struct AssertResponse {
    success: bool,
    processed_count: usize,
    items: Vec<AssertResponseItem>,
    errors: Vec<String>,
}

async fn assert_handler(
    State(state): State<AppState>,
    Json(body): Json<AssertRequestBody>,
) -> Result<Json<AssertResponse>, ApiError> {
    let inputs = if body.assertions.is_empty() { vec![body.single] } else { body.assertions };

    let mut response_items = Vec::with_capacity(inputs.len());
    let mut errors = Vec::new();

    for input in inputs {
        let term = match input.to_term() {
            Ok(t) => t,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            }
        };

        if let (Some(subject), Some(predicate), Some(object)) = (&input.subject, &input.predicate, &input.object) {
            let report = state.engine.validate(subject, predicate, &Term::atom(object.clone())).await;
            if !report.conforms {
                let violations: Vec<String> = report.violations.iter().map(|v| v.message.clone()).collect();
                errors.push(format!("validation failed for {subject} {predicate} {object}"));
                response_items.push(AssertResponseItem {
                    fact_id: 0,
                    admitted: false,
                    validation: ValidationSummary { conforms: false, violations },
                });
                continue;
            }
        }

        let confidence = input.confidence.unwrap_or(1.0);
        let provenance = input.provenance.map(Into::into);
        let outcomes = state.engine.assert_batch(vec![(term, confidence, provenance)]).await?;
        match outcomes.into_iter().next() {
            Some(Ok(outcome)) => {
                info!(fact_id = outcome.fact_id.get(), "asserted fact");
                response_items.push(AssertResponseItem {
                    fact_id: outcome.fact_id.get(),
                    admitted: outcome.admitted,
                    validation: ValidationSummary { conforms: true, violations: Vec::new() },
                });
            }
            Some(Err(e)) => errors.push(e.to_string()),
            None => errors.push("engine returned no outcome".to_string()),
        }
    }

    Ok(Json(AssertResponse {
        success: errors.is_empty(),
        processed_count: response_items.len(),
        items: response_items,
        errors,
    }))
}

#[derive(Deserialize)]
struct RetractRequest {
    fact_id: u64,
}

#[derive(Serialize)]
struct RetractResponse {
    retracted_ids: Vec<u64>,
}

async fn retract_handler(
    State(state): State<AppState>,
    Json(req): Json<RetractRequest>,
) -> Result<Json<RetractResponse>, ApiError> {
    let cascade = state.engine.retract(FactId::from_raw(req.fact_id)).await?;
    Ok(Json(RetractResponse { retracted_ids: cascade.iter().map(FactId::get).collect() }))
}

#[derive(Deserialize)]
struct QueryParams {
    pattern: String,
    limit: Option<usize>,
    min_confidence: Option<f64>,
    include_justification: Option<bool>,
}

#[derive(Serialize)]
struct QueryMatchView {
    fact_id: u64,
    bindings: BTreeMap<String, String>,
    confidence: f64,
    justification_summary: Vec<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<QueryMatchView>,
    count: usize,
}

async fn query_handler(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let pattern = crate::query::parse_pattern(&params.pattern)?;
    let limit = params.limit.unwrap_or(state.config.max_query_results).min(state.config.max_query_results);
    let filters = QueryFilters {
        limit,
        min_confidence: params.min_confidence.unwrap_or(0.0),
        include_justification: params.include_justification.unwrap_or(false),
    };
    let matches = state.engine.query(&pattern, &filters).await;
    let results: Vec<QueryMatchView> = matches
        .into_iter()
        .map(|m| QueryMatchView {
            fact_id: m.fact_id.get(),
            bindings: m.binding.to_map(),
            confidence: m.confidence,
            justification_summary: m.justification_summary,
        })
        .collect();
    let count = results.len();
    Ok(Json(QueryResponse { results, count }))
}

#[derive(Deserialize)]
struct WhyParams {
    fact_id: u64,
    max_depth: Option<u32>,
}

async fn why_handler(
    State(state): State<AppState>,
    Query(params): Query<WhyParams>,
) -> Result<Json<crate::proof::WhyResult>, ApiError> {
    let result = state
        .engine
        .why(FactId::from_raw(params.fact_id), params.max_depth.unwrap_or(50))
        .await
        .ok_or_else(|| EngineError::not_found(format!("fact {}", params.fact_id)))?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct SubgraphParams {
    focus: String,
    #[serde(default)]
    radius: Option<u32>,
    #[serde(default)]
    include_edges: Option<String>,
    #[serde(default)]
    exclude_edges: Option<String>,
    #[serde(default)]
    max_nodes: Option<usize>,
    #[serde(default)]
    collapse: Option<bool>,
}

fn parse_focus(raw: &str) -> FocusSpec {
    match raw.parse::<u64>() {
        Ok(n) => FocusSpec::Fact(FactId::from_raw(n)),
        Err(_) => FocusSpec::Atom(raw.to_string()),
    }
}

fn parse_csv_set(raw: &Option<String>) -> Option<HashSet<String>> {
    raw.as_ref().map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
}

fn build_subgraph_request(state: &AppState, params: &SubgraphParams) -> SubgraphRequest {
    SubgraphRequest {
        focus: parse_focus(&params.focus),
        radius: params.radius.unwrap_or(2).min(state.config.max_radius),
        include_edges: parse_csv_set(&params.include_edges),
        exclude_edges: parse_csv_set(&params.exclude_edges),
        max_nodes: params.max_nodes.unwrap_or(state.config.max_subgraph_nodes).min(state.config.max_subgraph_nodes),
        collapse: params.collapse.unwrap_or(true),
    }
}

async fn subgraph_handler(
    State(state): State<AppState>,
    Query(params): Query<SubgraphParams>,
) -> impl IntoResponse {
    let req = build_subgraph_request(&state, &params);
    Json(state.engine.subgraph(&req).await)
}

async fn render_handler(State(state): State<AppState>, Query(params): Query<RenderParams>) -> Response {
    let subgraph_params = SubgraphParams {
        focus: params.focus,
        radius: params.radius,
        include_edges: params.include_edges,
        exclude_edges: params.exclude_edges,
        max_nodes: params.max_nodes,
        collapse: params.collapse,
    };
    let req = build_subgraph_request(&state, &subgraph_params);

    if params.format.as_deref() != Some("svg") {
        return Json(state.engine.subgraph(&req).await).into_response();
    }

    let Some(command) = state.config.renderer_command.as_deref() else {
        return ApiError(EngineError::unsupported("no renderer_command configured")).into_response();
    };
    match state.engine.render_subgraph_svg(command, &req).await {
        Ok(bytes) => ([("content-type", "image/svg+xml")], bytes).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Deserialize)]
struct RenderParams {
    focus: String,
    radius: Option<u32>,
    include_edges: Option<String>,
    exclude_edges: Option<String>,
    max_nodes: Option<usize>,
    collapse: Option<bool>,
    format: Option<String>,
}

async fn rules_load_handler(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<crate::rulepack::CompileReport>, ApiError> {
    if body.len() > state.config.max_rule_pack_bytes {
        return Err(EngineError::capacity_exhausted("rule pack bytes").into());
    }
    let text = std::str::from_utf8(&body).map_err(|_| EngineError::bad_request("rule pack is not valid UTF-8"))?;
    let doc = crate::rulepack::parse_document(text, false).or_else(|_| crate::rulepack::parse_document(text, true))?;
    let report = state.engine.load_rule_pack(doc).await?;
    Ok(Json(report))
}

#[derive(Serialize)]
struct RuleStatResponse {
    total: usize,
    by_kind: HashMap<&'static str, usize>,
}

async fn rules_stat_handler(State(state): State<AppState>) -> Result<Json<RuleStatResponse>, ApiError> {
    let by_kind = state.engine.rule_stats().await?;
    let total = by_kind.values().sum();
    Ok(Json(RuleStatResponse { total, by_kind }))
}

#[derive(Serialize)]
struct ContradictionsResponse {
    events: Vec<ContradictionView>,
    count: usize,
}

#[derive(Serialize)]
struct ContradictionView {
    rule: String,
    binding: BTreeMap<String, String>,
    fact_ids: (u64, u64),
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn contradictions_handler(State(state): State<AppState>) -> Result<Json<ContradictionsResponse>, ApiError> {
    let events = state.engine.contradictions().await?;
    let events: Vec<ContradictionView> = events
        .into_iter()
        .map(|e| ContradictionView {
            rule: e.rule,
            binding: e.binding.to_map(),
            fact_ids: (e.fact_ids.0.get(), e.fact_ids.1.get()),
            timestamp: e.timestamp,
        })
        .collect();
    let count = events.len();
    Ok(Json(ContradictionsResponse { events, count }))
}
