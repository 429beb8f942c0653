//! Single-writer engine task and its command inbox.
//!
//! All state mutation is serialized onto one task that exclusively takes
//! the write side of an `RwLock`-guarded [`Engine`]; callers talk to it
//! through a bounded `mpsc` inbox and get their answer back on a `oneshot`.
//! Read-only operations (`query`, `why`, `subgraph`) skip the inbox
//! entirely and take a read lease directly, so concurrent readers never
//! wait on each other and only ever wait as long as one settle takes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::errors::{EngineError, Result};
use crate::query::{QueryEvaluator, QueryFilters, QueryMatch};
use crate::rulepack::{CompileReport, RulePackDocument};
use crate::shapes::ShapeCatalog;
use crate::store::{Fact, FactId, Provenance};
use crate::subgraph::{SubgraphEnvelope, SubgraphExtractor, SubgraphRequest};
use crate::term::Term;

use super::core::{AssertOutcome, ContradictionEvent, Engine};

enum Command {
    AssertBatch {
        items: Vec<(Term, f64, Option<Provenance>)>,
        reply: oneshot::Sender<Vec<Result<AssertOutcome>>>,
    },
    Retract {
        id: FactId,
        reply: oneshot::Sender<Result<Vec<FactId>>>,
    },
    LoadRulePack {
        doc: RulePackDocument,
        reply: oneshot::Sender<Result<CompileReport>>,
    },
    LoadShapes {
        catalog: ShapeCatalog,
        reply: oneshot::Sender<()>,
    },
    RuleStats {
        reply: oneshot::Sender<HashMap<&'static str, usize>>,
    },
    Contradictions {
        reply: oneshot::Sender<Vec<ContradictionEvent>>,
    },
}

#[derive(Clone)]
pub struct EngineHandle {
    inbox: mpsc::Sender<Command>,
    state: Arc<RwLock<Engine>>,
    shapes: Arc<RwLock<ShapeCatalog>>,
}

impl EngineHandle {
    pub fn spawn(max_facts: usize, shapes: ShapeCatalog) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(1024);
        let state = Arc::new(RwLock::new(Engine::new(max_facts)));
        let shapes = Arc::new(RwLock::new(shapes));
        let state_for_task = state.clone();
        let shapes_for_task = shapes.clone();

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::AssertBatch { items, reply } => {
                        let mut engine = state_for_task.write().await;
                        let outcomes = items
                            .into_iter()
                            .map(|(term, confidence, provenance)| engine.assert_fact(term, confidence, provenance))
                            .collect();
                        let _ = reply.send(outcomes);
                    }
                    Command::Retract { id, reply } => {
                        let mut engine = state_for_task.write().await;
                        let _ = reply.send(engine.retract(id));
                    }
                    Command::LoadRulePack { doc, reply } => {
                        let (rules, report) = crate::rulepack::compile(&doc);
                        let mut engine = state_for_task.write().await;
                        let mut result = Ok(report);
                        for rule in rules {
                            if let Err(e) = engine.load_rule(rule) {
                                result = Err(e);
                                break;
                            }
                        }
                        let _ = reply.send(result);
                    }
                    Command::LoadShapes { catalog, reply } => {
                        *shapes_for_task.write().await = catalog;
                        let _ = reply.send(());
                    }
                    Command::RuleStats { reply } => {
                        let engine = state_for_task.read().await;
                        let _ = reply.send(engine.rules.count_by_kind());
                    }
                    Command::Contradictions { reply } => {
                        let engine = state_for_task.read().await;
                        let _ = reply.send(engine.contradictions.clone());
                    }
                }
            }
        });

        Self { inbox: tx, state, shapes }
    }

    pub async fn assert_batch(
        &self,
        items: Vec<(Term, f64, Option<Provenance>)>,
    ) -> Result<Vec<Result<AssertOutcome>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Command::AssertBatch { items, reply: reply_tx })
            .await
            .map_err(|_| EngineError::internal("engine task has shut down"))?;
        reply_rx.await.map_err(|_| EngineError::internal("engine task dropped reply"))
    }

    pub async fn retract(&self, id: FactId) -> Result<Vec<FactId>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Command::Retract { id, reply: reply_tx })
            .await
            .map_err(|_| EngineError::internal("engine task has shut down"))?;
        reply_rx.await.map_err(|_| EngineError::internal("engine task dropped reply"))?
    }

    pub async fn load_rule_pack(&self, doc: RulePackDocument) -> Result<CompileReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Command::LoadRulePack { doc, reply: reply_tx })
            .await
            .map_err(|_| EngineError::internal("engine task has shut down"))?;
        reply_rx.await.map_err(|_| EngineError::internal("engine task dropped reply"))?
    }

    pub async fn load_shapes(&self, catalog: ShapeCatalog) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Command::LoadShapes { catalog, reply: reply_tx })
            .await
            .map_err(|_| EngineError::internal("engine task has shut down"))?;
        reply_rx.await.map_err(|_| EngineError::internal("engine task dropped reply"))
    }

    pub async fn rule_stats(&self) -> Result<HashMap<&'static str, usize>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Command::RuleStats { reply: reply_tx })
            .await
            .map_err(|_| EngineError::internal("engine task has shut down"))?;
        reply_rx.await.map_err(|_| EngineError::internal("engine task dropped reply"))
    }

    pub async fn contradictions(&self) -> Result<Vec<ContradictionEvent>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Command::Contradictions { reply: reply_tx })
            .await
            .map_err(|_| EngineError::internal("engine task has shut down"))?;
        reply_rx.await.map_err(|_| EngineError::internal("engine task dropped reply"))
    }

    /// Reads take a read lease directly against the shared state instead of
    /// going through the inbox, so they never queue behind other readers.
    pub async fn query(&self, pattern: &Term, filters: &QueryFilters) -> Vec<QueryMatch> {
        let engine = self.state.read().await;
        QueryEvaluator::run(&engine.facts, &engine.justifications, pattern, filters)
    }

    pub async fn get_fact(&self, id: FactId) -> Option<Fact> {
        let engine = self.state.read().await;
        engine.facts.get(id).cloned()
    }

    pub async fn justifications_for(&self, id: FactId) -> Vec<crate::justification::JustificationRecord> {
        let engine = self.state.read().await;
        engine.justifications.get(id).into_iter().cloned().collect()
    }

    pub async fn subgraph(&self, req: &SubgraphRequest) -> SubgraphEnvelope {
        let engine = self.state.read().await;
        SubgraphExtractor::extract(&engine.facts, req)
    }

    /// Validate a would-be `(subject, predicate, object)` assertion against
    /// the shape catalog, deriving the subject's known types and existing
    /// property values from currently live binary facts.
    pub async fn validate(&self, subject: &str, predicate: &str, object: &Term) -> crate::shapes::ValidationReport {
        let engine = self.state.read().await;
        let mut types: Vec<String> = Vec::new();
        let mut properties: HashMap<String, Vec<Term>> = HashMap::new();
        let mut object_types: Vec<String> = Vec::new();
        let object_name = if let Term::Atom(name) = object { Some(name.to_string()) } else { None };
        for id in engine.facts.all_live_sorted() {
            let Some(fact) = engine.facts.get(id) else { continue };
            let Term::Compound(functor, args) = &fact.term else { continue };
            if args.len() != 2 {
                continue;
            }
            let Term::Atom(s) = &args[0] else { continue };
            if functor.as_ref() == "isa" {
                if let Term::Atom(t) = &args[1] {
                    if s.as_ref() == subject {
                        types.push(t.to_string());
                    }
                    if Some(s.as_ref()) == object_name.as_deref() {
                        object_types.push(t.to_string());
                    }
                }
            } else if s.as_ref() == subject {
                properties.entry(functor.to_string()).or_default().push(args[1].clone());
            }
        }
        drop(engine);

        let catalog = self.shapes.read().await;
        let props_refs: HashMap<&str, Vec<&Term>> =
            properties.iter().map(|(k, v)| (k.as_str(), v.iter().collect())).collect();
        let view = crate::shapes::SubjectView {
            subject,
            types: types.iter().map(|s| s.as_str()).collect(),
            properties: props_refs,
        };
        let object_type_refs: Vec<&str> = object_types.iter().map(|s| s.as_str()).collect();
        catalog.validate_assertion(&view, predicate, object, &object_type_refs)
    }

    /// The full `why` proof-tree explanation for one fact.
    pub async fn why(&self, id: FactId, max_depth: u32) -> Option<crate::proof::WhyResult> {
        let engine = self.state.read().await;
        crate::proof::explain(&engine.facts, &engine.justifications, id, max_depth)
    }

    pub async fn render_subgraph_svg(&self, renderer_command: &str, req: &SubgraphRequest) -> Result<Vec<u8>> {
        let envelope = self.subgraph(req).await;
        crate::render::render_svg(renderer_command, &envelope).await
    }

    pub async fn health(&self) -> (usize, usize) {
        let engine = self.state.read().await;
        (engine.facts.live_count(), engine.rules.len())
    }
}
