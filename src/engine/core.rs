//! The forward-chaining fixed-point loop.
//!
//! Grounded on the upstream `RustRuleEngine::execute_with_callback` cycle
//! loop (salience-sorted rules, evaluate-then-fire, repeat until no rule
//! fires) generalized from attribute/action rules over `Facts` to
//! condition/conclusion rules over compound terms, joined via unification
//! and indexed per [`crate::store::RuleStore::candidates_for`] instead of a
//! linear scan.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::justification::JustificationGraph;
use crate::store::{Conclusion, Fact, FactId, FactStore, Provenance, Rule, RuleKind, RuleStore};
use crate::term::{unify, Binding, Term};

#[derive(Debug, Clone)]
pub struct ContradictionEvent {
    pub rule: String,
    pub binding: Binding,
    pub fact_ids: (FactId, FactId),
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A single item of pending work: either a newly-admitted fact to join
/// against existing rules, or a newly-installed rule to join (cold) against
/// existing facts.
enum WorkItem {
    Fact(FactId),
    Rule(String),
}

/// Owns the entire reasoning state. Every method that mutates state runs the
/// loop to a fixed point before returning, so callers always observe a
/// settled knowledge base — see the single-writer contract in
/// [`crate::engine::handle`].
pub struct Engine {
    pub facts: FactStore,
    pub rules: RuleStore,
    pub justifications: JustificationGraph,
    pub contradictions: Vec<ContradictionEvent>,
    queue: VecDeque<WorkItem>,
}

pub struct AssertOutcome {
    pub fact_id: FactId,
    pub admitted: bool,
}

impl Engine {
    pub fn new(max_facts: usize) -> Self {
        Self {
            facts: FactStore::new(max_facts),
            rules: RuleStore::new(),
            justifications: JustificationGraph::new(),
            contradictions: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Assert a ground term and run the engine to fixed point.
    pub fn assert_fact(
        &mut self,
        term: Term,
        confidence: f64,
        provenance: Option<Provenance>,
    ) -> Result<AssertOutcome> {
        if !term.is_ground() {
            return Err(EngineError::bad_request("assertion must be ground"));
        }
        let result = self.facts.admit(term, true, confidence, provenance)?;
        if result.is_new {
            self.justifications.add_explicit(result.id);
            self.queue.push_back(WorkItem::Fact(result.id));
            self.run_to_fixed_point();
        }
        Ok(AssertOutcome { fact_id: result.id, admitted: true })
    }

    /// Retract a fact and cascade truth maintenance. Returns every fact id
    /// actually retracted (the target plus its transitive dependents).
    pub fn retract(&mut self, id: FactId) -> Result<Vec<FactId>> {
        if self.facts.get(id).is_none() {
            return Err(EngineError::not_found(format!("fact {id}")));
        }
        let live = self.live_ids();
        let cascade = self.justifications.cascade(id, &live);
        for dead in &cascade {
            self.facts.retract(*dead);
            self.justifications.remove_justifications(*dead);
        }
        info!(fact_id = %id, cascade_len = cascade.len(), "retracted fact with cascade");
        Ok(cascade)
    }

    /// Install or replace a rule, then run it cold against existing facts.
    /// Replacing a rule invalidates justifications that name it; any fact
    /// left without a valid justification is retracted.
    pub fn load_rule(&mut self, rule: Rule) -> Result<()> {
        if !rule.conclusion_is_closed() {
            return Err(EngineError::bad_request(format!(
                "rule {} has unbound variables in its conclusion",
                rule.name
            )));
        }
        let name = rule.name.clone();
        self.rules.insert(rule);

        let live = self.live_ids();
        let orphaned = self.justifications.remove_by_rule(&name, &live);
        for fact in orphaned {
            self.facts.retract(fact);
            self.justifications.remove_justifications(fact);
        }

        self.queue.push_back(WorkItem::Rule(name));
        self.run_to_fixed_point();
        Ok(())
    }

    fn live_ids(&self) -> HashSet<FactId> {
        // This crate does not maintain a standing "all live facts" set
        // outside the store; derive it from indices by asking the store for
        // every distinct head it knows about would be wasteful, so instead
        // the cascade algorithm only ever needs liveness of ids it already
        // holds references to. We approximate the full live set lazily from
        // the justification graph's own fact registrations plus the store.
        self.facts.live_ids()
    }

    fn run_to_fixed_point(&mut self) {
        let mut iterations = 0usize;
        while let Some(item) = self.queue.pop_front() {
            iterations += 1;
            match item {
                WorkItem::Fact(fact_id) => self.propagate_fact(fact_id),
                WorkItem::Rule(name) => self.propagate_rule(&name),
            }
        }
        debug!(iterations, "engine reached fixed point");
    }

    /// Semi-naive join: `fact_id` must be used as at least one premise of
    /// every activation considered here, guaranteeing no activation already
    /// evaluated in a prior pass is repeated.
    fn propagate_fact(&mut self, fact_id: FactId) {
        let Some(fact) = self.facts.get(fact_id) else { return };
        let Some((functor, arity)) = fact.term.head() else { return };
        let functor = functor.to_string();

        let candidate_rules: Vec<Rule> = self
            .rules
            .candidates_for(&functor, arity)
            .into_iter()
            .cloned()
            .collect();

        for rule in candidate_rules {
            for (slot, pattern) in rule.condition.iter().enumerate() {
                if pattern.head() != Some((functor.as_str(), arity)) {
                    continue;
                }
                let Some(binding) = unify(pattern, &fact.term, &Binding::new()) else { continue };
                let mut premises = vec![None; rule.condition.len()];
                premises[slot] = Some(fact_id);
                self.extend_join(&rule, slot, premises, binding);
            }
        }
    }

    /// Cold join: evaluate `rule_name` against all currently live facts.
    fn propagate_rule(&mut self, rule_name: &str) {
        let Some(rule) = self.rules.get(rule_name).cloned() else { return };
        if rule.condition.is_empty() {
            self.fire(&rule, Vec::new(), Binding::new());
            return;
        }
        let premises = vec![None; rule.condition.len()];
        self.extend_join(&rule, usize::MAX, premises, Binding::new());
    }

    /// Recursively extend a partial join across the remaining condition
    /// patterns of `rule`, skipping `fixed_slot` (already bound to the
    /// triggering fact in the semi-naive case). `premises` is indexed by
    /// condition-pattern position so the final premise list preserves
    /// condition order regardless of join order.
    fn extend_join(
        &mut self,
        rule: &Rule,
        fixed_slot: usize,
        premises: Vec<Option<FactId>>,
        binding: Binding,
    ) {
        self.extend_join_from(rule, fixed_slot, 0, premises, binding);
    }

    fn extend_join_from(
        &mut self,
        rule: &Rule,
        fixed_slot: usize,
        pattern_index: usize,
        premises: Vec<Option<FactId>>,
        binding: Binding,
    ) {
        if pattern_index == rule.condition.len() {
            let Some(resolved) = premises.into_iter().collect::<Option<Vec<_>>>() else { return };
            self.fire(rule, resolved, binding);
            return;
        }
        if pattern_index == fixed_slot {
            // already satisfied by the fact that triggered this join.
            self.extend_join_from(rule, fixed_slot, pattern_index + 1, premises, binding);
            return;
        }
        let pattern = &rule.condition[pattern_index];
        let Some((functor, arity)) = pattern.head() else { return };
        for candidate in self.facts.lookup(functor, arity) {
            let Some(fact) = self.facts.get(candidate) else { continue };
            let Some(extended) = unify(pattern, &fact.term, &binding) else { continue };
            let mut next_premises = premises.clone();
            next_premises[pattern_index] = Some(candidate);
            self.extend_join_from(rule, fixed_slot, pattern_index + 1, next_premises, extended);
        }
    }

    fn fire(&mut self, rule: &Rule, premises: Vec<FactId>, binding: Binding) {
        match &rule.conclusion {
            Conclusion::Contradiction => {
                if premises.len() == 2 {
                    self.contradictions.push(ContradictionEvent {
                        rule: rule.name.clone(),
                        binding,
                        fact_ids: (premises[0], premises[1]),
                        timestamp: chrono::Utc::now(),
                    });
                    warn!(rule = %rule.name, "disjointness contradiction recorded");
                }
            }
            Conclusion::Derive(template) => {
                self.derive_one(rule, &premises, &binding, template);
            }
        }
    }

    fn derive_one(&mut self, rule: &Rule, premises: &[FactId], binding: &Binding, template: &Term) {
        let conclusion = template.substitute(binding);
        if !conclusion.is_ground() {
            warn!(rule = %rule.name, "skipped activation: conclusion under-bound");
            return;
        }
        let Ok(result) = self.facts.admit(conclusion, false, 1.0, None) else {
            warn!(rule = %rule.name, "skipped derivation: capacity exhausted");
            return;
        };
        let added = self.justifications.add_logical(
            result.id,
            rule.name.clone(),
            premises.to_vec(),
            binding.clone(),
        );
        if added.is_some() && result.is_new {
            self.queue.push_back(WorkItem::Fact(result.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RuleKind;

    fn chain_engine() -> Engine {
        let mut engine = Engine::new(10_000);
        engine
            .load_rule(Rule {
                name: "chain_contains".to_string(),
                kind: RuleKind::Chain,
                condition: vec![
                    Term::compound("hasComponent", vec![Term::var("x"), Term::var("y")]),
                    Term::compound("partOf", vec![Term::var("y"), Term::var("z")]),
                ],
                conclusion: Conclusion::Derive(Term::compound(
                    "contains",
                    vec![Term::var("x"), Term::var("z")],
                )),
                priority: 0,
            })
            .unwrap();
        engine
    }

    #[test]
    fn scenario_s1_chain_rule_derives_contains() {
        let mut engine = chain_engine();
        engine
            .assert_fact(Term::compound("hasComponent", vec![Term::atom("a"), Term::atom("b")]), 1.0, None)
            .unwrap();
        engine
            .assert_fact(Term::compound("partOf", vec![Term::atom("b"), Term::atom("c")]), 1.0, None)
            .unwrap();

        let contains_facts = engine.facts.lookup("contains", 2);
        assert_eq!(contains_facts.len(), 1);
        let fact = engine.facts.get(contains_facts[0]).unwrap();
        assert_eq!(fact.term, Term::compound("contains", vec![Term::atom("a"), Term::atom("c")]));

        let justs = engine.justifications.get(contains_facts[0]);
        assert_eq!(justs.len(), 1);
        assert_eq!(justs[0].rule.as_deref(), Some("chain_contains"));
        assert_eq!(justs[0].premises.len(), 2);
    }

    #[test]
    fn scenario_s4_retracting_premise_cascades_to_derived_fact() {
        let mut engine = chain_engine();
        let hc = engine
            .assert_fact(Term::compound("hasComponent", vec![Term::atom("a"), Term::atom("b")]), 1.0, None)
            .unwrap();
        engine
            .assert_fact(Term::compound("partOf", vec![Term::atom("b"), Term::atom("c")]), 1.0, None)
            .unwrap();
        assert_eq!(engine.facts.lookup("contains", 2).len(), 1);

        engine.retract(hc.fact_id).unwrap();

        assert_eq!(engine.facts.lookup("contains", 2).len(), 0);
        assert_eq!(engine.facts.lookup("partOf", 2).len(), 1);
    }

    #[test]
    fn scenario_s2_inverse_and_transitive_rules_compose() {
        let mut engine = Engine::new(10_000);
        engine
            .load_rule(Rule {
                name: "transitive_parentOf".to_string(),
                kind: RuleKind::Transitivity,
                condition: vec![
                    Term::compound("parentOf", vec![Term::var("x"), Term::var("y")]),
                    Term::compound("parentOf", vec![Term::var("y"), Term::var("z")]),
                ],
                conclusion: Conclusion::Derive(Term::compound(
                    "parentOf",
                    vec![Term::var("x"), Term::var("z")],
                )),
                priority: 0,
            })
            .unwrap();
        engine
            .load_rule(Rule {
                name: "inverse_parentOf_childOf".to_string(),
                kind: RuleKind::Inverse,
                condition: vec![Term::compound("parentOf", vec![Term::var("x"), Term::var("y")])],
                conclusion: Conclusion::Derive(Term::compound(
                    "childOf",
                    vec![Term::var("y"), Term::var("x")],
                )),
                priority: 0,
            })
            .unwrap();

        engine
            .assert_fact(Term::compound("parentOf", vec![Term::atom("a"), Term::atom("b")]), 1.0, None)
            .unwrap();
        engine
            .assert_fact(Term::compound("parentOf", vec![Term::atom("b"), Term::atom("c")]), 1.0, None)
            .unwrap();

        assert_eq!(engine.facts.lookup("parentOf", 2).len(), 3);
        let child_of_facts: Vec<_> = engine
            .facts
            .lookup("childOf", 2)
            .iter()
            .map(|id| engine.facts.get(*id).unwrap().term.clone())
            .collect();
        assert!(child_of_facts.contains(&Term::compound("childOf", vec![Term::atom("b"), Term::atom("a")])));
        assert!(child_of_facts.contains(&Term::compound("childOf", vec![Term::atom("c"), Term::atom("b")])));
        assert!(child_of_facts.contains(&Term::compound("childOf", vec![Term::atom("c"), Term::atom("a")])));
    }

    #[test]
    fn scenario_s3_disjointness_records_contradiction_without_new_fact() {
        let mut engine = Engine::new(10_000);
        engine
            .load_rule(Rule {
                name: "disjoint_cat_dog".to_string(),
                kind: RuleKind::DisjointnessConstraint,
                condition: vec![
                    Term::compound("isa", vec![Term::var("x"), Term::atom("Cat")]),
                    Term::compound("isa", vec![Term::var("x"), Term::atom("Dog")]),
                ],
                conclusion: Conclusion::Contradiction,
                priority: 0,
            })
            .unwrap();

        engine.assert_fact(Term::compound("isa", vec![Term::atom("x"), Term::atom("Cat")]), 1.0, None).unwrap();
        engine.assert_fact(Term::compound("isa", vec![Term::atom("x"), Term::atom("Dog")]), 1.0, None).unwrap();

        assert_eq!(engine.contradictions.len(), 1);
        assert_eq!(engine.contradictions[0].rule, "disjoint_cat_dog");
        assert_eq!(engine.facts.lookup("isa", 2).len(), 2);
    }

    #[test]
    fn asserting_same_fact_twice_is_idempotent() {
        let mut engine = chain_engine();
        let term = Term::compound("hasComponent", vec![Term::atom("a"), Term::atom("b")]);
        let first = engine.assert_fact(term.clone(), 1.0, None).unwrap();
        let second = engine.assert_fact(term, 1.0, None).unwrap();
        assert_eq!(first.fact_id, second.fact_id);
    }
}
