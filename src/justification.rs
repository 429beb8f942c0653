//! Justification graph and truth maintenance.
//!
//! Ported from the upstream `TruthMaintenanceSystem`: a justification maps a
//! derived fact to the rule and premises that produced it, and a reverse
//! index ("dependents") lets retraction cascade without walking the whole
//! fact store.

use std::collections::{HashMap, HashSet};

use crate::store::FactId;
use crate::term::Binding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustificationKind {
    /// The fact was injected from outside; it has no premises and is never
    /// cascade-retracted.
    Explicit,
    /// The fact was derived by a rule from other live facts.
    Logical,
}

#[derive(Debug, Clone)]
pub struct JustificationRecord {
    pub id: u64,
    pub fact: FactId,
    pub kind: JustificationKind,
    pub rule: Option<String>,
    pub premises: Vec<FactId>,
    pub binding: Binding,
}

impl JustificationRecord {
    /// A justification is valid as long as every one of its premises is
    /// still present in `live`. An explicit justification (no premises)
    /// is vacuously always valid.
    pub fn is_valid(&self, live: &HashSet<FactId>) -> bool {
        self.premises.iter().all(|p| live.contains(p))
    }
}

#[derive(Debug, Default)]
pub struct JustificationGraph {
    justifications: HashMap<u64, JustificationRecord>,
    /// fact -> ids of justifications that derive it.
    by_fact: HashMap<FactId, Vec<u64>>,
    /// premise fact -> ids of justifications that depend on it (reverse index).
    dependents: HashMap<FactId, Vec<u64>>,
    next_id: u64,
}

impl JustificationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_explicit(&mut self, fact: FactId) -> u64 {
        self.insert(fact, JustificationKind::Explicit, None, Vec::new(), Binding::new())
    }

    /// Records a fresh derivation. Rejects self-support: a justification
    /// whose premise list contains the derived fact's own id is refused.
    /// Also rejects a duplicate of an already-recorded `(rule, premises)`
    /// pair for this fact, so re-deriving the same activation through a
    /// different join order (e.g. a self-referential premise matching more
    /// than one condition slot) does not append a second identical record.
    pub fn add_logical(
        &mut self,
        fact: FactId,
        rule: String,
        premises: Vec<FactId>,
        binding: Binding,
    ) -> Option<u64> {
        if premises.contains(&fact) {
            return None;
        }
        if let Some(ids) = self.by_fact.get(&fact) {
            let duplicate = ids.iter().filter_map(|id| self.justifications.get(id)).any(|existing| {
                existing.rule.as_deref() == Some(rule.as_str()) && existing.premises == premises
            });
            if duplicate {
                return None;
            }
        }
        Some(self.insert(fact, JustificationKind::Logical, Some(rule), premises, binding))
    }

    fn insert(
        &mut self,
        fact: FactId,
        kind: JustificationKind,
        rule: Option<String>,
        premises: Vec<FactId>,
        binding: Binding,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        for premise in &premises {
            self.dependents.entry(*premise).or_default().push(id);
        }
        self.by_fact.entry(fact).or_default().push(id);
        self.justifications.insert(
            id,
            JustificationRecord { id, fact, kind, rule, premises, binding },
        );
        id
    }

    pub fn get(&self, fact: FactId) -> Vec<&JustificationRecord> {
        self.by_fact
            .get(&fact)
            .map(|ids| ids.iter().filter_map(|id| self.justifications.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn is_logical(&self, fact: FactId) -> bool {
        self.get(fact).iter().any(|j| j.kind == JustificationKind::Logical)
    }

    pub fn is_explicit(&self, fact: FactId) -> bool {
        self.get(fact).iter().any(|j| j.kind == JustificationKind::Explicit)
    }

    /// True if at least one justification for `fact` is still valid given
    /// the current set of live facts.
    pub fn has_valid_justification(&self, fact: FactId, live: &HashSet<FactId>) -> bool {
        self.get(fact).iter().any(|j| j.is_valid(live))
    }

    /// Remove every justification recorded for `fact` (used when the fact
    /// itself is being retracted).
    pub fn remove_justifications(&mut self, fact: FactId) {
        if let Some(ids) = self.by_fact.remove(&fact) {
            for id in ids {
                if let Some(j) = self.justifications.remove(&id) {
                    for premise in &j.premises {
                        if let Some(deps) = self.dependents.get_mut(premise) {
                            deps.retain(|d| *d != id);
                        }
                    }
                }
            }
        }
        self.dependents.remove(&fact);
    }

    /// Remove every justification that names `rule_name`. Returns the set of
    /// facts that lost their only remaining justification and must now be
    /// retracted by the caller (the inference engine).
    pub fn remove_by_rule(&mut self, rule_name: &str, live: &HashSet<FactId>) -> Vec<FactId> {
        let doomed: Vec<u64> = self
            .justifications
            .values()
            .filter(|j| j.rule.as_deref() == Some(rule_name))
            .map(|j| j.id)
            .collect();
        let mut affected = HashSet::new();
        for id in doomed {
            if let Some(j) = self.justifications.remove(&id) {
                affected.insert(j.fact);
                if let Some(ids) = self.by_fact.get_mut(&j.fact) {
                    ids.retain(|i| *i != id);
                }
                for premise in &j.premises {
                    if let Some(deps) = self.dependents.get_mut(premise) {
                        deps.retain(|d| *d != id);
                    }
                }
            }
        }
        affected
            .into_iter()
            .filter(|f| !self.has_valid_justification(*f, live))
            .collect()
    }

    /// Given that `retracted` just lost its place in the live set, find every
    /// fact that must now cascade-retract: any fact all of whose
    /// justifications depend (directly or transitively) on `retracted`.
    /// Returns facts in the order they should be retracted (premises before
    /// dependents is not required; the caller retracts the whole batch).
    pub fn cascade(&self, retracted: FactId, live: &HashSet<FactId>) -> Vec<FactId> {
        let mut still_live = live.clone();
        still_live.remove(&retracted);
        let mut newly_dead = vec![retracted];
        let mut frontier = vec![retracted];

        while let Some(dead) = frontier.pop() {
            let Some(dependent_justs) = self.dependents.get(&dead) else { continue };
            let mut candidates: HashSet<FactId> = HashSet::new();
            for jid in dependent_justs {
                if let Some(j) = self.justifications.get(jid) {
                    candidates.insert(j.fact);
                }
            }
            for candidate in candidates {
                if !still_live.contains(&candidate) {
                    continue;
                }
                if !self.has_valid_justification(candidate, &still_live) {
                    still_live.remove(&candidate);
                    newly_dead.push(candidate);
                    frontier.push(candidate);
                }
            }
        }
        newly_dead
    }

    pub fn stats(&self) -> JustificationStats {
        let explicit = self
            .justifications
            .values()
            .filter(|j| j.kind == JustificationKind::Explicit)
            .count();
        let logical = self.justifications.len() - explicit;
        JustificationStats {
            total_justifications: self.justifications.len(),
            explicit_facts: self.by_fact.values().filter(|ids| {
                ids.iter().any(|id| {
                    self.justifications.get(id).map(|j| j.kind == JustificationKind::Explicit).unwrap_or(false)
                })
            }).count(),
            logical_facts: self.by_fact.values().filter(|ids| {
                ids.iter().all(|id| {
                    self.justifications.get(id).map(|j| j.kind == JustificationKind::Logical).unwrap_or(false)
                })
            }).count(),
            explicit_justifications: explicit,
            logical_justifications: logical,
        }
    }

    pub fn clear(&mut self) {
        self.justifications.clear();
        self.by_fact.clear();
        self.dependents.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct JustificationStats {
    pub total_justifications: usize,
    pub explicit_facts: usize,
    pub logical_facts: usize,
    pub explicit_justifications: usize,
    pub logical_justifications: usize,
}
