//! The fact store: ground terms, head index, and lazily-built argument
//! indices.
//!
//! Structurally this is the `WorkingMemory` of the upstream RETE
//! implementation (`FactHandle`, tombstone-on-retract, type index) combined
//! with its `AlphaMemoryIndex` (field -> value -> indices), generalized from
//! single-type flat facts to arbitrary-arity compound terms.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::term::Term;

/// Opaque, monotonic, never-reused fact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactId(u64);

impl FactId {
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Reconstruct a `FactId` from the raw value a caller supplied (e.g. in
    /// a `why`/`retract` request). Existence is checked separately via
    /// [`FactStore::get_any`]; this alone does not prove the id is live or
    /// even ever-allocated.
    pub fn from_raw(value: u64) -> Self {
        FactId(value)
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Provenance {
    pub source: Option<String>,
    pub doc_id: Option<String>,
    pub span: Option<String>,
    pub extractor: Option<String>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Fact {
    pub id: FactId,
    pub term: Term,
    pub asserted: bool,
    pub confidence: f64,
    pub provenance: Option<Provenance>,
    pub retracted: bool,
}

/// A lazily-created `(functor, position) -> value -> fact ids` index.
#[derive(Debug, Default)]
struct ArgIndex {
    by_value: HashMap<Term, HashSet<FactId>>,
}

#[derive(Debug)]
pub struct FactStore {
    facts: HashMap<FactId, Fact>,
    /// term -> id, for idempotent admission of identical ground terms.
    by_term: HashMap<Term, FactId>,
    /// (functor, arity) -> ordered set of live fact ids.
    head_index: HashMap<(String, usize), std::collections::BTreeSet<FactId>>,
    /// (functor, position) -> ArgIndex, created on first `create_arg_index` call.
    arg_indices: HashMap<(String, usize), ArgIndex>,
    next_id: AtomicU64,
    max_facts: usize,
}

pub struct AdmitResult {
    pub id: FactId,
    pub is_new: bool,
}

impl FactStore {
    pub fn new(max_facts: usize) -> Self {
        Self {
            facts: HashMap::new(),
            by_term: HashMap::new(),
            head_index: HashMap::new(),
            arg_indices: HashMap::new(),
            next_id: AtomicU64::new(1),
            max_facts,
        }
    }

    pub fn live_count(&self) -> usize {
        self.facts.values().filter(|f| !f.retracted).count()
    }

    pub fn live_ids(&self) -> HashSet<FactId> {
        self.facts.values().filter(|f| !f.retracted).map(|f| f.id).collect()
    }

    pub fn all_live_sorted(&self) -> Vec<FactId> {
        let mut ids: Vec<FactId> = self.facts.values().filter(|f| !f.retracted).map(|f| f.id).collect();
        ids.sort();
        ids
    }

    /// Admit a ground term. Idempotent: re-admitting an already-live,
    /// structurally-identical term returns the existing id with
    /// `is_new = false` and does not touch its metadata.
    pub fn admit(
        &mut self,
        term: Term,
        asserted: bool,
        confidence: f64,
        provenance: Option<Provenance>,
    ) -> Result<AdmitResult, crate::errors::EngineError> {
        if let Some(&id) = self.by_term.get(&term) {
            if let Some(existing) = self.facts.get(&id) {
                if !existing.retracted {
                    return Ok(AdmitResult { id, is_new: false });
                }
            }
        }

        if self.live_count() >= self.max_facts {
            return Err(crate::errors::EngineError::capacity_exhausted("facts"));
        }

        let id = FactId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let head = term.head();

        self.facts.insert(
            id,
            Fact {
                id,
                term: term.clone(),
                asserted,
                confidence,
                provenance,
                retracted: false,
            },
        );
        self.by_term.insert(term.clone(), id);

        if let Some((functor, arity)) = head {
            self.head_index
                .entry((functor.to_string(), arity))
                .or_default()
                .insert(id);
            self.index_args(&term);
        }

        Ok(AdmitResult { id, is_new: true })
    }

    fn index_args(&mut self, term: &Term) {
        if let Term::Compound(functor, args) = term {
            for (pos, arg) in args.iter().enumerate() {
                let key = (functor.to_string(), pos);
                if let Some(index) = self.arg_indices.get_mut(&key) {
                    index.by_value.entry(arg.clone()).or_default().insert(
                        self.by_term.get(term).copied().expect("just inserted"),
                    );
                }
            }
        }
    }

    /// Ensure an argument index exists for `(functor, position)`, backfilling
    /// from current live facts. Called by the query evaluator the first time
    /// it wants to filter on that position.
    pub fn create_arg_index(&mut self, functor: &str, position: usize) {
        let key = (functor.to_string(), position);
        if self.arg_indices.contains_key(&key) {
            return;
        }
        let mut index = ArgIndex::default();
        if let Some(ids) = self.head_index.iter().find_map(|((f, _), ids)| {
            if f == functor {
                Some(ids.clone())
            } else {
                None
            }
        }) {
            for id in ids {
                if let Some(fact) = self.facts.get(&id) {
                    if !fact.retracted {
                        if let Term::Compound(_, args) = &fact.term {
                            if let Some(arg) = args.get(position) {
                                index.by_value.entry(arg.clone()).or_default().insert(id);
                            }
                        }
                    }
                }
            }
        }
        self.arg_indices.insert(key, index);
    }

    pub fn lookup_by_arg(&self, functor: &str, position: usize, value: &Term) -> Option<Vec<FactId>> {
        self.arg_indices
            .get(&(functor.to_string(), position))
            .map(|idx| idx.by_value.get(value).map(|s| s.iter().copied().collect()).unwrap_or_default())
    }

    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id).filter(|f| !f.retracted)
    }

    pub fn get_any(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    pub fn lookup(&self, functor: &str, arity: usize) -> Vec<FactId> {
        self.head_index
            .get(&(functor.to_string(), arity))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Retract a fact: set its tombstone, drop it from every index, but
    /// never free the id. No-op (returns `false`) on an unknown id.
    pub fn retract(&mut self, id: FactId) -> bool {
        let Some(fact) = self.facts.get_mut(&id) else {
            return false;
        };
        if fact.retracted {
            return false;
        }
        fact.retracted = true;
        let term = fact.term.clone();
        self.by_term.remove(&term);

        if let Some((functor, arity)) = term.head() {
            if let Some(set) = self.head_index.get_mut(&(functor.to_string(), arity)) {
                set.remove(&id);
            }
            if let Term::Compound(f, args) = &term {
                for (pos, arg) in args.iter().enumerate() {
                    if let Some(idx) = self.arg_indices.get_mut(&(f.to_string(), pos)) {
                        if let Some(set) = idx.by_value.get_mut(arg) {
                            set.remove(&id);
                        }
                    }
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.facts.clear();
        self.by_term.clear();
        self.head_index.clear();
        self.arg_indices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_is_idempotent() {
        let mut store = FactStore::new(100);
        let term = Term::compound("parentOf", vec![Term::atom("a"), Term::atom("b")]);
        let r1 = store.admit(term.clone(), true, 1.0, None).unwrap();
        let r2 = store.admit(term, true, 1.0, None).unwrap();
        assert_eq!(r1.id, r2.id);
        assert!(r1.is_new);
        assert!(!r2.is_new);
    }

    #[test]
    fn retract_removes_from_head_index_but_keeps_record() {
        let mut store = FactStore::new(100);
        let term = Term::compound("p", vec![Term::atom("a")]);
        let r = store.admit(term, true, 1.0, None).unwrap();
        assert_eq!(store.lookup("p", 1).len(), 1);
        assert!(store.retract(r.id));
        assert_eq!(store.lookup("p", 1).len(), 0);
        assert!(store.get(r.id).is_none());
        assert!(store.get_any(r.id).is_some());
    }

    #[test]
    fn capacity_exhausted_rejects_new_admissions() {
        let mut store = FactStore::new(1);
        store.admit(Term::atom("a"), true, 1.0, None).unwrap();
        let err = store.admit(Term::atom("b"), true, 1.0, None).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::CapacityExhausted);
    }

    #[test]
    fn arg_index_lookup_finds_matching_facts() {
        let mut store = FactStore::new(100);
        store
            .admit(Term::compound("isa", vec![Term::atom("x"), Term::atom("Cat")]), true, 1.0, None)
            .unwrap();
        store
            .admit(Term::compound("isa", vec![Term::atom("y"), Term::atom("Dog")]), true, 1.0, None)
            .unwrap();
        store.create_arg_index("isa", 1);
        let matches = store.lookup_by_arg("isa", 1, &Term::atom("Cat")).unwrap();
        assert_eq!(matches.len(), 1);
    }
}
