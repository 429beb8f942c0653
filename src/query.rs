//! Pattern parsing and query evaluation against the fact store.

use crate::errors::{EngineError, Result};
use crate::justification::JustificationGraph;
use crate::store::{FactId, FactStore};
use crate::term::{unify, Binding, Term};

/// Parse the compact textual pattern grammar:
/// - `Functor(arg, ...)`
/// - `[subject predicate object]`
/// - `(subject predicate object)`
/// - a bare substring, matched against any atom argument of any live fact.
///
/// Arguments starting with `?` parse as [`Term::Variable`]; everything else
/// parses as [`Term::Atom`].
pub fn parse_pattern(input: &str) -> Result<Term> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::bad_request("empty pattern"));
    }

    if let Some(open) = trimmed.find('(') {
        if trimmed.ends_with(')') && !trimmed.starts_with('(') {
            let functor = &trimmed[..open];
            if !functor.is_empty() && functor.chars().all(|c| c.is_alphanumeric() || c == '_') {
                let inner = &trimmed[open + 1..trimmed.len() - 1];
                let args = split_args(inner)?;
                return Ok(Term::compound(functor, args.into_iter().map(parse_arg).collect()));
            }
        }
    }

    if (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('(') && trimmed.ends_with(')'))
    {
        let inner = &trimmed[1..trimmed.len() - 1];
        let parts: Vec<&str> = inner.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(EngineError::bad_request(
                "triple pattern must have exactly subject, predicate, object",
            ));
        }
        return Ok(Term::compound(parts[1], vec![parse_arg(parts[0]), parse_arg(parts[2])]));
    }

    // Bare substring fallback: represented as a pseudo-pattern that
    // `QueryEvaluator::run` recognizes and handles with a linear scan.
    Ok(Term::compound("__substring__", vec![Term::atom(trimmed)]))
}

fn split_args(inner: &str) -> Result<Vec<String>> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(inner.split(',').map(|s| s.trim().to_string()).collect())
}

fn parse_arg(raw: &str) -> Term {
    if let Some(var) = raw.strip_prefix('?') {
        Term::var(var)
    } else {
        Term::atom(raw)
    }
}

#[derive(Debug, Clone)]
pub struct QueryFilters {
    pub limit: usize,
    pub min_confidence: f64,
    pub include_justification: bool,
}

impl Default for QueryFilters {
    fn default() -> Self {
        Self { limit: 100, min_confidence: 0.0, include_justification: false }
    }
}

#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub fact_id: FactId,
    pub binding: Binding,
    pub confidence: f64,
    pub justification_summary: Vec<String>,
}

pub struct QueryEvaluator;

impl QueryEvaluator {
    /// Evaluate `pattern` against the store, applying filters and returning
    /// results in ascending `fact_id` order for determinism.
    pub fn run(
        facts: &FactStore,
        justifications: &JustificationGraph,
        pattern: &Term,
        filters: &QueryFilters,
    ) -> Vec<QueryMatch> {
        let mut candidate_ids: Vec<FactId> = if let Term::Compound(functor, args) = pattern {
            if functor.as_ref() == "__substring__" {
                return Self::substring_scan(facts, args, filters);
            }
            facts.lookup(functor, args.len())
        } else {
            Vec::new()
        };
        candidate_ids.sort();

        let mut results = Vec::new();
        for id in candidate_ids {
            let Some(fact) = facts.get(id) else { continue };
            if fact.confidence < filters.min_confidence {
                continue;
            }
            let Some(binding) = unify(pattern, &fact.term, &Binding::new()) else { continue };
            let justification_summary = if filters.include_justification {
                let mut rules: Vec<String> = justifications
                    .get(id)
                    .into_iter()
                    .filter_map(|j| j.rule.clone())
                    .collect();
                rules.sort();
                rules
            } else {
                Vec::new()
            };
            if results.len() >= filters.limit {
                break;
            }
            results.push(QueryMatch { fact_id: id, binding, confidence: fact.confidence, justification_summary });
        }
        results
    }

    fn substring_scan(facts: &FactStore, args: &[Term], filters: &QueryFilters) -> Vec<QueryMatch> {
        let Term::Atom(needle) = &args[0] else { return Vec::new() };
        let mut results = Vec::new();
        if filters.limit == 0 {
            return results;
        }
        for id in facts.all_live_sorted() {
            let Some(fact) = facts.get(id) else { continue };
            if fact.confidence < filters.min_confidence {
                continue;
            }
            if term_contains_substring(&fact.term, needle) {
                results.push(QueryMatch {
                    fact_id: id,
                    binding: Binding::new(),
                    confidence: fact.confidence,
                    justification_summary: Vec::new(),
                });
                if results.len() >= filters.limit {
                    break;
                }
            }
        }
        results
    }
}

fn term_contains_substring(term: &Term, needle: &str) -> bool {
    match term {
        Term::Atom(a) => a.contains(needle),
        Term::Variable(_) => false,
        Term::Compound(f, args) => f.contains(needle) || args.iter().any(|a| term_contains_substring(a, needle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FactStore;

    #[test]
    fn parse_functor_form() {
        let term = parse_pattern("parentOf(?x, b)").unwrap();
        assert_eq!(term, Term::compound("parentOf", vec![Term::var("x"), Term::atom("b")]));
    }

    #[test]
    fn parse_bracket_triple_form() {
        let term = parse_pattern("[?x childOf a]").unwrap();
        assert_eq!(term, Term::compound("childOf", vec![Term::var("x"), Term::atom("a")]));
    }

    #[test]
    fn parse_bare_substring_fallback() {
        let term = parse_pattern("hello").unwrap();
        assert_eq!(term, Term::compound("__substring__", vec![Term::atom("hello")]));
    }

    #[test]
    fn parse_empty_pattern_is_bad_request() {
        assert!(parse_pattern("   ").is_err());
    }

    #[test]
    fn query_returns_sorted_bindings() {
        let mut facts = FactStore::new(100);
        facts.admit(Term::compound("childOf", vec![Term::atom("c"), Term::atom("a")]), true, 1.0, None).unwrap();
        facts.admit(Term::compound("childOf", vec![Term::atom("b"), Term::atom("a")]), true, 1.0, None).unwrap();
        let justifications = JustificationGraph::new();
        let pattern = Term::compound("childOf", vec![Term::var("x"), Term::atom("a")]);
        let results = QueryEvaluator::run(&facts, &justifications, &pattern, &QueryFilters::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].fact_id < results[1].fact_id);
    }

    #[test]
    fn query_limit_zero_returns_empty() {
        let mut facts = FactStore::new(100);
        facts
            .admit(Term::compound("childOf", vec![Term::atom("b"), Term::atom("a")]), true, 1.0, None)
            .unwrap();
        let justifications = JustificationGraph::new();
        let pattern = Term::compound("childOf", vec![Term::var("x"), Term::atom("a")]);
        let filters = QueryFilters { limit: 0, min_confidence: 0.0, include_justification: false };
        let results = QueryEvaluator::run(&facts, &justifications, &pattern, &filters);
        assert!(results.is_empty());
    }
}
