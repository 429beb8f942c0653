//! Compiles a declarative rule-pack document into [`crate::store::Rule`]s.
//!
//! Grounded on the upstream `KnowledgeBase::add_rules_from_grl` entry point
//! (parse a document, validate, install into the rule store) but replacing
//! the GRL text grammar with a closed `serde` schema, since the declarative
//! constructs here (inverse, chain, transitive, ...) are fixed shapes rather
//! than free-form rule text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::{Conclusion, Rule, RuleKind};
use crate::term::Term;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RulePackDocument {
    #[serde(default)]
    pub inverse: Vec<InversePair>,
    #[serde(default)]
    pub chain: Vec<ChainRule>,
    #[serde(default)]
    pub transitive: Vec<String>,
    #[serde(default)]
    pub symmetric: Vec<String>,
    #[serde(default)]
    pub equivalent: Vec<EquivalentPair>,
    #[serde(default)]
    pub disjoint: Vec<DisjointPair>,
    #[serde(default, rename = "subClass")]
    pub sub_class: Vec<SubClassAxiom>,
    #[serde(default)]
    pub domain: Vec<DomainAxiom>,
    #[serde(default)]
    pub range: Vec<RangeAxiom>,
    #[serde(default)]
    pub implication: Vec<FreeImplication>,
    /// Keys that don't match any of the fields above. Populated by
    /// [`compile`] from whatever the deserializer couldn't place, so
    /// unknown constructs are reported rather than silently dropped.
    #[serde(skip)]
    pub unsupported_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InversePair {
    pub p: String,
    pub q: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainRule {
    pub name: String,
    pub properties: Vec<String>,
    pub result: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EquivalentPair {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisjointPair {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubClassAxiom {
    pub sub: String,
    pub sup: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainAxiom {
    pub property: String,
    pub class: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RangeAxiom {
    pub property: String,
    pub class: String,
}

/// Free-form pass-through rule: condition/conclusion already expressed as
/// compact textual patterns, parsed with [`crate::query::parse_pattern`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FreeImplication {
    pub name: String,
    pub condition: Vec<String>,
    pub conclusion: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedConstruct {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub loaded_rule_count: usize,
    pub rejected: Vec<RejectedConstruct>,
}

pub fn compile(doc: &RulePackDocument) -> (Vec<Rule>, CompileReport) {
    let mut rules = Vec::new();
    let mut rejected = Vec::new();

    for pair in &doc.inverse {
        rules.push(Rule {
            name: format!("inverse_{}_{}", pair.p, pair.q),
            kind: RuleKind::Inverse,
            condition: vec![binary(&pair.p)],
            conclusion: Conclusion::Derive(swapped_binary(&pair.q)),
            priority: 0,
        });
        rules.push(Rule {
            name: format!("inverse_{}_{}", pair.q, pair.p),
            kind: RuleKind::Inverse,
            condition: vec![binary(&pair.q)],
            conclusion: Conclusion::Derive(swapped_binary(&pair.p)),
            priority: 0,
        });
    }

    for chain in &doc.chain {
        if chain.properties.is_empty() {
            rejected.push(RejectedConstruct {
                key: format!("chain.{}", chain.name),
                reason: "chain must name at least one property".to_string(),
            });
            continue;
        }
        let var_count = chain.properties.len() + 1;
        let vars: Vec<Term> = (0..var_count).map(|i| Term::var(format!("x{i}"))).collect();
        let condition = chain
            .properties
            .iter()
            .enumerate()
            .map(|(i, p)| Term::compound(p.clone(), vec![vars[i].clone(), vars[i + 1].clone()]))
            .collect();
        let conclusion = Term::compound(chain.result.clone(), vec![vars[0].clone(), vars[var_count - 1].clone()]);
        rules.push(Rule {
            name: chain.name.clone(),
            kind: RuleKind::Chain,
            condition,
            conclusion: Conclusion::Derive(conclusion),
            priority: 0,
        });
    }

    for property in &doc.transitive {
        rules.push(Rule {
            name: format!("transitive_{property}"),
            kind: RuleKind::Transitivity,
            condition: vec![
                Term::compound(property.clone(), vec![Term::var("x"), Term::var("y")]),
                Term::compound(property.clone(), vec![Term::var("y"), Term::var("z")]),
            ],
            conclusion: Conclusion::Derive(Term::compound(
                property.clone(),
                vec![Term::var("x"), Term::var("z")],
            )),
            priority: 0,
        });
    }

    for property in &doc.symmetric {
        rules.push(Rule {
            name: format!("symmetric_{property}"),
            kind: RuleKind::Symmetry,
            condition: vec![binary(property)],
            conclusion: Conclusion::Derive(swapped_binary(property)),
            priority: 0,
        });
    }

    for pair in &doc.equivalent {
        rules.push(Rule {
            name: format!("equivalent_{}_{}", pair.a, pair.b),
            kind: RuleKind::Equivalence,
            condition: vec![isa(&pair.a)],
            conclusion: Conclusion::Derive(isa(&pair.b)),
            priority: 0,
        });
        rules.push(Rule {
            name: format!("equivalent_{}_{}", pair.b, pair.a),
            kind: RuleKind::Equivalence,
            condition: vec![isa(&pair.b)],
            conclusion: Conclusion::Derive(isa(&pair.a)),
            priority: 0,
        });
    }

    for pair in &doc.disjoint {
        rules.push(Rule {
            name: format!("disjoint_{}_{}", pair.a, pair.b),
            kind: RuleKind::DisjointnessConstraint,
            condition: vec![
                Term::compound("isa", vec![Term::var("x"), Term::atom(pair.a.clone())]),
                Term::compound("isa", vec![Term::var("x"), Term::atom(pair.b.clone())]),
            ],
            conclusion: Conclusion::Contradiction,
            priority: 0,
        });
    }

    for axiom in &doc.sub_class {
        rules.push(Rule {
            name: format!("subclass_{}_{}", axiom.sub, axiom.sup),
            kind: RuleKind::Subsumption,
            condition: vec![Term::compound("isa", vec![Term::var("x"), Term::atom(axiom.sub.clone())])],
            conclusion: Conclusion::Derive(Term::compound(
                "isa",
                vec![Term::var("x"), Term::atom(axiom.sup.clone())],
            )),
            priority: 0,
        });
    }

    for axiom in &doc.domain {
        rules.push(Rule {
            name: format!("domain_{}_{}", axiom.property, axiom.class),
            kind: RuleKind::Domain,
            condition: vec![binary(&axiom.property)],
            conclusion: Conclusion::Derive(Term::compound(
                "isa",
                vec![Term::var("x"), Term::atom(axiom.class.clone())],
            )),
            priority: 0,
        });
    }

    for axiom in &doc.range {
        rules.push(Rule {
            name: format!("range_{}_{}", axiom.property, axiom.class),
            kind: RuleKind::Range,
            condition: vec![binary(&axiom.property)],
            conclusion: Conclusion::Derive(Term::compound(
                "isa",
                vec![Term::var("y"), Term::atom(axiom.class.clone())],
            )),
            priority: 0,
        });
    }

    for free in &doc.implication {
        match compile_free_implication(free) {
            Ok(rule) => rules.push(rule),
            Err(reason) => rejected.push(RejectedConstruct { key: format!("implication.{}", free.name), reason }),
        }
    }

    for key in &doc.unsupported_keys {
        rejected.push(RejectedConstruct { key: key.clone(), reason: "unrecognized rule-pack construct".to_string() });
    }

    let mut final_rules = Vec::new();
    for rule in rules {
        if rule.conclusion_is_closed() {
            final_rules.push(rule);
        } else {
            rejected.push(RejectedConstruct {
                key: rule.name.clone(),
                reason: "conclusion has a variable not present in the condition".to_string(),
            });
        }
    }

    let report = CompileReport { loaded_rule_count: final_rules.len(), rejected };
    (final_rules, report)
}

fn compile_free_implication(free: &FreeImplication) -> Result<Rule, String> {
    let condition: Result<Vec<Term>, String> = free
        .condition
        .iter()
        .map(|p| crate::query::parse_pattern(p).map_err(|e| e.to_string()))
        .collect();
    let condition = condition?;
    let conclusion = crate::query::parse_pattern(&free.conclusion).map_err(|e| e.to_string())?;
    Ok(Rule {
        name: free.name.clone(),
        kind: RuleKind::Implication,
        condition,
        conclusion: Conclusion::Derive(conclusion),
        priority: free.priority,
    })
}

fn binary(property: &str) -> Term {
    Term::compound(property.to_string(), vec![Term::var("x"), Term::var("y")])
}

fn swapped_binary(property: &str) -> Term {
    Term::compound(property.to_string(), vec![Term::var("y"), Term::var("x")])
}

fn isa(class: &str) -> Term {
    Term::compound("isa", vec![Term::var("x"), Term::atom(class.to_string())])
}

/// Parse a rule-pack document, collecting any top-level keys the schema
/// doesn't recognize instead of silently ignoring them.
pub fn parse_document(text: &str, is_json: bool) -> Result<RulePackDocument, crate::errors::EngineError> {
    let known_keys = [
        "inverse", "chain", "transitive", "symmetric", "equivalent", "disjoint", "subClass", "domain",
        "range", "implication",
    ];
    let raw: HashMap<String, serde_json::Value> = if is_json {
        serde_json::from_str(text)?
    } else {
        let yaml_value: serde_yaml::Value = serde_yaml::from_str(text)?;
        serde_json::to_value(yaml_value)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .map(|m| m.into_iter().collect())
            .unwrap_or_default()
    };
    let unsupported_keys: Vec<String> = raw.keys().filter(|k| !known_keys.contains(&k.as_str())).cloned().collect();

    let mut doc: RulePackDocument = if is_json {
        serde_json::from_str(text)?
    } else {
        serde_yaml::from_str(text)?
    };
    doc.unsupported_keys = unsupported_keys;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_compiles_to_multi_premise_rule() {
        let doc = RulePackDocument {
            chain: vec![ChainRule {
                name: "chain_contains".to_string(),
                properties: vec!["hasComponent".to_string(), "partOf".to_string()],
                result: "contains".to_string(),
            }],
            ..Default::default()
        };
        let (rules, report) = compile(&doc);
        assert_eq!(report.loaded_rule_count, 1);
        assert_eq!(rules[0].condition.len(), 2);
    }

    #[test]
    fn inverse_compiles_to_two_reciprocal_rules() {
        let doc = RulePackDocument {
            inverse: vec![InversePair { p: "parentOf".to_string(), q: "childOf".to_string() }],
            ..Default::default()
        };
        let (rules, report) = compile(&doc);
        assert_eq!(report.loaded_rule_count, 2);
        assert_eq!(rules[0].name, "inverse_parentOf_childOf");
        assert_eq!(rules[0].condition[0], Term::compound("parentOf", vec![Term::var("x"), Term::var("y")]));
        let Conclusion::Derive(conclusion) = &rules[0].conclusion else { panic!("expected a derive conclusion") };
        assert_eq!(conclusion, &Term::compound("childOf", vec![Term::var("y"), Term::var("x")]));
        assert_eq!(rules[1].name, "inverse_childOf_parentOf");
        assert_eq!(rules[1].condition[0], Term::compound("childOf", vec![Term::var("x"), Term::var("y")]));
    }

    #[test]
    fn disjoint_compiles_to_constraint_rule() {
        let doc = RulePackDocument {
            disjoint: vec![DisjointPair { a: "Cat".to_string(), b: "Dog".to_string() }],
            ..Default::default()
        };
        let (rules, _report) = compile(&doc);
        assert!(matches!(rules[0].conclusion, Conclusion::Contradiction));
    }

    #[test]
    fn free_implication_with_unbound_conclusion_variable_is_rejected() {
        let doc = RulePackDocument {
            implication: vec![FreeImplication {
                name: "bad".to_string(),
                condition: vec!["p(?x)".to_string()],
                conclusion: "q(?unbound)".to_string(),
                priority: 0,
            }],
            ..Default::default()
        };
        let (rules, report) = compile(&doc);
        assert!(rules.is_empty());
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn unsupported_keys_are_collected_not_ignored() {
        let text = "transitive: [parentOf]\nnonsense_key: [1,2,3]\n";
        let doc = parse_document(text, false).unwrap();
        assert_eq!(doc.unsupported_keys, vec!["nonsense_key".to_string()]);
    }
}
