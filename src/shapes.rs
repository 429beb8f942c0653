//! SHACL-like shape validation gate for incoming assertions.
//!
//! The declarative shape catalog document uses the same `serde` derive
//! discipline as the rule-pack document in [`crate::rulepack`]: a closed
//! schema, loaded from YAML or JSON.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::term::Term;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShapeCatalogDocument {
    #[serde(default)]
    pub shapes: Vec<ShapeDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShapeDef {
    pub name: String,
    pub target_class: String,
    #[serde(default)]
    pub properties: Vec<PropertyConstraint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyConstraint {
    pub path: String,
    #[serde(default)]
    pub min_count: Option<usize>,
    #[serde(default)]
    pub max_count: Option<usize>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub requires_property: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub focus: String,
    pub path: String,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub conforms: bool,
    pub violation_count: usize,
    pub violations: Vec<Violation>,
}

/// A view of the known assertions for one subject, keyed by predicate, used
/// to evaluate cardinality/conditional constraints without re-scanning the
/// whole fact store for every validation call.
pub struct SubjectView<'a> {
    pub subject: &'a str,
    pub types: Vec<&'a str>,
    pub properties: HashMap<&'a str, Vec<&'a Term>>,
}

pub struct ShapeCatalog {
    shapes: Vec<ShapeDef>,
}

impl ShapeCatalog {
    pub fn empty() -> Self {
        Self { shapes: Vec::new() }
    }

    pub fn from_document(doc: ShapeCatalogDocument) -> Self {
        Self { shapes: doc.shapes }
    }

    pub fn load_str(text: &str, is_json: bool) -> Result<Self> {
        let doc: ShapeCatalogDocument = if is_json {
            serde_json::from_str(text)?
        } else {
            serde_yaml::from_str(text)?
        };
        Ok(Self::from_document(doc))
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Validate one would-be assertion (`subject`, `predicate`, `object`)
    /// against every shape whose target class the subject already has
    /// (via `view.types`), including the object value the caller is about
    /// to add. `object_types` are the classes the object is already known
    /// to be an `isa` of, used for `class` (reference) constraints.
    pub fn validate_assertion(
        &self,
        view: &SubjectView,
        predicate: &str,
        candidate_object: &Term,
        object_types: &[&str],
    ) -> ValidationReport {
        let mut violations = Vec::new();

        for shape in &self.shapes {
            if !view.types.contains(&shape.target_class.as_str()) {
                continue;
            }
            for prop in &shape.properties {
                if prop.path != predicate {
                    continue;
                }
                let mut existing_count = view.properties.get(predicate).map(|v| v.len()).unwrap_or(0);
                // Count the candidate itself unless it's already present
                // (idempotent assertion shouldn't trip max_count twice).
                let already_present = view
                    .properties
                    .get(predicate)
                    .map(|v| v.iter().any(|t| **t == *candidate_object))
                    .unwrap_or(false);
                if !already_present {
                    existing_count += 1;
                }

                if let Some(max) = prop.max_count {
                    if existing_count > max {
                        violations.push(Violation {
                            focus: view.subject.to_string(),
                            path: predicate.to_string(),
                            message: format!("maxCount={max} exceeded on path {predicate}"),
                            severity: "violation".to_string(),
                        });
                    }
                }

                if let Some(datatype) = &prop.datatype {
                    if !matches_datatype(candidate_object, datatype) {
                        violations.push(Violation {
                            focus: view.subject.to_string(),
                            path: predicate.to_string(),
                            message: format!("expected datatype {datatype} on path {predicate}"),
                            severity: "violation".to_string(),
                        });
                    }
                }

                if let Some(pattern) = &prop.pattern {
                    if let Term::Atom(value) = candidate_object {
                        if let Ok(re) = Regex::new(pattern) {
                            if !re.is_match(value) {
                                violations.push(Violation {
                                    focus: view.subject.to_string(),
                                    path: predicate.to_string(),
                                    message: format!("value does not match pattern {pattern}"),
                                    severity: "violation".to_string(),
                                });
                            }
                        }
                    }
                }

                if let (Some(min), Term::Atom(value)) = (prop.min_value, candidate_object) {
                    if let Ok(n) = value.parse::<f64>() {
                        if n < min {
                            violations.push(Violation {
                                focus: view.subject.to_string(),
                                path: predicate.to_string(),
                                message: format!("value below minimum {min}"),
                                severity: "violation".to_string(),
                            });
                        }
                    }
                }
                if let (Some(max), Term::Atom(value)) = (prop.max_value, candidate_object) {
                    if let Ok(n) = value.parse::<f64>() {
                        if n > max {
                            violations.push(Violation {
                                focus: view.subject.to_string(),
                                path: predicate.to_string(),
                                message: format!("value above maximum {max}"),
                                severity: "violation".to_string(),
                            });
                        }
                    }
                }

                if let Some(class) = &prop.class {
                    if !object_types.contains(&class.as_str()) {
                        violations.push(Violation {
                            focus: view.subject.to_string(),
                            path: predicate.to_string(),
                            message: format!("value is not known to be an instance of class {class} on path {predicate}"),
                            severity: "violation".to_string(),
                        });
                    }
                }

                if let Some(required) = &prop.requires_property {
                    if !view.properties.contains_key(required.as_str()) {
                        violations.push(Violation {
                            focus: view.subject.to_string(),
                            path: predicate.to_string(),
                            message: format!("path {predicate} requires {required} to also be present"),
                            severity: "violation".to_string(),
                        });
                    }
                }
            }

            // min_count constraints on properties not present at all can
            // only be enforced after the assertion completes; the bridge
            // does not block on them pre-admission (a single assertion
            // cannot satisfy every min_count shape in one call).
        }

        let violation_count = violations.len();
        ValidationReport { conforms: violation_count == 0, violations, violation_count }
    }
}

fn matches_datatype(term: &Term, datatype: &str) -> bool {
    match (term, datatype) {
        (Term::Atom(v), "integer") => v.parse::<i64>().is_ok(),
        (Term::Atom(v), "float") => v.parse::<f64>().is_ok(),
        (Term::Atom(v), "boolean") => v == "true" || v == "false",
        (Term::Atom(_), "string") => true,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot_catalog() -> ShapeCatalog {
        ShapeCatalog {
            shapes: vec![ShapeDef {
                name: "RobotShape".to_string(),
                target_class: "Robot".to_string(),
                properties: vec![PropertyConstraint {
                    path: "serialNumber".to_string(),
                    min_count: Some(1),
                    max_count: Some(1),
                    datatype: None,
                    class: None,
                    min_value: None,
                    max_value: None,
                    pattern: None,
                    requires_property: None,
                }],
            }],
        }
    }

    #[test]
    fn scenario_s6_second_serial_number_violates_max_count() {
        let catalog = robot_catalog();
        let mut props: HashMap<&str, Vec<&Term>> = HashMap::new();
        let existing = Term::atom("A");
        props.insert("serialNumber", vec![&existing]);
        let view = SubjectView { subject: "r", types: vec!["Robot"], properties: props };

        let candidate = Term::atom("B");
        let report = catalog.validate_assertion(&view, "serialNumber", &candidate, &[]);
        assert!(!report.conforms);
        assert_eq!(report.violation_count, 1);
        assert!(report.violations[0].message.contains("maxCount=1"));
    }

    #[test]
    fn first_serial_number_conforms() {
        let catalog = robot_catalog();
        let view = SubjectView { subject: "r", types: vec!["Robot"], properties: HashMap::new() };
        let candidate = Term::atom("A");
        let report = catalog.validate_assertion(&view, "serialNumber", &candidate, &[]);
        assert!(report.conforms);
    }

    #[test]
    fn unrelated_type_is_not_validated() {
        let catalog = robot_catalog();
        let view = SubjectView { subject: "x", types: vec!["Cat"], properties: HashMap::new() };
        let report = catalog.validate_assertion(&view, "serialNumber", &Term::atom("X"), &[]);
        assert!(report.conforms);
    }

    fn owner_catalog() -> ShapeCatalog {
        ShapeCatalog {
            shapes: vec![ShapeDef {
                name: "RobotShape".to_string(),
                target_class: "Robot".to_string(),
                properties: vec![PropertyConstraint {
                    path: "hasOwner".to_string(),
                    min_count: None,
                    max_count: None,
                    datatype: None,
                    class: Some("Person".to_string()),
                    min_value: None,
                    max_value: None,
                    pattern: None,
                    requires_property: None,
                }],
            }],
        }
    }

    #[test]
    fn class_constraint_rejects_an_object_not_known_to_be_that_class() {
        let catalog = owner_catalog();
        let view = SubjectView { subject: "r", types: vec!["Robot"], properties: HashMap::new() };
        let report = catalog.validate_assertion(&view, "hasOwner", &Term::atom("toaster"), &[]);
        assert!(!report.conforms);
        assert!(report.violations[0].message.contains("class Person"));
    }

    #[test]
    fn class_constraint_accepts_an_object_of_the_required_class() {
        let catalog = owner_catalog();
        let view = SubjectView { subject: "r", types: vec!["Robot"], properties: HashMap::new() };
        let report = catalog.validate_assertion(&view, "hasOwner", &Term::atom("alice"), &["Person"]);
        assert!(report.conforms);
    }
}
