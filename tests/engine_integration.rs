//! End-to-end tests driving the whole stack through [`EngineHandle`]:
//! assert, forward-chaining derivation, retraction cascades, the `why`
//! proof tree, rule-pack loading, and shape validation.

use semnet_engine::engine::EngineHandle;
use semnet_engine::query::QueryFilters;
use semnet_engine::rulepack::parse_document;
use semnet_engine::shapes::ShapeCatalog;
use semnet_engine::term::Term;

fn triple(subject: &str, predicate: &str, object: &str) -> Term {
    Term::compound(predicate, vec![Term::atom(subject), Term::atom(object)])
}

#[tokio::test]
async fn asserting_a_fact_is_queryable_immediately() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let outcomes = engine
        .assert_batch(vec![(triple("alice", "parentOf", "bob"), 1.0, None)])
        .await
        .unwrap();
    assert!(outcomes[0].as_ref().unwrap().admitted);

    let pattern = Term::compound("parentOf", vec![Term::var("x"), Term::atom("bob")]);
    let results = engine.query(&pattern, &QueryFilters::default()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].binding.get("x"), Some(&Term::atom("alice")));
}

#[tokio::test]
async fn rule_pack_chain_rule_derives_transitively() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let doc = parse_document(
        r#"
        chain:
          - name: chain_contains
            properties: [hasComponent, partOf]
            result: contains
        "#,
        false,
    )
    .unwrap();
    let report = engine.load_rule_pack(doc).await.unwrap();
    assert_eq!(report.loaded_rule_count, 1);

    engine
        .assert_batch(vec![
            (triple("engine", "hasComponent", "piston"), 1.0, None),
            (triple("piston", "partOf", "cylinder"), 1.0, None),
        ])
        .await
        .unwrap();

    let pattern = Term::compound("contains", vec![Term::var("x"), Term::var("y")]);
    let results = engine.query(&pattern, &QueryFilters::default()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].binding.get("x"), Some(&Term::atom("engine")));
    assert_eq!(results[0].binding.get("y"), Some(&Term::atom("cylinder")));
}

#[tokio::test]
async fn retracting_a_premise_cascades_to_derived_facts() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let doc = parse_document("transitive: [ancestorOf]\n", false).unwrap();
    engine.load_rule_pack(doc).await.unwrap();

    let outcomes = engine
        .assert_batch(vec![
            (triple("a", "ancestorOf", "b"), 1.0, None),
            (triple("b", "ancestorOf", "c"), 1.0, None),
        ])
        .await
        .unwrap();
    let premise_id = outcomes[0].as_ref().unwrap().fact_id;

    let pattern = Term::compound("ancestorOf", vec![Term::atom("a"), Term::atom("c")]);
    let before = engine.query(&pattern, &QueryFilters::default()).await;
    assert_eq!(before.len(), 1);

    let cascade = engine.retract(premise_id).await.unwrap();
    assert!(cascade.len() >= 2, "retracting the premise must also retract its derived fact");

    let after = engine.query(&pattern, &QueryFilters::default()).await;
    assert!(after.is_empty());
}

#[tokio::test]
async fn why_reports_the_rule_and_premises_behind_a_derived_fact() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let doc = parse_document(
        r#"
        inverse:
          - p: parentOf
            q: childOf
        "#,
        false,
    )
    .unwrap();
    engine.load_rule_pack(doc).await.unwrap();

    engine.assert_batch(vec![(triple("alice", "parentOf", "bob"), 1.0, None)]).await.unwrap();

    let pattern = Term::compound("childOf", vec![Term::var("x"), Term::var("y")]);
    let results = engine.query(&pattern, &QueryFilters::default()).await;
    assert_eq!(results.len(), 1);
    let derived_id = results[0].fact_id;

    let why = engine.why(derived_id, 10).await.unwrap();
    assert!(why.has_proof);
    assert_eq!(why.rules, vec!["inverse_parentOf_childOf".to_string()]);
    assert_eq!(why.supports.len(), 1);
    let tree = why.proof_tree.unwrap();
    assert_eq!(tree.rule.as_deref(), Some("inverse_parentOf_childOf"));
    assert_eq!(tree.premises.len(), 1);
}

#[tokio::test]
async fn inverse_rule_compiles_to_two_one_directional_rules_not_a_swap() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let doc = parse_document(
        r#"
        transitive: [parentOf]
        inverse:
          - p: parentOf
            q: childOf
        "#,
        false,
    )
    .unwrap();
    engine.load_rule_pack(doc).await.unwrap();

    engine
        .assert_batch(vec![
            (triple("a", "parentOf", "b"), 1.0, None),
            (triple("b", "parentOf", "c"), 1.0, None),
        ])
        .await
        .unwrap();

    let parent_pattern = Term::compound("parentOf", vec![Term::var("x"), Term::var("y")]);
    let parent_results = engine.query(&parent_pattern, &QueryFilters::default()).await;
    assert_eq!(parent_results.len(), 3, "a-b, b-c, and the transitively derived a-c");

    let child_pattern = Term::compound("childOf", vec![Term::var("x"), Term::var("y")]);
    let child_results = engine.query(&child_pattern, &QueryFilters::default()).await;
    let child_pairs: std::collections::HashSet<(Term, Term)> = child_results
        .iter()
        .map(|m| (m.binding.get("x").unwrap().clone(), m.binding.get("y").unwrap().clone()))
        .collect();
    assert_eq!(child_results.len(), 3, "childOf(b,a), childOf(c,b), childOf(c,a) only");
    assert!(child_pairs.contains(&(Term::atom("b"), Term::atom("a"))));
    assert!(child_pairs.contains(&(Term::atom("c"), Term::atom("b"))));
    assert!(child_pairs.contains(&(Term::atom("c"), Term::atom("a"))));
    assert!(
        !child_pairs.contains(&(Term::atom("a"), Term::atom("b"))),
        "the reciprocal rule must not re-derive the original parentOf pair as a childOf fact"
    );
}

#[tokio::test]
async fn why_on_an_unknown_fact_returns_none() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    assert!(engine.why(semnet_engine::store::FactId::from_raw(9999), 10).await.is_none());
}

#[tokio::test]
async fn shape_validation_blocks_a_second_cardinality_one_property() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let catalog = ShapeCatalog::load_str(
        r#"
        shapes:
          - name: RobotShape
            target_class: Robot
            properties:
              - path: serialNumber
                min_count: 1
                max_count: 1
        "#,
        false,
    )
    .unwrap();
    engine.load_shapes(catalog).await.unwrap();

    engine.assert_batch(vec![(triple("r1", "isa", "Robot"), 1.0, None)]).await.unwrap();
    engine.assert_batch(vec![(triple("r1", "serialNumber", "SN-1"), 1.0, None)]).await.unwrap();

    let report = engine.validate("r1", "serialNumber", &Term::atom("SN-2")).await;
    assert!(!report.conforms);
    assert_eq!(report.violation_count, 1);
}

#[tokio::test]
async fn disjointness_rule_records_contradiction_without_blocking_either_fact() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let doc = parse_document(
        r#"
        disjoint:
          - a: Cat
            b: Dog
        "#,
        false,
    )
    .unwrap();
    engine.load_rule_pack(doc).await.unwrap();

    engine.assert_batch(vec![(triple("x", "isa", "Cat"), 1.0, None)]).await.unwrap();
    engine.assert_batch(vec![(triple("x", "isa", "Dog"), 1.0, None)]).await.unwrap();

    let contradictions = engine.contradictions().await.unwrap();
    assert_eq!(contradictions.len(), 1);
    assert_eq!(contradictions[0].rule, "disjoint_Cat_Dog");

    let pattern = Term::compound("isa", vec![Term::atom("x"), Term::var("c")]);
    let results = engine.query(&pattern, &QueryFilters::default()).await;
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn asserting_then_retracting_leaves_no_trace_of_the_fact() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let pattern = Term::compound("parentOf", vec![Term::var("x"), Term::var("y")]);

    let before = engine.query(&pattern, &QueryFilters::default()).await;
    assert!(before.is_empty());

    let outcomes = engine
        .assert_batch(vec![(triple("alice", "parentOf", "bob"), 1.0, None)])
        .await
        .unwrap();
    let fact_id = outcomes[0].as_ref().unwrap().fact_id;
    engine.retract(fact_id).await.unwrap();

    let after = engine.query(&pattern, &QueryFilters::default()).await;
    assert_eq!(before.len(), after.len());
    assert!(engine.get_fact(fact_id).await.is_none());
}

#[tokio::test]
async fn loading_the_same_rule_pack_twice_is_idempotent() {
    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    let text = "transitive: [ancestorOf]\n";

    let first = engine.load_rule_pack(parse_document(text, false).unwrap()).await.unwrap();
    let second = engine.load_rule_pack(parse_document(text, false).unwrap()).await.unwrap();
    assert_eq!(first.loaded_rule_count, second.loaded_rule_count);

    let stats = engine.rule_stats().await.unwrap();
    assert_eq!(stats.get("transitivity").copied().unwrap_or(0), 1, "reloading must replace, not duplicate, the rule");
}

#[tokio::test]
async fn subgraph_extraction_respects_radius_and_max_nodes() {
    use semnet_engine::subgraph::{FocusSpec, SubgraphRequest};

    let engine = EngineHandle::spawn(10_000, ShapeCatalog::empty());
    engine
        .assert_batch(vec![
            (triple("hub", "linksTo", "leaf1"), 1.0, None),
            (triple("hub", "linksTo", "leaf2"), 1.0, None),
        ])
        .await
        .unwrap();

    let req = SubgraphRequest {
        focus: FocusSpec::Atom("hub".to_string()),
        radius: 1,
        include_edges: None,
        exclude_edges: None,
        max_nodes: 100,
        collapse: true,
    };
    let envelope = engine.subgraph(&req).await;
    assert_eq!(envelope.nodes.len(), 2);
    assert_eq!(envelope.edges.len(), 2);
}
