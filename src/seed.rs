//! Startup document loading: initial facts, rule pack, and shape catalog,
//! each optional and named by a path in [`crate::config::AppConfig`].

use std::path::Path;

use serde::Deserialize;

use crate::engine::EngineHandle;
use crate::errors::Result;
use crate::shapes::ShapeCatalog;
use crate::store::Provenance;

/// The seed knowledge-base document: a flat list of compact textual
/// patterns (the same grammar [`crate::query::parse_pattern`] accepts),
/// asserted in file order at startup.
#[derive(Debug, Deserialize)]
struct SeedDocument {
    #[serde(default)]
    facts: Vec<String>,
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

pub async fn load_seed_facts(engine: &EngineHandle, path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let doc: SeedDocument = if is_json(path) { serde_json::from_str(&text)? } else { serde_yaml::from_str(&text)? };

    let mut items = Vec::with_capacity(doc.facts.len());
    for pattern in &doc.facts {
        let term = crate::query::parse_pattern(pattern)?;
        items.push((term, 1.0, None::<Provenance>));
    }
    let outcomes = engine.assert_batch(items).await?;
    Ok(outcomes.iter().filter(|o| o.is_ok()).count())
}

pub async fn load_seed_rules(engine: &EngineHandle, path: &Path) -> Result<crate::rulepack::CompileReport> {
    let text = std::fs::read_to_string(path)?;
    let doc = crate::rulepack::parse_document(&text, is_json(path))?;
    engine.load_rule_pack(doc).await
}

pub async fn load_seed_shapes(engine: &EngineHandle, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let catalog = ShapeCatalog::load_str(&text, is_json(path))?;
    engine.load_shapes(catalog).await
}
