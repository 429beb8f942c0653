//! Layered process configuration: compiled defaults, then an optional YAML
//! file, then `SEMNET_`-prefixed environment variables.
//!
//! Mirrors the `AIAPIConfig::default()` shape the REST demo in the upstream
//! engine uses for its own service configuration: every field has a
//! hard-coded default, and a matching environment variable overrides it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http_port: u16,
    pub rpc_port: u16,
    pub seed_kb_path: Option<PathBuf>,
    pub seed_rules_path: Option<PathBuf>,
    pub shapes_path: Option<PathBuf>,
    pub max_facts: usize,
    pub max_query_results: usize,
    pub max_radius: u32,
    pub max_subgraph_nodes: usize,
    pub max_rule_pack_bytes: usize,
    pub renderer_command: Option<String>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            rpc_port: 8081,
            seed_kb_path: None,
            seed_rules_path: None,
            shapes_path: None,
            max_facts: 1_000_000,
            max_query_results: 10_000,
            max_radius: 10,
            max_subgraph_nodes: 5_000,
            max_rule_pack_bytes: 8 * 1024 * 1024,
            renderer_command: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then overlay an optional config file, then overlay
    /// environment variables. Each layer only overrides fields it actually
    /// sets.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self> {
        let mut cfg = AppConfig::default();

        if let Some(path) = config_path {
            let text = std::fs::read_to_string(path)?;
            let file_cfg: PartialConfig = serde_yaml::from_str(&text)?;
            file_cfg.apply(&mut cfg);
        }

        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SEMNET_HTTP_PORT") {
            if let Ok(p) = v.parse() {
                self.http_port = p;
            }
        }
        if let Ok(v) = std::env::var("SEMNET_RPC_PORT") {
            if let Ok(p) = v.parse() {
                self.rpc_port = p;
            }
        }
        if let Ok(v) = std::env::var("SEMNET_SEED_KB_PATH") {
            self.seed_kb_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEMNET_SEED_RULES_PATH") {
            self.seed_rules_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEMNET_SHAPES_PATH") {
            self.shapes_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEMNET_MAX_FACTS") {
            if let Ok(n) = v.parse() {
                self.max_facts = n;
            }
        }
        if let Ok(v) = std::env::var("SEMNET_MAX_QUERY_RESULTS") {
            if let Ok(n) = v.parse() {
                self.max_query_results = n;
            }
        }
        if let Ok(v) = std::env::var("SEMNET_MAX_RADIUS") {
            if let Ok(n) = v.parse() {
                self.max_radius = n;
            }
        }
        if let Ok(v) = std::env::var("SEMNET_MAX_SUBGRAPH_NODES") {
            if let Ok(n) = v.parse() {
                self.max_subgraph_nodes = n;
            }
        }
        if let Ok(v) = std::env::var("SEMNET_RENDERER_COMMAND") {
            self.renderer_command = Some(v);
        }
        if let Ok(v) = std::env::var("SEMNET_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

/// Subset of `AppConfig` as read from a YAML config file; every field
/// optional so the file may override only what it mentions.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    http_port: Option<u16>,
    rpc_port: Option<u16>,
    seed_kb_path: Option<PathBuf>,
    seed_rules_path: Option<PathBuf>,
    shapes_path: Option<PathBuf>,
    max_facts: Option<usize>,
    max_query_results: Option<usize>,
    max_radius: Option<u32>,
    max_subgraph_nodes: Option<usize>,
    max_rule_pack_bytes: Option<usize>,
    renderer_command: Option<String>,
    log_level: Option<String>,
}

impl PartialConfig {
    fn apply(self, cfg: &mut AppConfig) {
        if let Some(v) = self.http_port {
            cfg.http_port = v;
        }
        if let Some(v) = self.rpc_port {
            cfg.rpc_port = v;
        }
        if self.seed_kb_path.is_some() {
            cfg.seed_kb_path = self.seed_kb_path;
        }
        if self.seed_rules_path.is_some() {
            cfg.seed_rules_path = self.seed_rules_path;
        }
        if self.shapes_path.is_some() {
            cfg.shapes_path = self.shapes_path;
        }
        if let Some(v) = self.max_facts {
            cfg.max_facts = v;
        }
        if let Some(v) = self.max_query_results {
            cfg.max_query_results = v;
        }
        if let Some(v) = self.max_radius {
            cfg.max_radius = v;
        }
        if let Some(v) = self.max_subgraph_nodes {
            cfg.max_subgraph_nodes = v;
        }
        if let Some(v) = self.max_rule_pack_bytes {
            cfg.max_rule_pack_bytes = v;
        }
        if self.renderer_command.is_some() {
            cfg.renderer_command = self.renderer_command;
        }
        if let Some(v) = self.log_level {
            cfg.log_level = v;
        }
    }
}
