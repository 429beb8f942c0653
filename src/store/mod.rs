pub mod fact_store;
pub mod rule_store;

pub use fact_store::{AdmitResult, Fact, FactId, FactStore, Provenance};
pub use rule_store::{Conclusion, Rule, RuleKind, RuleStore};
