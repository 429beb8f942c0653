//! Bounded BFS subgraph extraction for visualization.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::store::{FactId, FactStore};
use crate::term::Term;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Concept,
    Individual,
    Proposition,
    Rule,
    Frame,
}

impl NodeKind {
    fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Concept => "concept",
            NodeKind::Individual => "individual",
            NodeKind::Proposition => "proposition",
            NodeKind::Rule => "rule",
            NodeKind::Frame => "frame",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphNode {
    pub id: String,
    pub label: String,
    pub kind: &'static str,
    pub asserted: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub asserted: bool,
    pub collapsed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphMeta {
    pub focus: String,
    pub radius: u32,
    pub node_count: usize,
    pub edge_count: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphEnvelope {
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
    pub meta: SubgraphMeta,
}

#[derive(Debug, Clone)]
pub struct SubgraphRequest {
    pub focus: FocusSpec,
    pub radius: u32,
    pub include_edges: Option<HashSet<String>>,
    pub exclude_edges: Option<HashSet<String>>,
    pub max_nodes: usize,
    pub collapse: bool,
}

#[derive(Debug, Clone)]
pub enum FocusSpec {
    Fact(FactId),
    Atom(String),
}

pub struct SubgraphExtractor;

impl SubgraphExtractor {
    pub fn extract(facts: &FactStore, req: &SubgraphRequest) -> SubgraphEnvelope {
        let focus_ids = Self::resolve_focus(facts, &req.focus);
        let focus_label = match &req.focus {
            FocusSpec::Fact(id) => id.to_string(),
            FocusSpec::Atom(name) => name.clone(),
        };

        let mut visited: HashSet<FactId> = HashSet::new();
        let mut nodes: Vec<SubgraphNode> = Vec::new();
        let mut edges: Vec<SubgraphEdge> = Vec::new();
        let mut frontier: VecDeque<(FactId, u32)> = VecDeque::new();
        let mut capped = false;

        for id in &focus_ids {
            if visited.insert(*id) {
                frontier.push_back((*id, 0));
            }
        }

        if req.radius == 0 || focus_ids.is_empty() {
            for id in &focus_ids {
                if let Some(fact) = facts.get(*id) {
                    nodes.push(Self::fact_to_node(*id, fact));
                }
            }
            let node_count = nodes.len();
            return SubgraphEnvelope {
                nodes,
                edges,
                meta: SubgraphMeta {
                    focus: focus_label,
                    radius: req.radius,
                    node_count,
                    edge_count: 0,
                    timestamp: chrono::Utc::now(),
                },
            };
        }

        while let Some((current, depth)) = frontier.pop_front() {
            let Some(fact) = facts.get(current) else { continue };
            if nodes.len() >= req.max_nodes && !visited.contains(&current) {
                capped = true;
                continue;
            }
            nodes.push(Self::fact_to_node(current, fact));

            if depth >= req.radius {
                continue;
            }

            let shared_atoms: Vec<&Term> = fact.term.args().iter().collect();
            for atom in shared_atoms {
                let Term::Atom(name) = atom else { continue };
                for (functor, neighbor_id) in Self::facts_mentioning(facts, name.as_ref()) {
                    if neighbor_id == current {
                        continue;
                    }
                    if let Some(allow) = &req.include_edges {
                        if !allow.contains(&functor) {
                            continue;
                        }
                    }
                    if let Some(deny) = &req.exclude_edges {
                        if deny.contains(&functor) {
                            continue;
                        }
                    }

                    let would_exceed = nodes.len() >= req.max_nodes && !visited.contains(&neighbor_id);
                    let collapsed = would_exceed || capped;

                    if collapsed && !req.collapse {
                        capped = true;
                        continue;
                    }

                    edges.push(SubgraphEdge {
                        id: format!("{current}-{neighbor_id}"),
                        source: current.to_string(),
                        target: neighbor_id.to_string(),
                        label: functor.clone(),
                        asserted: fact.asserted,
                        collapsed,
                    });

                    if collapsed {
                        capped = true;
                        continue;
                    }
                    if visited.insert(neighbor_id) {
                        frontier.push_back((neighbor_id, depth + 1));
                    }
                }
            }
        }

        let meta = SubgraphMeta {
            focus: focus_label,
            radius: req.radius,
            node_count: nodes.len(),
            edge_count: edges.len(),
            timestamp: chrono::Utc::now(),
        };
        SubgraphEnvelope { nodes, edges, meta }
    }

    fn resolve_focus(facts: &FactStore, spec: &FocusSpec) -> Vec<FactId> {
        match spec {
            FocusSpec::Fact(id) => facts.get(*id).map(|_| vec![*id]).unwrap_or_default(),
            FocusSpec::Atom(name) => {
                Self::facts_mentioning(facts, name).into_iter().map(|(_, id)| id).collect()
            }
        }
    }

    /// Every live fact whose term mentions `atom` as its functor or any
    /// argument, paired with the "edge label" role (the functor).
    fn facts_mentioning(facts: &FactStore, atom: &str) -> Vec<(String, FactId)> {
        let mut out = Vec::new();
        for id in facts.all_live_sorted() {
            let Some(fact) = facts.get(id) else { continue };
            if let Term::Compound(functor, args) = &fact.term {
                if functor.as_ref() == atom || args.iter().any(|a| matches!(a, Term::Atom(a) if a.as_ref() == atom))
                {
                    out.push((functor.to_string(), id));
                }
            }
        }
        out
    }

    fn fact_to_node(id: FactId, fact: &crate::store::Fact) -> SubgraphNode {
        let kind = match &fact.term {
            Term::Compound(functor, args) if functor.as_ref() == "isa" && args.len() == 2 => NodeKind::Individual,
            Term::Compound(_, _) => NodeKind::Proposition,
            _ => NodeKind::Concept,
        };
        SubgraphNode {
            id: id.to_string(),
            label: fact.term.to_string(),
            kind: kind.as_str(),
            asserted: fact.asserted,
            confidence: fact.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_zero_returns_focus_alone() {
        let mut facts = FactStore::new(100);
        let r = facts.admit(Term::compound("isa", vec![Term::atom("r"), Term::atom("Robot")]), true, 1.0, None).unwrap();
        let req = SubgraphRequest {
            focus: FocusSpec::Fact(r.id),
            radius: 0,
            include_edges: None,
            exclude_edges: None,
            max_nodes: 100,
            collapse: true,
        };
        let envelope = SubgraphExtractor::extract(&facts, &req);
        assert_eq!(envelope.nodes.len(), 1);
        assert_eq!(envelope.edges.len(), 0);
    }

    #[test]
    fn collapse_marks_edges_beyond_cap() {
        let mut facts = FactStore::new(1000);
        for i in 0..20 {
            facts
                .admit(Term::compound("mentions", vec![Term::atom("n"), Term::atom(format!("leaf{i}"))]), true, 1.0, None)
                .unwrap();
        }
        let req = SubgraphRequest {
            focus: FocusSpec::Atom("n".to_string()),
            radius: 1,
            include_edges: None,
            exclude_edges: None,
            max_nodes: 5,
            collapse: true,
        };
        let envelope = SubgraphExtractor::extract(&facts, &req);
        assert!(envelope.nodes.len() <= 5);
        assert!(envelope.edges.iter().any(|e| e.collapsed));
    }
}
