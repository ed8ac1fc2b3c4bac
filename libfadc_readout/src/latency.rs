//! Total latency of streams connected by a dependency graph.
//!
//! A stream is only ready at time `t` once every stream it was computed from is
//! ready, so the total latency of a stream is the local latency of its producer
//! plus the largest total latency among its dependencies. The graph may refer
//! to streams that have not been registered yet. Those streams (and everything
//! depending on them) remain unresolved until they appear.
use fxhash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};

use super::error::LatencyError;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamNode {
    pub local_latency: f64,
    pub dependencies: Vec<String>,
}

impl StreamNode {
    pub fn new(local_latency: f64, dependencies: &[&str]) -> Self {
        Self {
            local_latency,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Order the known streams so that every stream comes after its known
/// dependencies (Kahn's algorithm). Fails if the graph contains a cycle.
pub fn topological_order(
    graph: &BTreeMap<String, StreamNode>,
) -> Result<Vec<String>, LatencyError> {
    let mut pending: FxHashMap<&str, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for (name, node) in graph.iter() {
        let mut count = 0;
        for dep in node.dependencies.iter() {
            if graph.contains_key(dep) {
                count += 1;
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }
        pending.insert(name.as_str(), count);
    }

    let mut queue: VecDeque<&str> = graph
        .keys()
        .map(|k| k.as_str())
        .filter(|k| pending.get(k) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(graph.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        if let Some(children) = dependents.get(name) {
            for child in children {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    if order.len() != graph.len() {
        let mut cycle: Vec<String> = pending
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        cycle.sort();
        return Err(LatencyError::Cycle(cycle));
    }
    Ok(order)
}

/// Total latency of every stream whose transitive dependencies are all known
pub fn resolve_latencies(
    graph: &BTreeMap<String, StreamNode>,
) -> Result<BTreeMap<String, f64>, LatencyError> {
    let order = topological_order(graph)?;
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for name in order {
        let node = &graph[&name];
        let mut longest = 0.0_f64;
        let mut resolved = true;
        for dep in node.dependencies.iter() {
            match totals.get(dep) {
                Some(latency) => longest = longest.max(*latency),
                None => {
                    resolved = false;
                    break;
                }
            }
        }
        if resolved {
            totals.insert(name, node.local_latency + longest);
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[(&str, f64, &[&str])]) -> BTreeMap<String, StreamNode> {
        nodes
            .iter()
            .map(|(name, local, deps)| (name.to_string(), StreamNode::new(*local, deps)))
            .collect()
    }

    #[test]
    fn test_chain() {
        let g = graph(&[("A", 4.0, &["B"]), ("B", 8.0, &["C"]), ("C", 16.0, &[])]);
        let totals = resolve_latencies(&g).unwrap();
        assert_eq!(totals["C"], 16.0);
        assert_eq!(totals["B"], 24.0);
        assert_eq!(totals["A"], 28.0);
    }

    #[test]
    fn test_longest_dependency() {
        let g = graph(&[
            ("hits", 2.0, &["fast", "slow"]),
            ("fast", 1.0, &[]),
            ("slow", 10.0, &[]),
        ]);
        assert_eq!(resolve_latencies(&g).unwrap()["hits"], 12.0);
    }

    #[test]
    fn test_unresolved() {
        let g = graph(&[("A", 4.0, &["B"]), ("B", 8.0, &["missing"])]);
        let totals = resolve_latencies(&g).unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn test_cycle() {
        let g = graph(&[
            ("A", 1.0, &["B"]),
            ("B", 1.0, &["C"]),
            ("C", 1.0, &["A"]),
            ("D", 1.0, &[]),
        ]);
        assert_eq!(
            resolve_latencies(&g).unwrap_err(),
            LatencyError::Cycle(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_self_loop() {
        let g = graph(&[("A", 1.0, &["A"])]);
        assert!(topological_order(&g).is_err());
    }
}
