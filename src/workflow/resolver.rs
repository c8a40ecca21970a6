//! Execution order from node references

use super::definition::NodeMap;
use crate::textblock::NodeId;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Structural problem in a workflow graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("node '{node}' references unknown node '{missing}'")]
    Missing { node: NodeId, missing: NodeId },

    #[error("circular dependency among nodes: {}", join(.node_ids))]
    Cycle { node_ids: Vec<NodeId> },
}

fn join(ids: &[NodeId]) -> String {
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

/// Order nodes so every node comes after the nodes it references.
///
/// Kahn's algorithm. Nodes that become ready together are taken in id order.
/// On a cycle, every node that could not be ordered is reported.
pub fn topological_sort(nodes: &NodeMap) -> Result<Vec<NodeId>, DependencyError> {
    let mut in_degree: HashMap<&NodeId, usize> = nodes.keys().map(|id| (id, 0)).collect();
    let mut dependents: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();

    for (id, node) in nodes {
        for dep in node.dependencies() {
            let Some((dep_id, _)) = nodes.get_key_value(&dep) else {
                return Err(DependencyError::Missing {
                    node: id.clone(),
                    missing: dep,
                });
            };
            dependents.entry(dep_id).or_default().push(id);
            *in_degree.entry(id).or_default() += 1;
        }
    }

    let mut queue: VecDeque<&NodeId> = nodes
        .keys()
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.clone());

        let Some(next) = dependents.get(id) else {
            continue;
        };
        // Dependents were collected in id order
        for dependent in next {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let node_ids = nodes
            .keys()
            .filter(|id| in_degree.get(id).is_some_and(|d| *d > 0))
            .cloned()
            .collect();
        tracing::debug!(ordered = order.len(), total = nodes.len(), "Cycle detected");
        return Err(DependencyError::Cycle { node_ids });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textblock::Block;
    use crate::workflow::NodeDefinition;

    fn graph(edges: &[(&str, &[&str])]) -> NodeMap {
        edges
            .iter()
            .map(|(id, deps)| {
                let blocks = deps.iter().map(|d| Block::reference(*d)).collect();
                let node = NodeDefinition::new(*id).with_id(*id).with_user_prompt(blocks);
                (node.id.clone(), node)
            })
            .collect()
    }

    fn ids(order: &[NodeId]) -> Vec<&str> {
        order.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn test_orders_after_dependencies() {
        let nodes = graph(&[
            ("outline", &[]),
            ("chapter1", &["outline"]),
            ("chapter2", &["outline", "chapter1"]),
            ("summary", &["chapter1", "chapter2"]),
            ("style", &[]),
        ]);

        let order = topological_sort(&nodes).unwrap();
        assert_eq!(order.len(), nodes.len());

        let pos = |id: &str| order.iter().position(|n| n.as_str() == id).unwrap();
        for (id, node) in &nodes {
            for dep in node.dependencies() {
                assert!(pos(dep.as_str()) < pos(id.as_str()), "{dep} must precede {id}");
            }
        }
    }

    #[test]
    fn test_ties_broken_by_id() {
        let nodes = graph(&[("c", &[]), ("a", &[]), ("b", &["a"]), ("d", &["c"])]);
        let order = topological_sort(&nodes).unwrap();
        assert_eq!(ids(&order), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let nodes = graph(&[("A", &["B"]), ("B", &["A"])]);
        let err = topological_sort(&nodes).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Cycle {
                node_ids: vec!["A".into(), "B".into()]
            }
        );
        assert_eq!(err.to_string(), "circular dependency among nodes: A, B");
    }

    #[test]
    fn test_cycle_accounts_for_every_node() {
        let nodes = graph(&[
            ("root", &[]),
            ("x", &["root", "z"]),
            ("y", &["x"]),
            ("z", &["y"]),
            ("tail", &["z"]),
        ]);

        let Err(DependencyError::Cycle { node_ids }) = topological_sort(&nodes) else {
            panic!("expected a cycle");
        };
        assert!(!node_ids.is_empty());
        assert!(node_ids.contains(&"x".into()));
        assert!(!node_ids.contains(&"root".into()));
        // root is the only node that can be ordered
        assert_eq!(1 + node_ids.len(), nodes.len());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let nodes = graph(&[("A", &["A"])]);
        assert_eq!(
            topological_sort(&nodes),
            Err(DependencyError::Cycle {
                node_ids: vec!["A".into()]
            })
        );
    }

    #[test]
    fn test_missing_reference() {
        let nodes = graph(&[("A", &[]), ("B", &["A", "ghost"])]);
        let err = topological_sort(&nodes).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Missing {
                node: "B".into(),
                missing: "ghost".into(),
            }
        );
        assert_eq!(err.to_string(), "node 'B' references unknown node 'ghost'");
    }

    #[test]
    fn test_empty_graph() {
        assert!(topological_sort(&NodeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_input_untouched() {
        let nodes = graph(&[("A", &[]), ("B", &["A"])]);
        let before = nodes.clone();
        topological_sort(&nodes).unwrap();
        topological_sort(&nodes).unwrap();
        assert_eq!(nodes, before);
    }
}
