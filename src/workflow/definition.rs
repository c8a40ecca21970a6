//! Node and workflow definitions
//!
//! Fully serializable metadata. Nothing here changes while a workflow runs.

use super::resolver::{DependencyError, topological_sort};
use crate::config::{ApiConnection, ApiParameters};
use crate::runtime::BlockStateMap;
use crate::textblock::{Block, BlockId, BlockList, NodeId, VirtualBlock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node definitions keyed by id. Iteration is in id order.
pub type NodeMap = BTreeMap<NodeId, NodeDefinition>;

/// Canvas position; opaque to the engine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Everything needed for one LLM call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiConfiguration {
    #[serde(default)]
    pub connection: ApiConnection,

    #[serde(default)]
    pub parameters: ApiParameters,

    #[serde(default)]
    pub system_prompt: BlockList,

    #[serde(default)]
    pub user_prompt: BlockList,
}

/// Final prompt text for a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodePrompt {
    pub system: String,
    pub user: String,
}

/// Static metadata for one LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    pub name: String,

    #[serde(default)]
    pub position: Position,

    #[serde(default)]
    pub api_config: ApiConfiguration,
}

impl NodeDefinition {
    /// Create a node with a fresh id and default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            position: Position::default(),
            api_config: ApiConfiguration::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_connection(mut self, connection: ApiConnection) -> Self {
        self.api_config.connection = connection;
        self
    }

    pub fn with_parameters(mut self, parameters: ApiParameters) -> Self {
        self.api_config.parameters = parameters;
        self
    }

    pub fn with_system_prompt(mut self, blocks: Vec<Block>) -> Self {
        self.api_config.system_prompt = BlockList::from_blocks(blocks);
        self
    }

    pub fn with_user_prompt(mut self, blocks: Vec<Block>) -> Self {
        self.api_config.user_prompt = BlockList::from_blocks(blocks);
        self
    }

    /// System and user prompt lists
    pub fn prompt_lists(&self) -> [&BlockList; 2] {
        [&self.api_config.system_prompt, &self.api_config.user_prompt]
    }

    /// Nodes this node reads from, deduplicated across both prompts
    pub fn dependencies(&self) -> Vec<NodeId> {
        let mut deps = self.api_config.system_prompt.dependencies();
        for dep in self.api_config.user_prompt.dependencies() {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        deps
    }

    /// Reference blocks in either prompt pointing at `node_id`
    pub fn references<'a>(&'a self, node_id: &'a NodeId) -> impl Iterator<Item = &'a VirtualBlock> {
        self.prompt_lists()
            .into_iter()
            .flat_map(move |list| list.references(node_id))
    }

    /// All inputs have content
    pub fn is_ready(&self, blocks: &BlockStateMap) -> bool {
        self.prompt_lists().iter().all(|list| list.is_ready(blocks))
    }

    pub fn prompt(&self, blocks: &BlockStateMap) -> NodePrompt {
        NodePrompt {
            system: self.api_config.system_prompt.content(blocks),
            user: self.api_config.user_prompt.content(blocks),
        }
    }
}

/// A named collection of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,

    /// Serialized as an ordered list of `[id, node]` pairs
    #[serde(default, with = "node_pairs")]
    pub nodes: NodeMap,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            nodes: NodeMap::new(),
        }
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeDefinition>) -> Self {
        for node in nodes {
            self.add_node(node);
        }
        self
    }

    /// Insert a node, returning the one it replaced
    pub fn add_node(&mut self, node: NodeDefinition) -> Option<NodeDefinition> {
        self.nodes.insert(node.id.clone(), node)
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<&NodeDefinition> {
        self.nodes.get(node_id)
    }

    /// Edit a node in place. The node keeps its id.
    pub fn update_node(
        &mut self,
        node_id: &NodeId,
        updater: impl FnOnce(&mut NodeDefinition),
    ) -> bool {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return false;
        };
        updater(node);
        node.id = node_id.clone();
        true
    }

    /// Remove a node and cut every reference to it from the remaining nodes.
    ///
    /// References frozen in `blocks` are kept as literal text. Returns the
    /// removed node and the block ids whose runtime state is now obsolete.
    pub fn remove_node(
        &mut self,
        node_id: &NodeId,
        blocks: &BlockStateMap,
    ) -> Option<(NodeDefinition, Vec<BlockId>)> {
        let removed = self.nodes.remove(node_id)?;
        let mut obsolete: Vec<BlockId> = removed
            .prompt_lists()
            .into_iter()
            .flat_map(|list| list.dynamic_block_ids().cloned())
            .collect();

        for node in self.nodes.values_mut() {
            obsolete.extend(node.api_config.system_prompt.detach_node(node_id, blocks));
            obsolete.extend(node.api_config.user_prompt.detach_node(node_id, blocks));
        }

        Some((removed, obsolete))
    }

    /// Check the graph without executing anything
    pub fn validate(&self) -> Result<Vec<NodeId>, DependencyError> {
        topological_sort(&self.nodes)
    }

    /// Ids of every dynamic block in the workflow
    pub fn dynamic_block_ids(&self) -> impl Iterator<Item = &BlockId> {
        self.nodes
            .values()
            .flat_map(|node| node.prompt_lists())
            .flat_map(|list| list.dynamic_block_ids())
    }

    /// Locate a block and the node owning it
    pub fn find_block(&self, block_id: &BlockId) -> Option<(&NodeDefinition, &Block)> {
        self.nodes.values().find_map(|node| {
            node.prompt_lists()
                .into_iter()
                .find_map(|list| list.find(block_id))
                .map(|block| (node, block))
        })
    }
}

mod node_pairs {
    use super::{NodeDefinition, NodeMap};
    use crate::textblock::NodeId;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nodes: &NodeMap, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(nodes.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeMap, D::Error> {
        let pairs: Vec<(NodeId, NodeDefinition)> = Vec::deserialize(deserializer)?;
        let mut nodes = NodeMap::new();

        for (id, node) in pairs {
            if id != node.id {
                return Err(D::Error::custom(format!(
                    "node key '{}' does not match node id '{}'",
                    id, node.id
                )));
            }
            if nodes.insert(id.clone(), node).is_some() {
                return Err(D::Error::custom(format!("duplicate node id '{}'", id)));
            }
        }

        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, user: Vec<Block>) -> NodeDefinition {
        NodeDefinition::new(id).with_id(id).with_user_prompt(user)
    }

    #[test]
    fn test_dependencies_across_prompts() {
        let n = NodeDefinition::new("writer")
            .with_system_prompt(vec![Block::reference("style"), Block::reference("outline")])
            .with_user_prompt(vec![Block::text("Go: "), Block::reference("outline")]);

        assert_eq!(n.dependencies(), vec![NodeId::from("style"), NodeId::from("outline")]);
        assert_eq!(n.references(&"outline".into()).count(), 2);
    }

    #[test]
    fn test_prompt_and_readiness() {
        let n = NodeDefinition::new("writer")
            .with_system_prompt(vec![Block::text("You are a novelist.")])
            .with_user_prompt(vec![Block::text("Expand: "), Block::reference("outline")]);

        let mut blocks = BlockStateMap::default();
        assert!(!n.is_ready(&blocks));
        assert_eq!(n.prompt(&blocks).user, "Expand: [outline]");

        n.api_config.user_prompt.resolve_node_output(&mut blocks, &"outline".into(), "1. Intro");
        assert!(n.is_ready(&blocks));
        assert_eq!(
            n.prompt(&blocks),
            NodePrompt {
                system: "You are a novelist.".into(),
                user: "Expand: 1. Intro".into(),
            }
        );
    }

    #[test]
    fn test_serializes_nodes_as_pairs() {
        let wf = WorkflowDefinition::new("draft")
            .with_nodes([node("B", vec![Block::reference("A")]), node("A", vec![])]);

        let json = serde_json::to_value(&wf).unwrap();
        let nodes = json["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0][0], "A");
        assert_eq!(nodes[0][1]["id"], "A");
        assert_eq!(nodes[1][0], "B");

        let parsed: WorkflowDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, wf);
    }

    #[test]
    fn test_rejects_duplicate_and_mismatched_keys() {
        let dup = r#"{"id":"w","name":"n","nodes":[
            ["A",{"id":"A","name":"a"}],
            ["A",{"id":"A","name":"again"}]
        ]}"#;
        let err = serde_json::from_str::<WorkflowDefinition>(dup).unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'A'"));

        let mismatch = r#"{"id":"w","name":"n","nodes":[["A",{"id":"B","name":"b"}]]}"#;
        let err = serde_json::from_str::<WorkflowDefinition>(mismatch).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_minimal_node_document() {
        let doc = r#"{"id":"w","name":"n","nodes":[["A",{"id":"A","name":"a","api_config":{
            "user_prompt":{"id":"u","blocks":[{"kind":"text","id":"t","content":"hi"}]}
        }}]]}"#;
        let wf: WorkflowDefinition = serde_json::from_str(doc).unwrap();
        let a = wf.get_node(&"A".into()).unwrap();
        assert_eq!(a.api_config.parameters, ApiParameters::default());
        assert_eq!(a.prompt(&BlockStateMap::default()).user, "hi");
    }

    #[test]
    fn test_update_node_keeps_id() {
        let mut wf = WorkflowDefinition::new("draft").with_nodes([node("A", vec![])]);

        assert!(wf.update_node(&"A".into(), |n| {
            n.name = "Renamed".into();
            n.id = "Z".into();
        }));
        let a = wf.get_node(&"A".into()).unwrap();
        assert_eq!(a.name, "Renamed");
        assert_eq!(a.id, NodeId::from("A"));

        assert!(!wf.update_node(&"missing".into(), |_| {}));
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut wf = WorkflowDefinition::new("draft").with_nodes([
            node("A", vec![Block::agent_inject("tone")]),
            node("B", vec![Block::text("x"), Block::reference("A")]),
            node("C", vec![Block::reference("B")]),
        ]);

        let (removed, obsolete) = wf.remove_node(&"A".into(), &BlockStateMap::default()).unwrap();
        assert_eq!(removed.id, NodeId::from("A"));
        assert_eq!(obsolete.len(), 2);

        let b = wf.get_node(&"B".into()).unwrap();
        assert!(b.dependencies().is_empty());
        assert_eq!(b.api_config.user_prompt.blocks.len(), 1);
        assert_eq!(wf.validate().unwrap(), vec![NodeId::from("B"), NodeId::from("C")]);

        assert!(wf.remove_node(&"A".into(), &BlockStateMap::default()).is_none());
    }

    #[test]
    fn test_find_block() {
        let reference = Block::reference("A");
        let block_id = reference.id().clone();
        let wf = WorkflowDefinition::new("draft")
            .with_nodes([node("A", vec![]), node("B", vec![reference])]);

        let (owner, block) = wf.find_block(&block_id).unwrap();
        assert_eq!(owner.id, NodeId::from("B"));
        assert_eq!(block.source_node(), Some(&NodeId::from("A")));
        assert!(wf.find_block(&"nope".into()).is_none());
        assert_eq!(wf.dynamic_block_ids().count(), 1);
    }
}
