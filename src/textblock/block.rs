//! Block primitives: literal text, node-output references and agent placeholders

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node within a workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Identifier of a single block
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(NodeId);
string_id!(BlockId);

/// Static text. Always ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub id: BlockId,
    pub content: String,
}

impl TextBlock {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: BlockId::generate(),
            content: content.into(),
        }
    }
}

/// Reference to another node's output.
///
/// Carries no resolution state; that lives in the runtime block state map,
/// keyed by this block's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualBlock {
    pub id: BlockId,
    pub source_node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl VirtualBlock {
    pub fn new(source_node_id: NodeId) -> Self {
        Self {
            id: BlockId::generate(),
            source_node_id,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Label shown while the reference is unresolved
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.source_node_id.as_str())
    }
}

/// Placeholder filled in by an agent at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInjectBlock {
    pub id: BlockId,
    /// Instruction describing what the agent should inject
    pub hint: String,
}

impl AgentInjectBlock {
    pub fn new(hint: impl Into<String>) -> Self {
        Self {
            id: BlockId::generate(),
            hint: hint.into(),
        }
    }
}

/// Any block that can appear in a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Text(TextBlock),
    Virtual(VirtualBlock),
    AgentInject(AgentInjectBlock),
}

impl Block {
    pub fn text(content: impl Into<String>) -> Self {
        Block::Text(TextBlock::new(content))
    }

    pub fn reference(source: impl Into<NodeId>) -> Self {
        Block::Virtual(VirtualBlock::new(source.into()))
    }

    pub fn agent_inject(hint: impl Into<String>) -> Self {
        Block::AgentInject(AgentInjectBlock::new(hint))
    }

    pub fn id(&self) -> &BlockId {
        match self {
            Block::Text(b) => &b.id,
            Block::Virtual(b) => &b.id,
            Block::AgentInject(b) => &b.id,
        }
    }

    /// Source node of a reference block
    pub fn source_node(&self) -> Option<&NodeId> {
        match self {
            Block::Virtual(b) => Some(&b.source_node_id),
            _ => None,
        }
    }

    /// Whether this block carries runtime resolution state
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Block::Text(_))
    }
}
