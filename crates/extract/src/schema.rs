use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl KeywordEntry {
    pub fn bare(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            definition: None,
        }
    }

    pub fn defined(keyword: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            definition: Some(definition.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    /// Importance weight, drawn as node size.
    #[serde(rename = "val")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Concept graph. Every edge endpoint names a node in `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphEdge>,
}

impl Graph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}
