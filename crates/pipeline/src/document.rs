//! The narrow view of a live document tree that reconciliation needs.

use crate::markup::{RENDER_ID_ATTR, SOURCE_HASH_ATTR};
use std::collections::BTreeMap;

/// A live, independently mutating document tree.
///
/// Nodes are looked up by render id (the value of
/// [`RENDER_ID_ATTR`](crate::markup::RENDER_ID_ATTR)). `Node` is a handle,
/// not a borrow, so a node can be looked up and then replaced.
pub trait Document {
    type Node;

    fn find_by_id(&self, id: &str) -> Option<Self::Node>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn replace_content(&mut self, node: &Self::Node, markup: &str);
}

/// Handle to a node of a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct Node {
    attributes: BTreeMap<String, String>,
    content: String,
    removed: bool,
}

/// A content replacement performed on a [`MemoryDocument`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: String,
    pub markup: String,
}

/// Flat in-memory document of placeholder nodes.
///
/// Records every [`replace_content`](Document::replace_content) call so
/// callers can assert what landed where, and in which order.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    nodes: Vec<Node>,
    mutations: Vec<Mutation>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a placeholder carrying `id` and `source_hash`.
    pub fn insert_placeholder(&mut self, id: impl Into<String>, source_hash: impl Into<String>) -> NodeId {
        let attributes = BTreeMap::from([
            (RENDER_ID_ATTR.to_string(), id.into()),
            (SOURCE_HASH_ATTR.to_string(), source_hash.into()),
        ]);
        self.nodes.push(Node { attributes, ..Node::default() });
        NodeId(self.nodes.len() - 1)
    }

    /// Overwrite an attribute, as a regeneration that reuses the node's
    /// identity slot for different content would.
    pub fn set_attribute(&mut self, node: NodeId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(node.0) {
            node.attributes.insert(name.into(), value.into());
        }
    }

    /// Detach a node; it can no longer be found.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(node) = self.nodes.get_mut(node.0) {
            node.removed = true;
        }
    }

    pub fn content(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).filter(|node| !node.removed).map(|node| node.content.as_str())
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

impl Document for MemoryDocument {
    type Node = NodeId;

    fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| !node.removed && node.attributes.get(RENDER_ID_ATTR).is_some_and(|v| v == id))
            .map(NodeId)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.nodes.get(node.0)?.attributes.get(name).cloned()
    }

    fn replace_content(&mut self, node: &NodeId, markup: &str) {
        let Some(target) = self.nodes.get_mut(node.0) else {
            return;
        };
        target.content = markup.to_string();
        let id = target.attributes.get(RENDER_ID_ATTR).cloned().unwrap_or_default();
        self.mutations.push(Mutation { id, markup: markup.to_string() });
    }
}
