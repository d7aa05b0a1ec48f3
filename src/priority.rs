//! Stream dependency tree (RFC 7540 Section 5.3).
//!
//! Nodes live in an arena keyed by stream id; parent and children are stored
//! as ids. The root is the connection itself (id 0).

use std::collections::HashMap;

use tracing::debug;

pub const ROOT: u32 = 0;
pub const DEFAULT_WEIGHT: u16 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    parent: u32,
    weight: u16,
    children: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct PriorityTree {
    nodes: HashMap<u32, Node>,
}

impl Default for PriorityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT,
            Node {
                parent: ROOT,
                weight: DEFAULT_WEIGHT,
                children: Vec::new(),
            },
        );
        Self { nodes }
    }

    pub fn contains(&self, stream_id: u32) -> bool {
        self.nodes.contains_key(&stream_id)
    }

    /// Number of streams in the tree, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `stream_id` under the root with the default weight. No-op if
    /// it already exists.
    pub fn insert(&mut self, stream_id: u32) {
        if stream_id == ROOT || self.nodes.contains_key(&stream_id) {
            return;
        }
        self.nodes.insert(
            stream_id,
            Node {
                parent: ROOT,
                weight: DEFAULT_WEIGHT,
                children: Vec::new(),
            },
        );
        self.link(stream_id, ROOT);
    }

    /// Remove a stream, handing its children to its parent.
    pub fn remove(&mut self, stream_id: u32) {
        if stream_id == ROOT {
            return;
        }
        let Some(node) = self.nodes.remove(&stream_id) else {
            return;
        };
        self.unlink(stream_id, node.parent);
        for child in node.children {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parent = node.parent;
            }
            self.link(child, node.parent);
        }
    }

    pub fn parent(&self, stream_id: u32) -> Option<u32> {
        self.nodes.get(&stream_id).map(|n| n.parent)
    }

    pub fn weight(&self, stream_id: u32) -> Option<u16> {
        self.nodes.get(&stream_id).map(|n| n.weight)
    }

    pub fn children(&self, stream_id: u32) -> &[u32] {
        self.nodes.get(&stream_id).map_or(&[], |n| n.children.as_slice())
    }

    /// Whether `candidate` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, candidate: u32, ancestor: u32) -> bool {
        let mut current = candidate;
        // Bounded by the node count so a corrupted tree cannot spin forever.
        for _ in 0..self.nodes.len() {
            if current == ROOT {
                return false;
            }
            match self.nodes.get(&current) {
                Some(node) => {
                    if node.parent == ancestor {
                        return true;
                    }
                    current = node.parent;
                }
                None => return false,
            }
        }
        false
    }

    /// Move `stream_id` under `new_parent`.
    ///
    /// Unknown streams (on either side) are first inserted under the root.
    /// A `weight` of 0 keeps the current weight. If `new_parent` is currently
    /// a descendant of `stream_id`, it is first moved to `stream_id`'s old
    /// parent so the result stays a tree. With `exclusive`, every other child
    /// of `new_parent` becomes a child of `stream_id`.
    ///
    /// Callers reject `stream_id == new_parent` before getting here; the tree
    /// ignores such a request.
    pub fn reparent(&mut self, stream_id: u32, new_parent: u32, exclusive: bool, weight: u16) {
        if stream_id == ROOT || stream_id == new_parent {
            return;
        }
        self.insert(stream_id);
        self.insert(new_parent);

        if weight > 0 {
            if let Some(node) = self.nodes.get_mut(&stream_id) {
                node.weight = weight;
            }
        }

        let old_parent = self.parent(stream_id).unwrap_or(ROOT);
        if self.is_descendant(new_parent, stream_id) {
            let target_parent = self.parent(new_parent).unwrap_or(ROOT);
            self.unlink(new_parent, target_parent);
            self.link(new_parent, old_parent);
        }

        self.unlink(stream_id, old_parent);
        self.link(stream_id, new_parent);

        if exclusive {
            let siblings: Vec<u32> = self
                .children(new_parent)
                .iter()
                .copied()
                .filter(|&c| c != stream_id)
                .collect();
            for sibling in siblings {
                self.unlink(sibling, new_parent);
                self.link(sibling, stream_id);
            }
        }

        debug!(stream_id, new_parent, exclusive, weight, "stream reprioritized");
    }

    fn link(&mut self, child: u32, parent: u32) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = parent;
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
    }

    fn unlink(&mut self, child: u32, parent: u32) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|&c| c != child);
        }
    }

    /// Check structural consistency: every node reaches the root and
    /// parent/child links agree.
    pub fn is_consistent(&self) -> bool {
        self.nodes.iter().all(|(&id, node)| {
            if id == ROOT {
                return true;
            }
            let linked = self
                .nodes
                .get(&node.parent)
                .is_some_and(|p| p.children.contains(&id));
            linked && !self.is_descendant(id, id) && self.reaches_root(id)
        })
    }

    fn reaches_root(&self, stream_id: u32) -> bool {
        let mut current = stream_id;
        for _ in 0..=self.nodes.len() {
            if current == ROOT {
                return true;
            }
            match self.nodes.get(&current) {
                Some(node) => current = node.parent,
                None => return false,
            }
        }
        false
    }
}
