//! Arena-backed Patricia trie.

use super::arena::{Arena, Span};
use super::compare::{bytes_equal, common_prefix_len, fnv1a};

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy)]
struct KeyRef {
    span: Span,
    hash: u32,
}

#[derive(Debug, Default)]
struct Node {
    /// Edge label from the parent; empty only for the root.
    label: Span,
    /// Children keyed by the first byte of their label, kept sorted.
    children: Vec<(u8, NodeId)>,
    /// The key terminating at this node, if any.
    key: Option<KeyRef>,
}

/// A compressed trie over byte-string keys.
///
/// Every full key is copied into the arena once; edge labels are spans into
/// those copies, so a split rewrites two spans instead of copying bytes.
/// Removing a key detaches nodes left with neither a key nor children, but
/// single-child chains are not merged back together.
#[derive(Debug)]
pub struct RadixTree {
    arena: Arena,
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    len: usize,
}

impl Default for RadixTree {
    fn default() -> Self {
        Self {
            arena: Arena::default(),
            nodes: vec![Node::default()],
            free: Vec::new(),
            len: 0,
        }
    }
}

impl RadixTree {
    /// Inserts `key`. Returns false if it was already present or empty.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        if key.is_empty() {
            return false;
        }
        let hash = fnv1a(key);
        let mut node = ROOT;
        let mut depth = 0;

        loop {
            if depth == key.len() {
                if let Some(existing) = self.nodes[node].key {
                    if existing.span.len == key.len()
                        && existing.hash == hash
                        && bytes_equal(self.arena.get(existing.span), key)
                    {
                        return false;
                    }
                }
                let span = self.arena.push(key);
                if self.nodes[node].key.replace(KeyRef { span, hash }).is_none() {
                    self.len += 1;
                }
                return true;
            }

            let first = key[depth];
            match self.find_child(node, first) {
                Err(pos) => {
                    let span = self.arena.push(key);
                    let leaf = self.alloc(Node {
                        label: span.skip(depth),
                        children: Vec::new(),
                        key: Some(KeyRef { span, hash }),
                    });
                    self.nodes[node].children.insert(pos, (first, leaf));
                    self.len += 1;
                    return true;
                }
                Ok(pos) => {
                    let child = self.nodes[node].children[pos].1;
                    let label = self.nodes[child].label;
                    let common = common_prefix_len(self.arena.get(label), &key[depth..]);

                    if common < label.len {
                        let tail = label.skip(common);
                        let tail_first = self.arena.get(tail)[0];
                        let mid = self.alloc(Node {
                            label: label.take(common),
                            children: vec![(tail_first, child)],
                            key: None,
                        });
                        self.nodes[child].label = tail;
                        self.nodes[node].children[pos].1 = mid;
                        node = mid;
                    } else {
                        node = child;
                    }
                    depth += common;
                }
            }
        }
    }

    /// Removes `key`. Returns false if it was not present.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        let mut path = Vec::new();
        let Some(node) = self.descend(key, Some(&mut path)) else {
            return false;
        };
        if self.nodes[node].key.take().is_none() {
            return false;
        }
        self.len -= 1;

        let mut node = node;
        while let Some((parent, pos)) = path.pop() {
            let current = &self.nodes[node];
            if current.key.is_some() || !current.children.is_empty() {
                break;
            }
            self.nodes[parent].children.remove(pos);
            self.release(node);
            node = parent;
        }
        true
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.descend(key, None)
            .is_some_and(|node| self.nodes[node].key.is_some())
    }

    /// Calls `visit` with every key starting with `prefix`, in ascending
    /// byte order.
    pub fn visit_prefix(&self, prefix: &[u8], mut visit: impl FnMut(&[u8])) {
        let mut node = ROOT;
        let mut depth = 0;

        while depth < prefix.len() {
            let rest = &prefix[depth..];
            let Ok(pos) = self.find_child(node, rest[0]) else {
                return;
            };
            let child = self.nodes[node].children[pos].1;
            let label = self.arena.get(self.nodes[child].label);
            let common = common_prefix_len(label, rest);

            if common == rest.len() {
                node = child;
                break;
            }
            if common < label.len() {
                return;
            }
            node = child;
            depth += common;
        }

        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let n = &self.nodes[id];
            if let Some(key) = n.key {
                visit(self.arena.get(key.span));
            }
            stack.extend(n.children.iter().rev().map(|&(_, child)| child));
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes consumed by the arena, including space held by removed keys.
    #[must_use]
    pub fn arena_bytes(&self) -> usize {
        self.arena.len()
    }

    /// Nodes currently linked into the tree, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Walks to the node whose path spells exactly `key`.
    fn descend(&self, key: &[u8], mut path: Option<&mut Vec<(NodeId, usize)>>) -> Option<NodeId> {
        if key.is_empty() {
            return None;
        }
        let mut node = ROOT;
        let mut depth = 0;
        while depth < key.len() {
            let rest = &key[depth..];
            let pos = self.find_child(node, rest[0]).ok()?;
            let child = self.nodes[node].children[pos].1;
            let label = self.arena.get(self.nodes[child].label);
            if label.len() > rest.len() || common_prefix_len(label, rest) < label.len() {
                return None;
            }
            if let Some(path) = path.as_deref_mut() {
                path.push((node, pos));
            }
            node = child;
            depth += label.len();
        }
        Some(node)
    }

    fn find_child(&self, node: NodeId, first: u8) -> Result<usize, usize> {
        self.nodes[node]
            .children
            .binary_search_by_key(&first, |&(byte, _)| byte)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::default();
        self.free.push(id);
    }
}
