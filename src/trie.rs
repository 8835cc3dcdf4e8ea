//! Path-segment trie backed by a node arena
//!
//! Nodes live in a single table and refer to each other through `NodeId`
//! handles. Directory nodes map segment names to children; leaf nodes hold a
//! value. The root is always a directory and is never freed.
//!
//! Invariant: apart from the root, no directory node is ever left without
//! children. Removal prunes emptied directories bottom-up, and insertion
//! validates the whole path before creating any node.

use crate::error::{Result, UploadError};
use crate::path::RemotePath;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
enum NodeKind<T> {
    Directory(BTreeMap<String, NodeId>),
    Leaf(T),
}

#[derive(Debug)]
struct Node<T> {
    parent: Option<NodeId>,
    name: String,
    kind: NodeKind<T>,
}

#[derive(Debug)]
pub struct PathTrie<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    leaf_count: usize,
}

const ROOT: NodeId = NodeId(0);

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathTrie<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                parent: None,
                name: String::new(),
                kind: NodeKind::Directory(BTreeMap::new()),
            })],
            free: Vec::new(),
            leaf_count: 0,
        }
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Insert `value` as the leaf at `path`
    ///
    /// Returns the value previously stored at that leaf, if any. Fails without
    /// touching the trie when the path is the root, passes through an existing
    /// leaf, or ends on an existing directory.
    pub fn insert(&mut self, path: &RemotePath, value: T) -> Result<Option<T>> {
        let segments = path.segments();
        let Some((last, parents)) = segments.split_last() else {
            return Err(UploadError::invalid_path("", "cannot insert at the root"));
        };

        // Validate first so a conflict never leaves freshly created directories behind.
        let mut cursor = Some(ROOT);
        for segment in parents {
            let Some(id) = cursor else { break };
            match self.child(id, segment) {
                Some(child) if self.is_leaf(child) => {
                    return Err(UploadError::path_conflict(path.to_string()))
                }
                next => cursor = next,
            }
        }
        if let Some(id) = cursor {
            if let Some(child) = self.child(id, last) {
                if !self.is_leaf(child) {
                    return Err(UploadError::path_conflict(path.to_string()));
                }
            }
        }

        let mut dir = ROOT;
        for segment in parents {
            dir = match self.child(dir, segment) {
                Some(child) => child,
                None => self.attach(
                    dir,
                    segment.clone(),
                    NodeKind::Directory(BTreeMap::new()),
                ),
            };
        }

        if let Some(existing) = self.child(dir, last) {
            let node = self.node_mut(existing);
            let previous = std::mem::replace(&mut node.kind, NodeKind::Leaf(value));
            return Ok(match previous {
                NodeKind::Leaf(old) => Some(old),
                NodeKind::Directory(_) => None,
            });
        }

        self.attach(dir, last.clone(), NodeKind::Leaf(value));
        self.leaf_count += 1;
        Ok(None)
    }

    /// Remove the leaf at `path`, pruning directories it leaves empty
    pub fn remove(&mut self, path: &RemotePath) -> Option<T> {
        let id = self.find(path)?;
        if !self.is_leaf(id) {
            return None;
        }
        self.detach_leaf(id)
    }

    /// Get the leaf value at `path`
    pub fn get(&self, path: &RemotePath) -> Option<&T> {
        let id = self.find(path)?;
        match &self.node(id).kind {
            NodeKind::Leaf(value) => Some(value),
            NodeKind::Directory(_) => None,
        }
    }

    /// All leaf values at or beneath `path`, in segment order
    pub fn leaves(&self, path: &RemotePath) -> Vec<&T> {
        let mut out = Vec::new();
        if let Some(id) = self.find(path) {
            let mut stack = vec![id];
            while let Some(id) = stack.pop() {
                match &self.node(id).kind {
                    NodeKind::Leaf(value) => out.push(value),
                    NodeKind::Directory(children) => stack.extend(children.values().rev()),
                }
            }
        }
        out
    }

    /// Names of the directory children of `path`
    pub fn directories(&self, path: &RemotePath) -> Vec<String> {
        self.children_of(path)
            .filter(|(_, id)| !self.is_leaf(**id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names and values of the leaf children of `path`
    pub fn files(&self, path: &RemotePath) -> Vec<(String, &T)> {
        self.children_of(path)
            .filter_map(|(name, id)| match &self.node(*id).kind {
                NodeKind::Leaf(value) => Some((name.clone(), value)),
                NodeKind::Directory(_) => None,
            })
            .collect()
    }

    /// True if some non-root directory has no children
    pub fn has_empty_directories(&self) -> bool {
        self.nodes.iter().enumerate().any(|(index, slot)| {
            index != ROOT.0
                && matches!(
                    slot,
                    Some(Node { kind: NodeKind::Directory(children), .. }) if children.is_empty()
                )
        })
    }

    fn find(&self, path: &RemotePath) -> Option<NodeId> {
        path.segments()
            .iter()
            .try_fold(ROOT, |id, segment| self.child(id, segment))
    }

    fn children_of<'a>(
        &'a self,
        path: &RemotePath,
    ) -> Box<dyn Iterator<Item = (&'a String, &'a NodeId)> + 'a> {
        match self.find(path).map(|id| &self.node(id).kind) {
            Some(NodeKind::Directory(children)) => Box::new(children.iter()),
            _ => Box::new(std::iter::empty()),
        }
    }

    fn child(&self, id: NodeId, segment: &str) -> Option<NodeId> {
        match &self.node(id).kind {
            NodeKind::Directory(children) => children.get(segment).copied(),
            NodeKind::Leaf(_) => None,
        }
    }

    fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Leaf(_))
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        self.nodes[id.0]
            .as_ref()
            .expect("trie handle points at a freed slot")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        self.nodes[id.0]
            .as_mut()
            .expect("trie handle points at a freed slot")
    }

    fn attach(&mut self, parent: NodeId, name: String, kind: NodeKind<T>) -> NodeId {
        let node = Node {
            parent: Some(parent),
            name: name.clone(),
            kind,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let NodeKind::Directory(children) = &mut self.node_mut(parent).kind {
            children.insert(name, id);
        }
        id
    }

    fn release(&mut self, id: NodeId) -> Node<T> {
        let node = self.nodes[id.0]
            .take()
            .expect("trie handle points at a freed slot");
        self.free.push(id.0);
        if let Some(parent) = node.parent {
            if let NodeKind::Directory(children) = &mut self.node_mut(parent).kind {
                children.remove(&node.name);
            }
        }
        node
    }

    fn detach_leaf(&mut self, id: NodeId) -> Option<T> {
        let node = self.release(id);
        self.leaf_count -= 1;

        let mut cursor = node.parent;
        while let Some(dir) = cursor {
            if dir == ROOT {
                break;
            }
            let empty = matches!(&self.node(dir).kind, NodeKind::Directory(c) if c.is_empty());
            if !empty {
                break;
            }
            cursor = self.release(dir).parent;
        }

        match node.kind {
            NodeKind::Leaf(value) => Some(value),
            NodeKind::Directory(_) => None,
        }
    }
}

impl<T: PartialEq> PathTrie<T> {
    /// Remove the leaf at `path` only if it still holds `expected`
    pub fn remove_if(&mut self, path: &RemotePath, expected: &T) -> bool {
        match self.get(path) {
            Some(value) if value == expected => self.remove(path).is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn p(s: &str) -> RemotePath {
        RemotePath::parse(s).unwrap()
    }

    #[test]
    fn test_insert_and_leaves() {
        let mut trie = PathTrie::new();
        trie.insert(&p("up/x.txt"), 1).unwrap();
        trie.insert(&p("up/sub/y.txt"), 2).unwrap();
        trie.insert(&p("other/z.txt"), 3).unwrap();

        assert_eq!(trie.len(), 3);
        assert_eq!(trie.leaves(&p("up")), vec![&2, &1]);
        assert_eq!(trie.leaves(&p("up/sub")), vec![&2]);
        assert_eq!(trie.leaves(&p("up/sub/y.txt")), vec![&2]);
        assert_eq!(trie.leaves(&RemotePath::root()).len(), 3);
        assert!(trie.leaves(&p("missing")).is_empty());
    }

    #[test]
    fn test_insert_replaces_leaf() {
        let mut trie = PathTrie::new();
        assert_eq!(trie.insert(&p("a/b"), 1).unwrap(), None);
        assert_eq!(trie.insert(&p("a/b"), 2).unwrap(), Some(1));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get(&p("a/b")), Some(&2));
    }

    #[test]
    fn test_conflicts_leave_trie_untouched() {
        let mut trie = PathTrie::new();
        trie.insert(&p("a/file"), 1).unwrap();

        let err = trie.insert(&p("a/file/deeper/x"), 2).unwrap_err();
        assert!(matches!(err, UploadError::PathConflict { .. }));

        let err = trie.insert(&p("a"), 3).unwrap_err();
        assert!(matches!(err, UploadError::PathConflict { .. }));

        assert!(trie.insert(&RemotePath::root(), 4).is_err());
        assert_eq!(trie.len(), 1);
        assert!(!trie.has_empty_directories());
    }

    #[test]
    fn test_remove_prunes_empty_directories() {
        let mut trie = PathTrie::new();
        trie.insert(&p("a/b/c/d.txt"), 1).unwrap();
        trie.insert(&p("a/e.txt"), 2).unwrap();

        assert_eq!(trie.remove(&p("a/b/c/d.txt")), Some(1));
        assert!(!trie.has_empty_directories());
        assert!(trie.directories(&p("a")).is_empty());
        assert_eq!(trie.files(&p("a")), vec![("e.txt".to_string(), &2)]);

        assert_eq!(trie.remove(&p("a/e.txt")), Some(2));
        assert!(trie.is_empty());
        assert!(trie.directories(&RemotePath::root()).is_empty());
        assert!(!trie.has_empty_directories());
    }

    #[test]
    fn test_remove_directory_path_is_noop() {
        let mut trie = PathTrie::new();
        trie.insert(&p("a/b.txt"), 1).unwrap();
        assert_eq!(trie.remove(&p("a")), None);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_remove_if_checks_value() {
        let mut trie = PathTrie::new();
        trie.insert(&p("a/b.txt"), 1).unwrap();
        trie.insert(&p("a/b.txt"), 2).unwrap();
        assert!(!trie.remove_if(&p("a/b.txt"), &1));
        assert!(trie.remove_if(&p("a/b.txt"), &2));
        assert!(trie.is_empty());
    }

    #[test]
    fn test_listing_at_path() {
        let mut trie = PathTrie::new();
        trie.insert(&p("docs/a.txt"), 1).unwrap();
        trie.insert(&p("docs/img/b.png"), 2).unwrap();
        trie.insert(&p("docs/img/c.png"), 3).unwrap();

        assert_eq!(trie.directories(&p("docs")), vec!["img".to_string()]);
        assert_eq!(trie.files(&p("docs")), vec![("a.txt".to_string(), &1)]);
        assert_eq!(trie.directories(&RemotePath::root()), vec!["docs".to_string()]);
        assert!(trie.files(&p("docs/a.txt")).is_empty());
    }

    #[test]
    fn test_slots_are_reused() {
        let mut trie = PathTrie::new();
        for round in 0..10 {
            trie.insert(&p("x/y/z.bin"), round).unwrap();
            trie.remove(&p("x/y/z.bin"));
        }
        // root + x + y + z.bin
        assert!(trie.nodes.len() <= 4);
        assert!(!trie.has_empty_directories());
    }

    /// Deterministic LCG so failures reproduce
    struct Lcg(u64);

    impl Lcg {
        fn below(&mut self, bound: usize) -> usize {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize) % bound
        }

        fn shuffle<T>(&mut self, items: &mut [T]) {
            for i in (1..items.len()).rev() {
                items.swap(i, self.below(i + 1));
            }
        }
    }

    fn is_conflict(held: &HashMap<usize, usize>, paths: &[&str], index: usize) -> bool {
        let new: Vec<&str> = paths[index].split('/').collect();
        held.keys().filter(|&&i| i != index).any(|&i| {
            let old: Vec<&str> = paths[i].split('/').collect();
            let n = old.len().min(new.len());
            old.len() != new.len() && old[..n] == new[..n]
        })
    }

    fn assert_invariants(trie: &PathTrie<usize>, held: &HashMap<usize, usize>) {
        assert!(!trie.has_empty_directories());
        assert_eq!(trie.len(), held.len());
        assert_eq!(trie.leaves(&RemotePath::root()).len(), held.len());
    }

    #[test]
    fn test_random_sequence_keeps_invariant() {
        let paths = [
            "a/b/c", "a/b/d", "a/e", "f", "g/h/i/j", "g/h/k", "a/b", "g/h/i",
        ];
        let mut rng = Lcg(0x2545_F491_4F6C_DD1D);
        let mut trie = PathTrie::new();
        let mut held: HashMap<usize, usize> = HashMap::new();
        let mut removed = vec![false; paths.len()];

        for step in 0..400usize {
            let index = rng.below(paths.len());
            let path = p(paths[index]);
            if rng.below(5) < 2 {
                let taken = trie.remove(&path);
                assert_eq!(taken, held.remove(&index));
                removed[index] |= taken.is_some();
            } else if is_conflict(&held, &paths, index) {
                assert!(trie.insert(&path, step).is_err());
                assert_eq!(trie.get(&path), None);
            } else {
                assert_eq!(trie.insert(&path, step).unwrap(), held.insert(index, step));
            }
            assert_invariants(&trie, &held);
            for (i, value) in &held {
                assert_eq!(trie.get(&p(paths[*i])), Some(value));
            }
        }
        assert!(removed.iter().filter(|r| **r).count() >= paths.len() / 2);

        // drain everything, then prune the deepest chains leaf by leaf
        let mut order: Vec<usize> = held.keys().copied().collect();
        rng.shuffle(&mut order);
        for index in order {
            assert!(trie.remove(&p(paths[index])).is_some());
            held.remove(&index);
            assert_invariants(&trie, &held);
        }
        assert!(trie.is_empty());

        let mut deep = vec![0usize, 1, 2, 3, 4, 5];
        for &index in &deep {
            trie.insert(&p(paths[index]), index).unwrap();
            held.insert(index, index);
        }
        rng.shuffle(&mut deep);
        for index in deep {
            assert_eq!(trie.remove(&p(paths[index])), Some(index));
            held.remove(&index);
            assert_invariants(&trie, &held);
        }
        assert!(trie.directories(&RemotePath::root()).is_empty());
        assert!(trie.files(&RemotePath::root()).is_empty());
    }
}
