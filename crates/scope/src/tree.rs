//! Ownership tree of scopes and cleanup records.
//!
//! Every resource is a node in one arena. A scope owns an ordered list of
//! children (scopes or cleanup records); teardown always takes the most
//! recently added child first, so release order is the exact reverse of
//! registration order at every depth.
//!
//! The tree has a permanent top scope. Destroying it releases everything the
//! process registered but keeps the node itself, so there is always a current
//! scope to register into.

use crate::arena::{Arena, ArenaFull, NodeIndex};
use crate::cleanup::{CleanupRecord, Release};
use tracing::{debug, trace};

/// Identifies a scope node.
///
/// Ids stay valid until the scope is torn down; afterwards every operation
/// taking the id treats it as already destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) NodeIndex);

#[derive(Debug)]
pub(crate) struct ScopeNode {
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Scope(ScopeNode),
    Cleanup(CleanupRecord),
}

#[derive(Debug)]
pub(crate) struct ResourceTree {
    nodes: Arena<Node>,
    top: NodeIndex,
    current: NodeIndex,
}

impl ResourceTree {
    pub(crate) fn new() -> Self {
        let mut nodes = Arena::new();
        let top = nodes
            .try_insert(Node::Scope(ScopeNode {
                parent: None,
                children: Vec::new(),
            }))
            .unwrap_or_else(|_| std::process::abort());
        Self {
            nodes,
            top,
            current: top,
        }
    }

    pub(crate) fn top(&self) -> ScopeId {
        ScopeId(self.top)
    }

    pub(crate) fn current(&self) -> ScopeId {
        ScopeId(self.current)
    }

    /// Makes `scope` current. Stale ids fall back to the top scope.
    pub(crate) fn set_current(&mut self, scope: ScopeId) {
        self.current = if self.is_scope(scope.0) {
            scope.0
        } else {
            self.top
        };
    }

    pub(crate) fn contains(&self, scope: ScopeId) -> bool {
        self.is_scope(scope.0)
    }

    pub(crate) fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scope(scope.0)?.parent.map(ScopeId)
    }

    /// Number of direct children of `scope`, `None` if it is gone.
    pub(crate) fn child_count(&self, scope: ScopeId) -> Option<usize> {
        self.scope(scope.0).map(|node| node.children.len())
    }

    /// Number of live nodes, top scope included.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Creates a child of the current scope and makes it current.
    pub(crate) fn push_new(&mut self) -> Result<ScopeId, ArenaFull> {
        let parent = self.current;
        let index = self.insert_child(Node::Scope(ScopeNode {
            parent: Some(parent),
            children: Vec::new(),
        }))?;
        self.current = index;
        trace!(scope = ?index, parent = ?parent, "pushed scope");
        Ok(ScopeId(index))
    }

    /// Makes the parent of the current scope current without releasing
    /// anything, and returns the scope that was popped.
    pub(crate) fn pop_without_destroy(&mut self) -> ScopeId {
        let popped = self.current;
        if let Some(parent) = self.scope(popped).and_then(|node| node.parent) {
            self.current = parent;
            trace!(scope = ?popped, parent = ?parent, "popped scope");
        }
        ScopeId(popped)
    }

    /// Appends an uncommitted cleanup record to the current scope.
    pub(crate) fn insert_cleanup(&mut self) -> Result<NodeIndex, ArenaFull> {
        let owner = self.current;
        self.insert_child(Node::Cleanup(CleanupRecord::reserved(owner)))
    }

    /// Attaches `release` to a reserved record. Returns false when the record
    /// was already torn down, in which case `release` runs immediately.
    pub(crate) fn attach(&mut self, record: NodeIndex, release: Release) -> bool {
        match self.nodes.get_mut(record) {
            Some(Node::Cleanup(cleanup)) => {
                cleanup.commit(release);
                true
            }
            _ => {
                debug!(record = ?record, "commit on a record whose scope is gone, releasing now");
                release.run();
                false
            }
        }
    }

    pub(crate) fn cleanup(&self, record: NodeIndex) -> Option<&CleanupRecord> {
        match self.nodes.get(record)? {
            Node::Cleanup(cleanup) => Some(cleanup),
            Node::Scope(_) => None,
        }
    }

    pub(crate) fn cleanup_mut(&mut self, record: NodeIndex) -> Option<&mut CleanupRecord> {
        match self.nodes.get_mut(record)? {
            Node::Cleanup(cleanup) => Some(cleanup),
            Node::Scope(_) => None,
        }
    }

    /// Tears down `scope` and everything beneath it.
    ///
    /// Returns false, doing nothing, when the scope no longer exists. If the
    /// current scope lived inside the destroyed subtree, the destroyed scope's
    /// parent becomes current.
    pub(crate) fn destroy(&mut self, scope: ScopeId) -> bool {
        let Some(node) = self.scope(scope.0) else {
            return false;
        };
        let parent = node.parent;

        if self.is_ancestor_or_self(scope.0, self.current) {
            self.current = parent.unwrap_or(self.top);
        }

        if let Some(parent) = parent {
            if let Some(Node::Scope(parent_node)) = self.nodes.get_mut(parent) {
                if let Some(pos) = parent_node.children.iter().rposition(|&c| c == scope.0) {
                    parent_node.children.remove(pos);
                }
            }
        }

        let before = self.nodes.len();
        self.teardown(scope.0);
        debug!(
            scope = ?scope.0,
            released = before - self.nodes.len(),
            "destroyed scope"
        );
        true
    }

    /// Releases everything beneath `root`, then `root` itself unless it is
    /// the top scope.
    ///
    /// Iterative: descends into the newest child and climbs back through the
    /// stored parent links, so depth costs neither stack nor heap.
    fn teardown(&mut self, root: NodeIndex) {
        let mut node = root;
        loop {
            if let Some(child) = self.pop_last_child(node) {
                match self.nodes.get(child) {
                    Some(Node::Scope(_)) => node = child,
                    Some(Node::Cleanup(_)) => {
                        if let Some(Node::Cleanup(record)) = self.nodes.remove(child) {
                            record.release();
                        }
                    }
                    None => {}
                }
                continue;
            }

            if node == root {
                if root != self.top {
                    self.nodes.remove(root);
                }
                return;
            }
            let parent = self.scope(node).and_then(|scope| scope.parent);
            self.nodes.remove(node);
            match parent {
                Some(parent) => node = parent,
                None => return,
            }
        }
    }

    fn pop_last_child(&mut self, index: NodeIndex) -> Option<NodeIndex> {
        match self.nodes.get_mut(index)? {
            Node::Scope(node) => node.children.pop(),
            Node::Cleanup(_) => None,
        }
    }

    fn insert_child(&mut self, node: Node) -> Result<NodeIndex, ArenaFull> {
        let parent = self.current;
        match self.nodes.get_mut(parent) {
            Some(Node::Scope(scope)) => scope.children.try_reserve(1).map_err(|_| ArenaFull)?,
            _ => unreachable!("current scope is always live"),
        }
        let index = self.nodes.try_insert(node)?;
        if let Some(Node::Scope(scope)) = self.nodes.get_mut(parent) {
            scope.children.push(index);
        }
        Ok(index)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeIndex, mut node: NodeIndex) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.scope(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn is_scope(&self, index: NodeIndex) -> bool {
        self.scope(index).is_some()
    }

    fn scope(&self, index: NodeIndex) -> Option<&ScopeNode> {
        match self.nodes.get(index)? {
            Node::Scope(node) => Some(node),
            Node::Cleanup(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn logging(log: &Rc<RefCell<Vec<&'static str>>>, entry: &'static str) -> Release {
        let log = Rc::clone(log);
        Release::Action(Box::new(move || log.borrow_mut().push(entry)))
    }

    fn commit(tree: &mut ResourceTree, release: Release) {
        let record = tree.insert_cleanup().unwrap();
        assert!(tree.attach(record, release));
    }

    #[test]
    fn test_destroy_runs_nested_cleanups_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ResourceTree::new();

        let root = tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "A"));
        tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "B"));

        assert!(tree.destroy(root));
        assert_eq!(*log.borrow(), vec!["B", "A"]);
        assert_eq!(tree.current(), tree.top());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_reserved_record_is_a_no_op() {
        let mut tree = ResourceTree::new();
        let scope = tree.push_new().unwrap();
        tree.insert_cleanup().unwrap();
        assert_eq!(tree.child_count(scope), Some(1));
        assert!(tree.destroy(scope));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_pop_keeps_subtree_alive() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ResourceTree::new();
        let outer = tree.push_new().unwrap();
        let inner = tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "inner"));

        assert_eq!(tree.pop_without_destroy(), inner);
        assert_eq!(tree.current(), outer);
        assert!(tree.contains(inner));
        assert!(log.borrow().is_empty());

        assert!(tree.destroy(inner));
        assert_eq!(*log.borrow(), vec!["inner"]);
        assert_eq!(tree.child_count(outer), Some(0));
    }

    #[test]
    fn test_destroy_stale_scope_returns_false() {
        let mut tree = ResourceTree::new();
        let scope = tree.push_new().unwrap();
        assert!(tree.destroy(scope));
        assert!(!tree.destroy(scope));
        assert_eq!(tree.parent(scope), None);
    }

    #[test]
    fn test_destroying_top_keeps_the_node() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ResourceTree::new();
        commit(&mut tree, logging(&log, "top"));
        tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "child"));

        let top = tree.top();
        assert!(tree.destroy(top));
        assert_eq!(*log.borrow(), vec!["child", "top"]);
        assert!(tree.contains(top));
        assert_eq!(tree.current(), top);
        assert_eq!(tree.child_count(top), Some(0));
    }

    #[test]
    fn test_destroying_sibling_leaves_current_alone() {
        let mut tree = ResourceTree::new();
        let first = tree.push_new().unwrap();
        tree.pop_without_destroy();
        let second = tree.push_new().unwrap();

        assert!(tree.destroy(first));
        assert_eq!(tree.current(), second);
    }

    #[test]
    fn test_attach_after_teardown_releases_immediately() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ResourceTree::new();
        let scope = tree.push_new().unwrap();
        let record = tree.insert_cleanup().unwrap();
        tree.destroy(scope);

        assert!(!tree.attach(record, logging(&log, "late")));
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn test_deep_nesting_tears_down_in_reverse() {
        const DEPTH: usize = 100_000;
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ResourceTree::new();

        let root = tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "shallowest"));
        for _ in 0..DEPTH {
            tree.push_new().unwrap();
        }
        commit(&mut tree, logging(&log, "deepest"));

        assert!(tree.destroy(root));
        assert_eq!(*log.borrow(), vec!["deepest", "shallowest"]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.current(), tree.top());
    }

    #[test]
    fn test_teardown_interleaves_siblings_and_nested_scopes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = ResourceTree::new();

        let root = tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "1"));
        tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "2"));
        tree.pop_without_destroy();
        commit(&mut tree, logging(&log, "3"));
        tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "4"));
        tree.push_new().unwrap();
        commit(&mut tree, logging(&log, "5"));

        assert!(tree.destroy(root));
        assert_eq!(*log.borrow(), vec!["5", "4", "3", "2", "1"]);
        assert_eq!(tree.len(), 1);
    }
}
