/// The stage tree — an arena of stage records with ordered child
/// lists and parent back-links.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::{Casting, Stage};

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("stage {0:?} does not exist in the tree")]
    UnknownStage(StageId),
    #[error("the root stage cannot have siblings")]
    RootSibling,
    #[error("the root stage cannot be removed")]
    RootRemoval,
}

/// Newtype wrapper for stage arena slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub usize);

/// An ordered, rooted tree of stages. The tree exclusively owns its
/// nodes; removing a stage removes its whole subtree. The root always
/// exists and occupies slot 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTree {
    nodes: Vec<Option<Stage>>,
    free: Vec<usize>,
}

impl StageTree {
    /// Create a tree holding only a root stage with no casting
    /// assignment — the propagation origin.
    pub fn new(root_name: impl Into<String>) -> StageTree {
        StageTree {
            nodes: vec![Some(Stage::new(root_name, Casting::Unassigned, None))],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> StageId {
        StageId(0)
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// Number of live stages.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the root always exists
    }

    /// Upper bound on slot indices, for per-slot scratch buffers.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a new stage as the last child of `parent`.
    pub fn add_child(
        &mut self,
        parent: StageId,
        name: impl Into<String>,
        casting: Casting,
    ) -> Result<StageId, TreeError> {
        self.require(parent)?;
        let id = self.alloc(Stage::new(name, casting, Some(parent)));
        if let Some(node) = self.get_mut(parent) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Append a new stage as the last child of `reference`'s parent.
    /// The root has no parent, so it cannot take siblings.
    pub fn add_sibling(
        &mut self,
        reference: StageId,
        name: impl Into<String>,
        casting: Casting,
    ) -> Result<StageId, TreeError> {
        let parent = self
            .get(reference)
            .ok_or(TreeError::UnknownStage(reference))?
            .parent
            .ok_or(TreeError::RootSibling)?;
        self.add_child(parent, name, casting)
    }

    /// Remove a stage and its whole subtree. The root is conventionally
    /// unremovable.
    pub fn remove(&mut self, id: StageId) -> Result<(), TreeError> {
        let node = self.get(id).ok_or(TreeError::UnknownStage(id))?;
        let parent = node.parent.ok_or(TreeError::RootRemoval)?;
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != id);
        }
        for sub in self.subtree(id) {
            self.nodes[sub.0] = None;
            self.free.push(sub.0);
        }
        Ok(())
    }

    /// Deep-copy the subtree rooted at `source` and attach the copy as
    /// the last child of `destination`. The copy is a snapshot, so
    /// replicating a stage into its own subtree is well-defined.
    pub fn clone_subtree(
        &mut self,
        source: StageId,
        destination: StageId,
    ) -> Result<StageId, TreeError> {
        self.require(source)?;
        self.require(destination)?;
        let snapshot: Vec<(StageId, Stage)> = self
            .subtree(source)
            .into_iter()
            .map(|id| (id, self.nodes[id.0].clone().expect("live subtree node")))
            .collect();
        // Map original ids to their copies, parents before children
        // (subtree order is pre-order).
        let mut mapping = rustc_hash::FxHashMap::default();
        let mut copy_root = None;
        for (old_id, stage) in snapshot {
            let parent = if old_id == source {
                destination
            } else {
                mapping[&stage.parent.expect("non-root subtree node has parent")]
            };
            let new_id = self.alloc(Stage {
                name: stage.name,
                casting: stage.casting,
                report: stage.report,
                hierarchical_id: String::new(),
                parent: Some(parent),
                children: Vec::new(),
            });
            if let Some(p) = self.get_mut(parent) {
                p.children.push(new_id);
            }
            mapping.insert(old_id, new_id);
            if old_id == source {
                copy_root = Some(new_id);
            }
        }
        Ok(copy_root.expect("subtree contains its own root"))
    }

    /// Pre-order (depth-first, children in order) traversal of the
    /// whole tree.
    pub fn preorder(&self) -> Vec<StageId> {
        self.subtree(self.root())
    }

    /// Pre-order traversal of the subtree rooted at `id`.
    pub fn subtree(&self, id: StageId) -> Vec<StageId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev());
        }
        order
    }

    /// Depth of a stage below the root (root = 0).
    pub fn depth(&self, id: StageId) -> Result<usize, TreeError> {
        let mut depth = 0;
        let mut current = self.get(id).ok_or(TreeError::UnknownStage(id))?;
        while let Some(parent) = current.parent {
            depth += 1;
            current = self.get(parent).ok_or(TreeError::UnknownStage(parent))?;
        }
        Ok(depth)
    }

    pub(crate) fn require(&self, id: StageId) -> Result<(), TreeError> {
        self.get(id).map(|_| ()).ok_or(TreeError::UnknownStage(id))
    }

    fn alloc(&mut self, stage: Stage) -> StageId {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = Some(stage);
            StageId(slot)
        } else {
            self.nodes.push(Some(stage));
            StageId(self.nodes.len() - 1)
        }
    }
}

impl Default for StageTree {
    fn default() -> Self {
        StageTree::new("Start")
    }
}
