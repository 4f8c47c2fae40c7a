use crate::backend::Backend;
use crate::entity::EntityId;
use crate::patch::{NodeId, Patch};
use crate::rect::Rect;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that may occur when running a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError<E: fmt::Debug> {
    #[error("no such node: {0:?}")]
    NoSuchNode(NodeId),
    #[error("backend error: {0:?}")]
    Backend(E),
    #[error("{0:?} would become its own ancestor")]
    Cycle(NodeId),
}

struct NVTNode<R> {
    key: EntityId,
    backing_ref: R,
    superview: Option<NodeId>,
    subviews: Vec<NodeId>,
    anchored: bool,
}

/// The native-view tree: mirrors the node structure of the backend.
pub struct NVTree<B: Backend> {
    nodes: HashMap<NodeId, NVTNode<B::NodeRef>>,
    anchored: Vec<NodeId>,
    backend: B,
}

type PatchResult<B> = Result<(), PatchError<<B as Backend>::Error>>;

impl<B: Backend> NVTree<B> {
    pub fn new(backend: B) -> NVTree<B> {
        NVTree {
            nodes: HashMap::new(),
            anchored: Vec::new(),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The entity a node was created for.
    pub fn key(&self, id: NodeId) -> Option<&EntityId> {
        self.nodes.get(&id).map(|node| &node.key)
    }

    pub fn superview(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.superview)
    }

    pub fn subviews(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.subviews.as_slice())
            .unwrap_or(&[])
    }

    /// Entity keys of a node's subviews, in order.
    pub fn subview_keys(&self, id: NodeId) -> Vec<EntityId> {
        self.subviews(id)
            .iter()
            .filter_map(|sub| self.key(*sub).cloned())
            .collect()
    }

    /// Nodes attached directly under the anchor.
    pub fn anchored(&self) -> &[NodeId] {
        &self.anchored
    }

    /// Patches the tree.
    pub fn patch(&mut self, patch: Patch) -> PatchResult<B> {
        match patch {
            Patch::Create(id, key) => self.create(id, key),
            Patch::Destroy(id) => self.destroy(id),
            Patch::SetDomId(id, dom_id) => self.with_node(id, |backend, node| {
                backend.set_dom_id(&mut node.backing_ref, dom_id.as_deref())
            }),
            Patch::SetClasses(id, classes) => self.with_node(id, |backend, node| {
                backend.set_classes(&mut node.backing_ref, &classes)
            }),
            Patch::SetStyle(id, name, value) => self.with_node(id, |backend, node| {
                backend.set_style(&mut node.backing_ref, &name, &value)
            }),
            Patch::RemoveStyle(id, name) => self.with_node(id, |backend, node| {
                backend.remove_style(&mut node.backing_ref, &name)
            }),
            Patch::SetContent(id, content) => self.with_node(id, |backend, node| {
                backend.set_content(&mut node.backing_ref, content.as_deref())
            }),
            Patch::InsertSubview {
                parent,
                child,
                before,
            } => self.insert_subview(parent, child, before),
            Patch::RemoveSubview { parent, child } => {
                if self.superview(child) != Some(parent) {
                    return Err(PatchError::NoSuchNode(child));
                }
                self.detach(child)
            }
            Patch::AttachToAnchor(id) => self.attach_to_anchor(id),
            Patch::AddListener {
                node,
                event,
                capture,
            } => self.with_node(node, |backend, node| {
                backend.add_listener(&mut node.backing_ref, &event, capture)
            }),
            Patch::RemoveListener {
                node,
                event,
                capture,
            } => self.with_node(node, |backend, node| {
                backend.remove_listener(&mut node.backing_ref, &event, capture)
            }),
            Patch::AddHostListener {
                scope,
                event,
                capture,
            } => self
                .backend
                .add_host_listener(scope, &event, capture)
                .map_err(PatchError::Backend),
            Patch::RemoveHostListener {
                scope,
                event,
                capture,
            } => self
                .backend
                .remove_host_listener(scope, &event, capture)
                .map_err(PatchError::Backend),
            Patch::InstallStyleBlock { id, text } => self
                .backend
                .install_style_block(&id, &text)
                .map_err(PatchError::Backend),
            Patch::RemoveStyleBlock(id) => self
                .backend
                .remove_style_block(&id)
                .map_err(PatchError::Backend),
        }
    }

    fn with_node(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut B, &mut NVTNode<B::NodeRef>) -> Result<(), B::Error>,
    ) -> PatchResult<B> {
        let node = self.nodes.get_mut(&id).ok_or(PatchError::NoSuchNode(id))?;
        f(&mut self.backend, node).map_err(PatchError::Backend)
    }

    fn create(&mut self, id: NodeId, key: EntityId) -> PatchResult<B> {
        if self.nodes.contains_key(&id) {
            return Ok(());
        }
        let backing_ref = self.backend.create_node().map_err(PatchError::Backend)?;
        self.nodes.insert(
            id,
            NVTNode {
                key,
                backing_ref,
                superview: None,
                subviews: Vec::new(),
                anchored: false,
            },
        );
        Ok(())
    }

    /// Detaches the node and its subviews, then destroys it.
    fn destroy(&mut self, id: NodeId) -> PatchResult<B> {
        if !self.nodes.contains_key(&id) {
            return Err(PatchError::NoSuchNode(id));
        }
        self.detach(id)?;
        for subview in self.subviews(id).to_vec() {
            self.detach(subview)?;
        }
        match self.nodes.remove(&id) {
            Some(node) => self
                .backend
                .destroy_node(node.backing_ref)
                .map_err(PatchError::Backend),
            None => Err(PatchError::NoSuchNode(id)),
        }
    }

    /// Takes a node out of its superview or off the anchor. Does nothing to a detached node.
    fn detach(&mut self, id: NodeId) -> PatchResult<B> {
        let (superview, anchored) = match self.nodes.get(&id) {
            Some(node) => (node.superview, node.anchored),
            None => return Err(PatchError::NoSuchNode(id)),
        };

        if let Some(parent) = superview {
            // take the superview out of the map so we can borrow both backing refs
            let mut parent_node = self
                .nodes
                .remove(&parent)
                .ok_or(PatchError::NoSuchNode(parent))?;
            let result = match self.nodes.get(&id) {
                Some(child) => self
                    .backend
                    .remove_subview(&mut parent_node.backing_ref, &child.backing_ref),
                None => Ok(()),
            };
            parent_node.subviews.retain(|sub| *sub != id);
            self.nodes.insert(parent, parent_node);
            result.map_err(PatchError::Backend)?;
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.superview = None;
            if anchored {
                node.anchored = false;
                self.anchored.retain(|a| *a != id);
                self.backend
                    .detach_from_anchor(&mut node.backing_ref)
                    .map_err(PatchError::Backend)?;
            }
        }
        Ok(())
    }

    fn insert_subview(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> PatchResult<B> {
        if !self.nodes.contains_key(&child) {
            return Err(PatchError::NoSuchNode(child));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(PatchError::NoSuchNode(parent));
        }
        // the child must not be the parent or one of its ancestors
        let mut current = Some(parent);
        while let Some(ancestor) = current {
            if ancestor == child {
                return Err(PatchError::Cycle(child));
            }
            current = self.superview(ancestor);
        }

        self.detach(child)?;

        let mut parent_node = self
            .nodes
            .remove(&parent)
            .ok_or(PatchError::NoSuchNode(parent))?;
        let index = match before {
            Some(before) => match parent_node.subviews.iter().position(|sub| *sub == before) {
                Some(index) => Some(index),
                None => {
                    tracing::warn!(?before, "insertion reference is not a subview; appending");
                    None
                }
            },
            None => None,
        };
        let result = match (self.nodes.get(&child), index) {
            (Some(child_node), Some(index)) => {
                let before_ref = self
                    .nodes
                    .get(&parent_node.subviews[index])
                    .map(|node| &node.backing_ref);
                self.backend.insert_subview(
                    &mut parent_node.backing_ref,
                    &child_node.backing_ref,
                    before_ref,
                )
            }
            (Some(child_node), None) => self.backend.insert_subview(
                &mut parent_node.backing_ref,
                &child_node.backing_ref,
                None,
            ),
            (None, _) => Ok(()),
        };
        if result.is_ok() {
            match index {
                Some(index) => parent_node.subviews.insert(index, child),
                None => parent_node.subviews.push(child),
            }
        }
        self.nodes.insert(parent, parent_node);
        result.map_err(PatchError::Backend)?;

        if let Some(node) = self.nodes.get_mut(&child) {
            node.superview = Some(parent);
        }
        Ok(())
    }

    fn attach_to_anchor(&mut self, id: NodeId) -> PatchResult<B> {
        if self.nodes.get(&id).map_or(false, |node| node.anchored) {
            return Ok(());
        }
        self.detach(id)?;
        let node = self.nodes.get_mut(&id).ok_or(PatchError::NoSuchNode(id))?;
        self.backend
            .attach_to_anchor(&mut node.backing_ref)
            .map_err(PatchError::Backend)?;
        node.anchored = true;
        self.anchored.push(id);
        Ok(())
    }

    pub fn set_pointer_capture(&mut self, id: NodeId, pointer_id: i64) -> PatchResult<B> {
        self.with_node(id, |backend, node| {
            backend.set_pointer_capture(&mut node.backing_ref, pointer_id)
        })
    }

    pub fn release_pointer_capture(&mut self, id: NodeId, pointer_id: i64) -> PatchResult<B> {
        self.with_node(id, |backend, node| {
            backend.release_pointer_capture(&mut node.backing_ref, pointer_id)
        })
    }

    pub fn bounding_rect(&self, id: NodeId) -> Option<Rect> {
        let node = self.nodes.get(&id)?;
        self.backend.bounding_rect(&node.backing_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::patch::HostScope;
    use pretty_assertions::assert_eq;

    fn node(tree: &mut NVTree<MemoryBackend>, key: &str) -> NodeId {
        let id = NodeId::new();
        tree.patch(Patch::Create(id, EntityId::from(key))).unwrap();
        id
    }

    #[test]
    fn insert_move_and_remove() {
        let mut tree = NVTree::new(MemoryBackend::new());
        let p = node(&mut tree, "p");
        let q = node(&mut tree, "q");
        let a = node(&mut tree, "a");
        let b = node(&mut tree, "b");

        tree.patch(Patch::InsertSubview { parent: p, child: b, before: None }).unwrap();
        tree.patch(Patch::InsertSubview { parent: p, child: a, before: Some(b) }).unwrap();
        assert_eq!(tree.subview_keys(p), vec![EntityId::from("a"), EntityId::from("b")]);

        // inserting elsewhere moves
        tree.patch(Patch::InsertSubview { parent: q, child: a, before: None }).unwrap();
        assert_eq!(tree.subview_keys(p), vec![EntityId::from("b")]);
        assert_eq!(tree.superview(a), Some(q));

        tree.patch(Patch::RemoveSubview { parent: q, child: a }).unwrap();
        assert!(tree.subviews(q).is_empty());
        assert_eq!(
            tree.patch(Patch::RemoveSubview { parent: q, child: a }),
            Err(PatchError::NoSuchNode(a))
        );
    }

    #[test]
    fn cycles_are_refused() {
        let mut tree = NVTree::new(MemoryBackend::new());
        let p = node(&mut tree, "p");
        let c = node(&mut tree, "c");
        tree.patch(Patch::InsertSubview { parent: p, child: c, before: None }).unwrap();
        assert_eq!(
            tree.patch(Patch::InsertSubview { parent: c, child: p, before: None }),
            Err(PatchError::Cycle(p))
        );
        assert_eq!(
            tree.patch(Patch::InsertSubview { parent: p, child: p, before: None }),
            Err(PatchError::Cycle(p))
        );
    }

    #[test]
    fn destroy_orphans_subviews() {
        let mut tree = NVTree::new(MemoryBackend::new());
        let p = node(&mut tree, "p");
        let c = node(&mut tree, "c");
        tree.patch(Patch::AttachToAnchor(p)).unwrap();
        tree.patch(Patch::InsertSubview { parent: p, child: c, before: None }).unwrap();

        tree.patch(Patch::Destroy(p)).unwrap();
        assert!(!tree.contains(p));
        assert!(tree.contains(c));
        assert_eq!(tree.superview(c), None);
        assert!(tree.anchored().is_empty());
        assert!(tree.backend().anchor_children().is_empty());
        assert_eq!(tree.backend().node_count(), 1);
    }

    #[test]
    fn surface_level_patches() {
        let mut tree = NVTree::new(MemoryBackend::new());
        tree.patch(Patch::InstallStyleBlock { id: "style0002".into(), text: ".a {}".into() })
            .unwrap();
        tree.patch(Patch::AddHostListener {
            scope: HostScope::Window,
            event: "pointermove".into(),
            capture: true,
        })
        .unwrap();
        assert_eq!(tree.backend().style_block("style0002"), Some(".a {}"));
        assert!(tree.backend().has_host_listener(HostScope::Window, "pointermove", true));

        tree.patch(Patch::RemoveStyleBlock("style0002".into())).unwrap();
        assert_eq!(tree.backend().style_block("style0002"), None);
    }
}
