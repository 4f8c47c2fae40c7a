//! An in-memory backend.
//!
//! Keeps the surface as plain data so reconciliation can be inspected without a real display.

use crate::backend::Backend;
use crate::patch::HostScope;
use crate::rect::Rect;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("no such node: {0}")]
    NoSuchNode(u64),
    #[error("node {child} is not a subview of {parent}")]
    NotASubview { parent: u64, child: u64 },
}

/// A surface node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryNode {
    pub dom_id: Option<String>,
    pub classes: Vec<String>,
    pub style: BTreeMap<String, String>,
    pub content: Option<String>,
    pub children: Vec<u64>,
    pub listeners: BTreeSet<(String, bool)>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    next: u64,
    nodes: HashMap<u64, MemoryNode>,
    anchor: Vec<u64>,
    host_listeners: BTreeSet<(HostScope, String, bool)>,
    style_blocks: BTreeMap<String, String>,
    captures: BTreeMap<i64, u64>,
    rects: HashMap<u64, Rect>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    pub fn node(&self, node: u64) -> Option<&MemoryNode> {
        self.nodes.get(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn anchor_children(&self) -> &[u64] {
        &self.anchor
    }

    pub fn style_block(&self, id: &str) -> Option<&str> {
        self.style_blocks.get(id).map(String::as_str)
    }

    pub fn style_blocks(&self) -> &BTreeMap<String, String> {
        &self.style_blocks
    }

    pub fn has_host_listener(&self, scope: HostScope, event: &str, capture: bool) -> bool {
        self.host_listeners
            .contains(&(scope, event.to_string(), capture))
    }

    pub fn host_listener_count(&self) -> usize {
        self.host_listeners.len()
    }

    /// Pointer id → node holding its capture.
    pub fn captures(&self) -> &BTreeMap<i64, u64> {
        &self.captures
    }

    /// Sets the rectangle reported by [`Backend::bounding_rect`].
    pub fn set_rect(&mut self, node: u64, rect: Rect) {
        self.rects.insert(node, rect);
    }

    fn get_mut(&mut self, node: u64) -> Result<&mut MemoryNode, MemoryError> {
        self.nodes.get_mut(&node).ok_or(MemoryError::NoSuchNode(node))
    }
}

impl Backend for MemoryBackend {
    type NodeRef = u64;
    type Error = MemoryError;

    fn create_node(&mut self) -> Result<u64, MemoryError> {
        self.next += 1;
        self.nodes.insert(self.next, MemoryNode::default());
        Ok(self.next)
    }

    fn destroy_node(&mut self, node: u64) -> Result<(), MemoryError> {
        self.nodes
            .remove(&node)
            .map(|_| ())
            .ok_or(MemoryError::NoSuchNode(node))?;
        self.captures.retain(|_, holder| *holder != node);
        self.rects.remove(&node);
        Ok(())
    }

    fn set_dom_id(&mut self, node: &mut u64, id: Option<&str>) -> Result<(), MemoryError> {
        self.get_mut(*node)?.dom_id = id.map(str::to_string);
        Ok(())
    }

    fn set_classes(&mut self, node: &mut u64, classes: &[String]) -> Result<(), MemoryError> {
        self.get_mut(*node)?.classes = classes.to_vec();
        Ok(())
    }

    fn set_style(&mut self, node: &mut u64, name: &str, value: &str) -> Result<(), MemoryError> {
        self.get_mut(*node)?
            .style
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_style(&mut self, node: &mut u64, name: &str) -> Result<(), MemoryError> {
        self.get_mut(*node)?.style.remove(name);
        Ok(())
    }

    fn set_content(&mut self, node: &mut u64, content: Option<&str>) -> Result<(), MemoryError> {
        self.get_mut(*node)?.content = content.map(str::to_string);
        Ok(())
    }

    fn insert_subview(
        &mut self,
        parent: &mut u64,
        child: &u64,
        before: Option<&u64>,
    ) -> Result<(), MemoryError> {
        if !self.nodes.contains_key(child) {
            return Err(MemoryError::NoSuchNode(*child));
        }
        let children = &mut self.get_mut(*parent)?.children;
        let index = match before {
            Some(before) => children
                .iter()
                .position(|c| c == before)
                .ok_or(MemoryError::NotASubview {
                    parent: *parent,
                    child: *before,
                })?,
            None => children.len(),
        };
        children.insert(index, *child);
        Ok(())
    }

    fn remove_subview(&mut self, parent: &mut u64, child: &u64) -> Result<(), MemoryError> {
        let parent_id = *parent;
        let children = &mut self.get_mut(parent_id)?.children;
        let index = children
            .iter()
            .position(|c| c == child)
            .ok_or(MemoryError::NotASubview {
                parent: parent_id,
                child: *child,
            })?;
        children.remove(index);
        Ok(())
    }

    fn attach_to_anchor(&mut self, node: &mut u64) -> Result<(), MemoryError> {
        if !self.nodes.contains_key(node) {
            return Err(MemoryError::NoSuchNode(*node));
        }
        self.anchor.push(*node);
        Ok(())
    }

    fn detach_from_anchor(&mut self, node: &mut u64) -> Result<(), MemoryError> {
        self.anchor.retain(|a| a != node);
        Ok(())
    }

    fn add_listener(&mut self, node: &mut u64, event: &str, capture: bool) -> Result<(), MemoryError> {
        self.get_mut(*node)?
            .listeners
            .insert((event.to_string(), capture));
        Ok(())
    }

    fn remove_listener(
        &mut self,
        node: &mut u64,
        event: &str,
        capture: bool,
    ) -> Result<(), MemoryError> {
        self.get_mut(*node)?
            .listeners
            .remove(&(event.to_string(), capture));
        Ok(())
    }

    fn add_host_listener(&mut self, scope: HostScope, event: &str, capture: bool) -> Result<(), MemoryError> {
        self.host_listeners.insert((scope, event.to_string(), capture));
        Ok(())
    }

    fn remove_host_listener(
        &mut self,
        scope: HostScope,
        event: &str,
        capture: bool,
    ) -> Result<(), MemoryError> {
        self.host_listeners
            .remove(&(scope, event.to_string(), capture));
        Ok(())
    }

    fn install_style_block(&mut self, id: &str, text: &str) -> Result<(), MemoryError> {
        self.style_blocks.insert(id.to_string(), text.to_string());
        Ok(())
    }

    fn remove_style_block(&mut self, id: &str) -> Result<(), MemoryError> {
        self.style_blocks.remove(id);
        Ok(())
    }

    fn set_pointer_capture(&mut self, node: &mut u64, pointer_id: i64) -> Result<(), MemoryError> {
        if !self.nodes.contains_key(node) {
            return Err(MemoryError::NoSuchNode(*node));
        }
        self.captures.insert(pointer_id, *node);
        Ok(())
    }

    fn release_pointer_capture(&mut self, node: &mut u64, pointer_id: i64) -> Result<(), MemoryError> {
        if self.captures.get(&pointer_id) == Some(node) {
            self.captures.remove(&pointer_id);
        }
        Ok(())
    }

    fn bounding_rect(&self, node: &u64) -> Option<Rect> {
        if !self.nodes.contains_key(node) {
            return None;
        }
        Some(self.rects.get(node).copied().unwrap_or_else(Rect::zero))
    }
}
