//! Traits for backends.

use crate::patch::HostScope;
use crate::rect::Rect;
use std::fmt;

/// A retained-mode display surface.
///
/// Called by the [`NVTree`](crate::NVTree) only; the tree keeps track of which node is where.
pub trait Backend {
    /// A reference to a node in the backend.
    type NodeRef;

    /// Error type.
    type Error: fmt::Debug;

    /// Creates a new detached node.
    fn create_node(&mut self) -> Result<Self::NodeRef, Self::Error>;

    /// Destroys a node. It has already been detached from its superview.
    fn destroy_node(&mut self, node: Self::NodeRef) -> Result<(), Self::Error>;

    fn set_dom_id(&mut self, node: &mut Self::NodeRef, id: Option<&str>) -> Result<(), Self::Error>;

    fn set_classes(&mut self, node: &mut Self::NodeRef, classes: &[String]) -> Result<(), Self::Error>;

    fn set_style(
        &mut self,
        node: &mut Self::NodeRef,
        name: &str,
        value: &str,
    ) -> Result<(), Self::Error>;

    fn remove_style(&mut self, node: &mut Self::NodeRef, name: &str) -> Result<(), Self::Error>;

    fn set_content(
        &mut self,
        node: &mut Self::NodeRef,
        content: Option<&str>,
    ) -> Result<(), Self::Error>;

    /// Inserts a subview in front of `before`, or at the end.
    fn insert_subview(
        &mut self,
        parent: &mut Self::NodeRef,
        child: &Self::NodeRef,
        before: Option<&Self::NodeRef>,
    ) -> Result<(), Self::Error>;

    fn remove_subview(
        &mut self,
        parent: &mut Self::NodeRef,
        child: &Self::NodeRef,
    ) -> Result<(), Self::Error>;

    /// Hangs the node under the surface anchor.
    fn attach_to_anchor(&mut self, node: &mut Self::NodeRef) -> Result<(), Self::Error>;

    fn detach_from_anchor(&mut self, node: &mut Self::NodeRef) -> Result<(), Self::Error>;

    fn add_listener(
        &mut self,
        node: &mut Self::NodeRef,
        event: &str,
        capture: bool,
    ) -> Result<(), Self::Error>;

    fn remove_listener(
        &mut self,
        node: &mut Self::NodeRef,
        event: &str,
        capture: bool,
    ) -> Result<(), Self::Error>;

    fn add_host_listener(
        &mut self,
        scope: HostScope,
        event: &str,
        capture: bool,
    ) -> Result<(), Self::Error>;

    fn remove_host_listener(
        &mut self,
        scope: HostScope,
        event: &str,
        capture: bool,
    ) -> Result<(), Self::Error>;

    fn install_style_block(&mut self, id: &str, text: &str) -> Result<(), Self::Error>;

    fn remove_style_block(&mut self, id: &str) -> Result<(), Self::Error>;

    fn set_pointer_capture(
        &mut self,
        node: &mut Self::NodeRef,
        pointer_id: i64,
    ) -> Result<(), Self::Error>;

    fn release_pointer_capture(
        &mut self,
        node: &mut Self::NodeRef,
        pointer_id: i64,
    ) -> Result<(), Self::Error>;

    /// The node's bounding rectangle in surface coordinates.
    fn bounding_rect(&self, node: &Self::NodeRef) -> Option<Rect>;
}
