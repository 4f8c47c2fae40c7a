//! Patches for the native-view tree.

use crate::entity::EntityId;
use std::fmt;
use uuid::Uuid;

/// Identifies a surface node. Local to one participant; never replicated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32, u16, u16, [u8; 8]);

impl NodeId {
    pub(crate) fn new() -> NodeId {
        let uuid = Uuid::new_v4();
        let (a, b, c, d) = uuid.as_fields();
        NodeId(a, b, c, *d)
    }

    fn uuid(&self) -> Uuid {
        Uuid::from_fields(self.0, self.1, self.2, &self.3)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NodeId({})", self.uuid().simple())
    }
}

/// Where a surface-wide listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostScope {
    /// The whole window; sees events outside the anchor too.
    Window,
    /// The node all entity nodes hang under.
    Anchor,
}

/// A change to the display surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Creates a detached node for an entity.
    Create(NodeId, EntityId),
    /// Destroys a node. Its subviews are detached, not destroyed.
    Destroy(NodeId),
    SetDomId(NodeId, Option<String>),
    SetClasses(NodeId, Vec<String>),
    SetStyle(NodeId, String, String),
    RemoveStyle(NodeId, String),
    SetContent(NodeId, Option<String>),
    /// Inserts `child` in front of `before`, or at the end. Moves it if it already has a parent.
    InsertSubview {
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    },
    RemoveSubview {
        parent: NodeId,
        child: NodeId,
    },
    /// Hangs a node directly under the surface anchor.
    AttachToAnchor(NodeId),
    AddListener {
        node: NodeId,
        event: String,
        capture: bool,
    },
    RemoveListener {
        node: NodeId,
        event: String,
        capture: bool,
    },
    AddHostListener {
        scope: HostScope,
        event: String,
        capture: bool,
    },
    RemoveHostListener {
        scope: HostScope,
        event: String,
        capture: bool,
    },
    /// Installs (or replaces) a document-level rule block.
    InstallStyleBlock {
        id: String,
        text: String,
    },
    RemoveStyleBlock(String),
}

impl Patch {
    /// The node this patch is about, if it is about one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Patch::Create(node, _)
            | Patch::Destroy(node)
            | Patch::SetDomId(node, _)
            | Patch::SetClasses(node, _)
            | Patch::SetStyle(node, _, _)
            | Patch::RemoveStyle(node, _)
            | Patch::SetContent(node, _)
            | Patch::AttachToAnchor(node)
            | Patch::AddListener { node, .. }
            | Patch::RemoveListener { node, .. } => Some(*node),
            Patch::InsertSubview { child, .. } | Patch::RemoveSubview { child, .. } => Some(*child),
            Patch::AddHostListener { .. }
            | Patch::RemoveHostListener { .. }
            | Patch::InstallStyleBlock { .. }
            | Patch::RemoveStyleBlock(_) => None,
        }
    }
}

#[test]
fn test_node_ids() {
    let a = NodeId::new();
    let b = NodeId::new();
    assert_ne!(a, b);
    assert_eq!(format!("{:?}", a).len(), "NodeId()".len() + 32);
    assert_eq!(Patch::Destroy(a).node(), Some(a));
    assert_eq!(Patch::RemoveStyleBlock("x".into()).node(), None);
}
