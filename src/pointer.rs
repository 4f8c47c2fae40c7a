//! Pointer grabs and pointer capture.
//!
//! There is one broker per view tree. A grab routes every move and up event on the whole surface
//! to one entity until the up event arrives, even when the pointer leaves the entity. Pointer
//! capture is the backend's per-pointer mechanism; the broker only remembers which node holds
//! which pointer so that it can release them.

use crate::entity::{EntityId, HandlerSpec};
use crate::events::CookedEvent;
use crate::patch::{HostScope, NodeId, Patch};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A grab handler closure.
pub struct GrabCallback(Arc<Mutex<dyn FnMut(&CookedEvent) + Send>>);

impl GrabCallback {
    pub fn new<F: 'static + FnMut(&CookedEvent) + Send>(handler: F) -> Self {
        GrabCallback(Arc::new(Mutex::new(handler)))
    }

    pub fn call(&self, event: &CookedEvent) {
        let mut handler = self.0.lock();
        (&mut *handler)(event)
    }
}

impl Clone for GrabCallback {
    fn clone(&self) -> Self {
        GrabCallback(Arc::clone(&self.0))
    }
}

impl fmt::Debug for GrabCallback {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GrabCallback")
    }
}

/// What to run for grabbed move and up events.
#[derive(Debug, Clone)]
pub enum GrabHandler {
    /// An operation on the grabbing entity's view.
    Spec(HandlerSpec),
    Callback(GrabCallback),
}

impl From<&str> for GrabHandler {
    fn from(spec: &str) -> Self {
        GrabHandler::Spec(HandlerSpec::parse(spec))
    }
}

/// The active grab.
#[derive(Debug, Clone)]
pub struct Grab {
    pub target: EntityId,
    pub on_move: GrabHandler,
    pub on_up: GrabHandler,
    pub for_touch: bool,
}

/// Host-level listeners a grab installs: (scope, event, capture).
const MOUSE_LISTENERS: &[(HostScope, &str, bool)] = &[
    (HostScope::Window, "mousemove", true),
    (HostScope::Window, "mouseup", false),
    (HostScope::Window, "dragstart", false),
];
const TOUCH_LISTENERS: &[(HostScope, &str, bool)] = &[
    (HostScope::Anchor, "touchmove", true),
    (HostScope::Anchor, "touchend", true),
];

/// Whether a host-level event type moves a grab.
pub fn is_move(kind: &str) -> bool {
    matches!(kind, "mousemove" | "touchmove" | "pointermove")
}

/// Whether a host-level event type ends a grab.
pub fn is_up(kind: &str) -> bool {
    matches!(kind, "mouseup" | "touchend" | "pointerup")
}

#[derive(Debug, Default)]
pub struct PointerBroker {
    grab: Option<Grab>,
    captures: BTreeMap<i64, NodeId>,
}

impl PointerBroker {
    pub fn new() -> PointerBroker {
        PointerBroker::default()
    }

    pub fn grab(&self) -> Option<&Grab> {
        self.grab.as_ref()
    }

    pub fn is_grabbing(&self) -> bool {
        self.grab.is_some()
    }

    /// Starts a grab. Returns the listener patches to apply.
    ///
    /// A grab while another is active is an error in the caller; the old grab is torn down first.
    pub fn start_grab(&mut self, grab: Grab) -> Vec<Patch> {
        let mut patches = Vec::new();
        if let Some(old) = self.grab.take() {
            tracing::error!(
                old = %old.target,
                new = %grab.target,
                "new grab with previous still active"
            );
            patches.extend(listener_patches(&old, false));
        }
        patches.extend(listener_patches(&grab, true));
        self.grab = Some(grab);
        patches
    }

    /// The target and handler for a grabbed move event.
    pub fn pointer_move(&self) -> Option<(EntityId, GrabHandler)> {
        let grab = self.grab.as_ref()?;
        Some((grab.target.clone(), grab.on_move.clone()))
    }

    /// Ends the grab on an up event. The grab state is cleared before the returned handler is
    /// run, so the handler may start a new grab.
    pub fn pointer_up(&mut self) -> Option<(EntityId, GrabHandler, Vec<Patch>)> {
        let grab = self.grab.take()?;
        let patches = listener_patches(&grab, false);
        Some((grab.target, grab.on_up, patches))
    }

    /// Cancels the grab without running its up handler.
    pub fn release_grab(&mut self) -> Vec<Patch> {
        match self.grab.take() {
            Some(grab) => listener_patches(&grab, false),
            None => Vec::new(),
        }
    }

    pub fn capture_pointer(&mut self, pointer_id: i64, node: NodeId) {
        if let Some(old) = self.captures.insert(pointer_id, node) {
            if old != node {
                tracing::debug!(pointer_id, "pointer capture moved to another node");
            }
        }
    }

    pub fn captured_by(&self, pointer_id: i64) -> Option<NodeId> {
        self.captures.get(&pointer_id).copied()
    }

    /// Releases one pointer, or every captured pointer with `None`. Returns the captures the
    /// backend must release.
    ///
    /// Releasing a pointer that is not captured, or from a node that does not hold it, is logged.
    pub fn release_pointer(
        &mut self,
        pointer_id: Option<i64>,
        node: Option<NodeId>,
    ) -> Vec<(i64, NodeId)> {
        match pointer_id {
            Some(pointer_id) => match self.captures.remove(&pointer_id) {
                Some(holder) => {
                    if node.map_or(false, |node| node != holder) {
                        tracing::warn!(pointer_id, "inconsistent pointer capture release");
                    }
                    vec![(pointer_id, holder)]
                }
                None => {
                    tracing::warn!(pointer_id, "releasing a pointer that is not captured");
                    Vec::new()
                }
            },
            None => std::mem::take(&mut self.captures).into_iter().collect(),
        }
    }

    /// Forgets captures held by a node that is going away.
    pub fn forget_node(&mut self, node: NodeId) {
        self.captures.retain(|_, holder| *holder != node);
    }
}

fn listener_patches(grab: &Grab, add: bool) -> Vec<Patch> {
    let touch: &[_] = if grab.for_touch { TOUCH_LISTENERS } else { &[] };
    MOUSE_LISTENERS
        .iter()
        .chain(touch)
        .map(|&(scope, event, capture)| {
            let event = event.to_string();
            if add {
                Patch::AddHostListener {
                    scope,
                    event,
                    capture,
                }
            } else {
                Patch::RemoveHostListener {
                    scope,
                    event,
                    capture,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grab(target: &str, for_touch: bool) -> Grab {
        Grab {
            target: EntityId::from(target),
            on_move: GrabHandler::from("Drag.move"),
            on_up: GrabHandler::from("Drag.up"),
            for_touch,
        }
    }

    #[test]
    fn up_clears_before_handler() {
        let mut broker = PointerBroker::new();
        let patches = broker.start_grab(grab("0002", true));
        assert_eq!(patches.len(), 5);
        assert!(patches.contains(&Patch::AddHostListener {
            scope: HostScope::Anchor,
            event: "touchmove".into(),
            capture: true,
        }));

        let (target, _) = broker.pointer_move().unwrap();
        assert_eq!(target, EntityId::from("0002"));

        let (target, on_up, patches) = broker.pointer_up().unwrap();
        assert_eq!(target, EntityId::from("0002"));
        assert!(matches!(on_up, GrabHandler::Spec(spec) if spec.operation == "up"));
        assert_eq!(patches.len(), 5);
        assert!(!broker.is_grabbing());
        assert!(broker.pointer_up().is_none());
    }

    #[test]
    fn regrab_tears_down_old_listeners() {
        let mut broker = PointerBroker::new();
        broker.start_grab(grab("0002", false));
        let patches = broker.start_grab(grab("0003", false));
        let removed = patches
            .iter()
            .filter(|p| matches!(p, Patch::RemoveHostListener { .. }))
            .count();
        assert_eq!(removed, 3);
        assert_eq!(broker.grab().map(|g| g.target.clone()), Some(EntityId::from("0003")));
    }

    #[test]
    fn callbacks_are_shared() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let callback = GrabCallback::new(move |_| *counter.lock() += 1);
        let event = CookedEvent::Scroll(crate::events::ScrollEvent {
            kind: "scroll".into(),
            target: None,
        });
        callback.clone().call(&event);
        callback.call(&event);
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn double_release_is_not_fatal() {
        let mut broker = PointerBroker::new();
        let a = NodeId::new();
        let b = NodeId::new();
        broker.capture_pointer(1, a);
        broker.capture_pointer(2, b);

        assert_eq!(broker.release_pointer(Some(1), Some(a)), vec![(1, a)]);
        assert_eq!(broker.release_pointer(Some(1), Some(a)), vec![]);
        // wrong holder still releases
        assert_eq!(broker.release_pointer(Some(2), Some(a)), vec![(2, b)]);

        broker.capture_pointer(3, a);
        broker.capture_pointer(4, b);
        assert_eq!(broker.release_pointer(None, None).len(), 2);
        assert_eq!(broker.captured_by(3), None);
    }
}
