//! Events.
//!
//! Raw input arrives from the backend as a [`RawEvent`]. Before it is handed to anything that
//! might publish it, it is cooked into a [`CookedEvent`]: a plain descriptor with the target
//! translated to an entity id and node-relative offsets filled in. The propagation controls live
//! on the [`Cooked`] wrapper only, so the portable descriptor can cross the substrate.

use crate::entity::EntityId;
use crate::patch::NodeId;
use crate::rect::Rect;
use cgmath::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Pointer event types.
pub const POINTER_TYPES: &[&str] = &[
    "pointerover",
    "pointerenter",
    "pointerdown",
    "pointermove",
    "pointerup",
    "pointercancel",
    "pointerout",
    "pointerleave",
    "gotpointercapture",
    "lostpointercapture",
];

/// Legacy mouse and touch event types.
pub const MOUSE_TYPES: &[&str] = &[
    "mousedown",
    "mousemove",
    "mouseup",
    "click",
    "wheel",
    "dblclick",
    "touchstart",
    "touchmove",
    "touchend",
];

pub const SCROLL: &str = "scroll";

/// Modifier key state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// A touch point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Touch {
    pub identifier: i64,
    pub client_x: f64,
    pub client_y: f64,
}

/// An event as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event type name, e.g. `pointerdown`.
    pub kind: String,

    /// The node the event originated on, if it was on one.
    pub target: Option<NodeId>,

    /// Unique ID of the pointer, or zero.
    pub pointer_id: i64,

    /// Pressed button mask.
    pub buttons: u32,
    pub is_primary: bool,

    /// Event location in surface coordinates.
    pub client: Point2<f64>,

    /// Event location relative to the target, if the backend knows it.
    pub offset: Option<Point2<f64>>,

    /// Pointer pressure, between 0 and 1.
    pub pressure: f64,
    pub force: f64,

    /// Contact geometry size.
    pub contact: Vector2<f64>,

    pub modifiers: Modifiers,

    /// Key value for key events.
    pub key: Option<String>,

    pub touches: Vec<Touch>,

    /// Wheel deltas.
    pub delta: Option<Vector2<f64>>,
}

impl RawEvent {
    fn new(kind: &str) -> RawEvent {
        RawEvent {
            kind: kind.to_string(),
            target: None,
            pointer_id: 0,
            buttons: 0,
            is_primary: true,
            client: Point2::new(0., 0.),
            offset: None,
            pressure: 0.,
            force: 0.,
            contact: Vector2::new(1., 1.),
            modifiers: Modifiers::default(),
            key: None,
            touches: Vec::new(),
            delta: None,
        }
    }

    /// A pointer or mouse event at the given surface location.
    pub fn pointer(kind: &str, pointer_id: i64, client: Point2<f64>) -> RawEvent {
        RawEvent {
            pointer_id,
            client,
            ..RawEvent::new(kind)
        }
    }

    pub fn key(kind: &str, key: &str) -> RawEvent {
        RawEvent {
            key: Some(key.to_string()),
            ..RawEvent::new(kind)
        }
    }

    pub fn scroll() -> RawEvent {
        RawEvent::new(SCROLL)
    }

    pub fn with_target(mut self, target: NodeId) -> RawEvent {
        self.target = Some(target);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> RawEvent {
        self.modifiers = modifiers;
        self
    }
}

/// A pointer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    pub pointer_id: i64,
    pub buttons: u32,
    pub is_primary: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: Option<EntityId>,
    pub client_x: f64,
    pub client_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub shift_key: bool,
    pub pressure: f64,
    pub force: f64,
    pub width: f64,
    pub height: f64,
}

/// A legacy mouse or touch event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub touches: Vec<Touch>,
    pub target: Option<EntityId>,
    pub client_x: f64,
    pub client_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub buttons: u32,
    pub shift_key: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delta_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delta_y: Option<f64>,
}

/// A key event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    pub key: String,
    pub target: Option<EntityId>,
    pub meta_key: bool,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: Option<EntityId>,
}

/// A portable event descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CookedEvent {
    Pointer(PointerEvent),
    Mouse(MouseEvent),
    Key(KeyEvent),
    Scroll(ScrollEvent),
}

impl CookedEvent {
    pub fn target(&self) -> Option<&EntityId> {
        match self {
            CookedEvent::Pointer(e) => e.target.as_ref(),
            CookedEvent::Mouse(e) => e.target.as_ref(),
            CookedEvent::Key(e) => e.target.as_ref(),
            CookedEvent::Scroll(e) => e.target.as_ref(),
        }
    }

    /// Surface location, for events that have one.
    pub fn client(&self) -> Option<Point2<f64>> {
        match self {
            CookedEvent::Pointer(e) => Some(Point2::new(e.client_x, e.client_y)),
            CookedEvent::Mouse(e) => Some(Point2::new(e.client_x, e.client_y)),
            CookedEvent::Key(_) | CookedEvent::Scroll(_) => None,
        }
    }
}

/// A cooked event that still carries its propagation controls.
#[derive(Debug, Clone, PartialEq)]
pub struct Cooked {
    event: CookedEvent,
    propagation_stopped: bool,
    default_prevented: bool,
}

impl Cooked {
    pub fn event(&self) -> &CookedEvent {
        &self.event
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Strips the controls.
    pub fn into_portable(self) -> CookedEvent {
        self.event
    }
}

/// Cooks a raw event.
///
/// `target` is the entity of the node the event originated on; `rect` is that node's bounding
/// rectangle, used for offsets the backend did not report. Shift-modified pointer and mouse
/// events stop propagating.
pub fn cook(raw: &RawEvent, target: Option<EntityId>, rect: Option<Rect>) -> Cooked {
    let mut stop = false;

    let event = if raw.kind == SCROLL {
        CookedEvent::Scroll(ScrollEvent {
            kind: SCROLL.to_string(),
            target,
        })
    } else if POINTER_TYPES.contains(&raw.kind.as_str()) {
        stop = raw.modifiers.shift;
        let offset = offset(raw.client, raw.offset, rect);
        CookedEvent::Pointer(PointerEvent {
            pointer_id: raw.pointer_id,
            buttons: raw.buttons,
            is_primary: raw.is_primary,
            kind: raw.kind.clone(),
            target,
            client_x: raw.client.x,
            client_y: raw.client.y,
            offset_x: offset.x,
            offset_y: offset.y,
            shift_key: raw.modifiers.shift,
            pressure: raw.pressure,
            force: raw.force,
            width: raw.contact.x,
            height: raw.contact.y,
        })
    } else if MOUSE_TYPES.contains(&raw.kind.as_str()) {
        stop = raw.modifiers.shift;
        // a touch event reports its first contact
        let client = raw
            .touches
            .first()
            .map_or(raw.client, |touch| Point2::new(touch.client_x, touch.client_y));
        let offset = offset(client, raw.offset.filter(|_| raw.touches.is_empty()), rect);
        let wheel = raw.delta.filter(|_| raw.kind == "wheel");
        CookedEvent::Mouse(MouseEvent {
            kind: raw.kind.clone(),
            touches: raw.touches.clone(),
            target,
            client_x: client.x,
            client_y: client.y,
            offset_x: offset.x,
            offset_y: offset.y,
            buttons: raw.buttons,
            shift_key: raw.modifiers.shift,
            delta_x: wheel.map(|d| d.x),
            delta_y: wheel.map(|d| d.y),
        })
    } else {
        CookedEvent::Key(KeyEvent {
            key: raw.key.clone().unwrap_or_default(),
            target,
            meta_key: raw.modifiers.meta,
            alt_key: raw.modifiers.alt,
            ctrl_key: raw.modifiers.ctrl,
            shift_key: raw.modifiers.shift,
        })
    };

    Cooked {
        event,
        propagation_stopped: stop,
        default_prevented: false,
    }
}

fn offset(client: Point2<f64>, reported: Option<Point2<f64>>, rect: Option<Rect>) -> Point2<f64> {
    match (reported, rect) {
        (Some(offset), _) => offset,
        (None, Some(rect)) => rect.to_local(client),
        (None, None) => client,
    }
}
