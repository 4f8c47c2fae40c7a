//! Message delivery and subscriptions.

use super::World;
use crate::entity::{EntityId, HandlerSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Event published by a view on the world scope when a bound surface listener fires.
pub const DOM_EVENT: &str = "domEvent";
/// Participant registration, on the session scope.
pub const VIEW_JOIN: &str = "view-join";
pub const VIEW_EXIT: &str = "view-exit";
/// Container extent change, on the session scope.
pub const WINDOW_RESIZED: &str = "windowResized";

/// A message carried by the replication substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub scope: String,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Message {
    pub fn new(scope: &str, event: &str, data: Value) -> Message {
        Message {
            scope: scope.to_string(),
            event: event.to_string(),
            data,
        }
    }
}

/// The outgoing side of a replication substrate.
pub trait Substrate {
    /// Publishes an event. Every replica receives it in the same order.
    fn publish(&mut self, scope: &str, event: &str, data: Value);
}

/// Payload of [`DOM_EVENT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomEvent {
    pub element_id: EntityId,
    pub evt: Value,
    #[serde(rename = "trait")]
    pub capability: Option<String>,
    pub method: String,
}

/// A number, or a CSS length such as `"1024px"`.
fn extent_component(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            let text = text.strip_suffix("px").unwrap_or(text);
            text.trim_end().parse().ok()
        }
        _ => None,
    }
}

/// Topic subscriptions, in subscription order.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    topics: HashMap<String, Vec<(EntityId, HandlerSpec)>>,
}

fn topic(scope: &str, event: &str) -> String {
    format!("{}:{}", scope, event)
}

impl Subscriptions {
    /// Re-subscribing with the same handler is a no-op; a different handler replaces the old one.
    pub(crate) fn subscribe(&mut self, scope: &str, event: &str, entity: &EntityId, spec: HandlerSpec) {
        let handlers = self.topics.entry(topic(scope, event)).or_default();
        match handlers.iter_mut().find(|(e, _)| e == entity) {
            Some((_, existing)) => *existing = spec,
            None => handlers.push((entity.clone(), spec)),
        }
    }

    pub(crate) fn unsubscribe(&mut self, scope: &str, event: &str, entity: &EntityId) {
        let key = topic(scope, event);
        if let Some(handlers) = self.topics.get_mut(&key) {
            handlers.retain(|(e, _)| e != entity);
            if handlers.is_empty() {
                self.topics.remove(&key);
            }
        }
    }

    pub(crate) fn remove_entity(&mut self, entity: &EntityId) {
        self.topics.retain(|_, handlers| {
            handlers.retain(|(e, _)| e != entity);
            !handlers.is_empty()
        });
    }

    pub(crate) fn handlers(&self, scope: &str, event: &str) -> Vec<(EntityId, HandlerSpec)> {
        self.topics
            .get(&topic(scope, event))
            .cloned()
            .unwrap_or_default()
    }
}

impl World {
    /// Delivers a message from the substrate, then anything it caused the model to publish.
    pub fn deliver(&mut self, message: Message) {
        self.pending.push_back(message);
        if self.delivering {
            return;
        }
        self.delivering = true;
        while let Some(message) = self.pending.pop_front() {
            self.deliver_one(message);
        }
        self.delivering = false;
    }

    /// Publishes from inside the model. Delivered to model subscribers after the current message.
    pub fn publish(&mut self, scope: &str, event: &str, data: Value) {
        self.deliver(Message::new(scope, event, data));
    }

    fn deliver_one(&mut self, message: Message) {
        tracing::trace!(scope = %message.scope, event = %message.event, "delivering");

        if message.scope == self.root.as_str() && message.event == DOM_EVENT {
            match serde_json::from_value::<DomEvent>(message.data.clone()) {
                Ok(dom_event) => {
                    self.call(
                        &dom_event.element_id,
                        dom_event.capability.as_deref(),
                        &dom_event.method,
                        &[dom_event.evt],
                    );
                }
                Err(err) => tracing::warn!(error = %err, "malformed domEvent"),
            }
        } else if message.scope == self.session_id {
            match message.event.as_str() {
                VIEW_JOIN => match message.data.as_str() {
                    Some(view) => {
                        self.participants.insert(view.to_string());
                    }
                    None => tracing::warn!("view-join without a view id"),
                },
                VIEW_EXIT => {
                    if let Some(view) = message.data.as_str() {
                        self.participants.remove(view);
                    }
                }
                WINDOW_RESIZED => {
                    let width = extent_component(message.data.get("width"));
                    let height = extent_component(message.data.get("height"));
                    match (width, height) {
                        (Some(width), Some(height)) => {
                            self.container_extent = cgmath::Vector2::new(width, height);
                        }
                        _ => tracing::warn!("windowResized without an extent"),
                    }
                }
                _ => (),
            }
        }

        for (entity, spec) in self.subscriptions.handlers(&message.scope, &message.event) {
            self.call(
                &entity,
                spec.capability.as_deref(),
                &spec.operation,
                &[message.data.clone()],
            );
        }
    }

    /// Runs every timeline call due at or before `time`, in order, then sets the clock to `time`.
    pub fn advance_to(&mut self, time: u64) {
        while let Some(scheduled) = self.timeline.pop_due(time) {
            if !self.entities.contains_key(&scheduled.target) {
                tracing::debug!(entity = %scheduled.target, "dropping future call for destroyed entity");
                continue;
            }
            self.call(
                &scheduled.target,
                scheduled.spec.capability.as_deref(),
                &scheduled.spec.operation,
                &scheduled.args,
            );
        }
        self.timeline.set_now(time);
    }

    /// Schedules a call on `target` after `delay` ms of logical time.
    pub fn future(&mut self, delay: u64, target: &EntityId, spec: HandlerSpec, args: Vec<Value>) {
        self.timeline.schedule(delay, target.clone(), spec, args);
    }

    pub fn now(&self) -> u64 {
        self.timeline.now()
    }

    pub fn subscribe(&mut self, scope: &str, event: &str, entity: &EntityId, spec: HandlerSpec) {
        self.subscriptions.subscribe(scope, event, entity, spec);
    }

    pub fn unsubscribe(&mut self, scope: &str, event: &str, entity: &EntityId) {
        self.subscriptions.unsubscribe(scope, event, entity);
    }

    /// Publishes `data` to every domain registered with [`World::add_domain`]; a domain without a
    /// scope uses the entity's own id.
    pub fn publish_to_all(&mut self, id: &EntityId, data: Value) {
        let listeners = match self.entities.get(id) {
            Some(entity) => entity.listeners.clone(),
            None => return,
        };
        for listener in listeners {
            let scope = listener.scope.unwrap_or_else(|| id.to_string());
            self.publish(&scope, &listener.event, data.clone());
        }
    }
}
