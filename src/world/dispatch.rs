//! Model-side capability dispatch.

use super::World;
use crate::capability::{self, ModelCapability, ModelOp, OpResult, Resolved, INIT};
use crate::entity::{BehaviorSource, Entity, EntityId, HandlerSpec};
use crate::error::DispatchError;
use crate::style::StyleValue;
use serde_json::Value;
use std::sync::Arc;

/// Scope name used in errors for the built-in entity operations.
const BUILTIN: &str = "builtin";

impl World {
    /// Calls an operation on an entity and logs any failure. With no capability the built-in
    /// entity operations are used.
    pub fn call(
        &mut self,
        id: &EntityId,
        capability: Option<&str>,
        operation: &str,
        args: &[Value],
    ) -> Option<Value> {
        match self.try_call(id, capability, operation, args) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(
                    entity = %id,
                    capability = capability.unwrap_or(BUILTIN),
                    operation,
                    error = %err,
                    "model call failed"
                );
                None
            }
        }
    }

    /// Like [`World::call`], but hands the error back.
    pub fn try_call(
        &mut self,
        id: &EntityId,
        capability: Option<&str>,
        operation: &str,
        args: &[Value],
    ) -> OpResult {
        if !self.entities.contains_key(id) {
            return Err(DispatchError::NoSuchEntity(id.clone()));
        }
        let (capability, op) = match capability {
            None => {
                let op = self
                    .builtins
                    .op(operation)
                    .ok_or_else(|| DispatchError::OperationNotFound {
                        entity: id.clone(),
                        scope: BUILTIN.to_string(),
                        operation: operation.to_string(),
                    })?;
                (None, op)
            }
            Some(name) => {
                let resolved = self.ensure_resolved(id);
                let installed = resolved.get(name).cloned().ok_or_else(|| {
                    DispatchError::CapabilityNotInstalled {
                        entity: id.clone(),
                        capability: name.to_string(),
                    }
                })?;
                let op = installed
                    .op(operation)
                    .ok_or_else(|| DispatchError::OperationNotFound {
                        entity: id.clone(),
                        scope: name.to_string(),
                        operation: operation.to_string(),
                    })?;
                (Some(installed), op)
            }
        };
        let mut facade = ModelFacade {
            world: self,
            id: id.clone(),
            capability,
        };
        op(&mut facade, args)
    }

    /// Returns the entity's resolved behavior table, resolving it if the list changed.
    pub(crate) fn ensure_resolved(&mut self, id: &EntityId) -> Arc<Resolved<ModelOp>> {
        let sources = match self.entities.get(id) {
            Some(entity) => &entity.model_behaviors,
            None => return Arc::new(Resolved::default()),
        };
        if let Some(resolved) = self.resolved.get(id) {
            if resolved.sources() == sources.as_slice() {
                return resolved.clone();
            }
        }
        let resolved = Arc::new(Resolved::resolve(sources, &*self.registry, |path| {
            self.resolve_library(id, path)
        }));
        self.resolved.insert(id.clone(), resolved.clone());
        resolved
    }

    /// Sets the model behaviors and runs `init` of every capability that has one. Setting the
    /// same list again does nothing.
    pub fn set_behaviors(&mut self, id: &EntityId, sources: Vec<BehaviorSource>) {
        let unchanged = self
            .entities
            .get(id)
            .map_or(false, |entity| entity.model_behaviors == sources);
        if unchanged && self.resolved.contains_key(id) {
            return;
        }
        if !self.update(id, |entity| entity.model_behaviors = sources) {
            return;
        }
        let resolved = self.ensure_resolved(id);
        for name in resolved.initializers() {
            self.call(id, Some(&name), INIT, &[]);
        }
    }

    /// Appends behaviors, skipping capabilities already listed, and initializes the new ones.
    pub fn add_behaviors(&mut self, id: &EntityId, sources: Vec<BehaviorSource>) {
        let mut list = match self.entities.get(id) {
            Some(entity) => entity.model_behaviors.clone(),
            None => return,
        };
        let before = self.ensure_resolved(id);
        for source in sources {
            if !list
                .iter()
                .any(|old| old.capability_name() == source.capability_name())
            {
                list.push(source);
            }
        }
        if list.len() == before.sources().len() {
            return;
        }
        self.update(id, |entity| entity.model_behaviors = list);
        let after = self.ensure_resolved(id);
        for name in after.initializers() {
            if before.get(&name).is_none() {
                self.call(id, Some(&name), INIT, &[]);
            }
        }
    }

    /// Whether the entity has the named capability installed.
    pub fn has_capability(&mut self, id: &EntityId, name: &str) -> bool {
        self.ensure_resolved(id).get(name).is_some()
    }
}

/// A model entity as seen from inside one of its operations.
pub struct ModelFacade<'w> {
    world: &'w mut World,
    id: EntityId,
    capability: Option<Arc<ModelCapability>>,
}

impl<'w> ModelFacade<'w> {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.world.get(&self.id)
    }

    pub fn world(&mut self) -> &mut World {
        &mut *self.world
    }

    pub fn world_ref(&self) -> &World {
        &*self.world
    }

    /// Name of the capability this operation belongs to, if any.
    pub fn capability_name(&self) -> Option<&str> {
        self.capability.as_deref().map(ModelCapability::name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.world.get(&self.id)?.attribute(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.world.set_attribute(&self.id, name, value);
    }

    pub fn delete(&mut self, name: &str) {
        self.world.remove_attribute(&self.id, name);
    }

    /// Calls another operation of the same capability.
    pub fn call_own(&mut self, operation: &str, args: &[Value]) -> OpResult {
        let capability = self
            .capability
            .clone()
            .ok_or_else(|| DispatchError::failed("call_own outside a capability"))?;
        let op = capability
            .op(operation)
            .ok_or_else(|| DispatchError::OperationNotFound {
                entity: self.id.clone(),
                scope: capability.name().to_string(),
                operation: operation.to_string(),
            })?;
        let mut facade = ModelFacade {
            world: &mut *self.world,
            id: self.id.clone(),
            capability: Some(capability),
        };
        op(&mut facade, args)
    }

    /// Calls an operation on this entity through the world, logging failures.
    pub fn call(&mut self, capability: Option<&str>, operation: &str, args: &[Value]) -> Option<Value> {
        let id = self.id.clone();
        self.world.call(&id, capability, operation, args)
    }

    /// Schedules a call on this entity after `delay` ms of logical time.
    pub fn future(&mut self, delay: u64) -> Deferred<'_> {
        Deferred {
            world: &mut *self.world,
            target: self.id.clone(),
            delay,
        }
    }

    /// Subscribes this entity; a bare operation name refers to this capability.
    pub fn subscribe(&mut self, scope: &str, event: &str, handler: &str) {
        let spec = HandlerSpec::qualified(self.capability_name(), handler);
        self.world.subscribe(scope, event, &self.id, spec);
    }

    pub fn unsubscribe(&mut self, scope: &str, event: &str) {
        self.world.unsubscribe(scope, event, &self.id);
    }

    pub fn publish(&mut self, scope: &str, event: &str, data: Value) {
        self.world.publish(scope, event, data);
    }

    /// Binds a surface event; a bare operation name refers to this capability.
    pub fn add_event_listener(&mut self, event: &str, handler: &str, capture: bool) {
        let spec = HandlerSpec::qualified(self.capability_name(), handler);
        self.world.add_event_listener(&self.id, event, spec, capture);
    }

    pub fn remove_event_listener(&mut self, event: &str) {
        self.world.remove_event_listener(&self.id, event);
    }
}

/// A pending [`ModelFacade::future`] call.
pub struct Deferred<'a> {
    world: &'a mut World,
    target: EntityId,
    delay: u64,
}

impl Deferred<'_> {
    pub fn call(self, capability: Option<&str>, operation: &str, args: Vec<Value>) {
        self.world.future(
            self.delay,
            &self.target,
            HandlerSpec::new(capability, operation),
            args,
        );
    }
}

fn failed(err: impl std::fmt::Display) -> DispatchError {
    DispatchError::failed(err.to_string())
}

fn set_style(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let name = capability::arg_str(args, 0)?.to_string();
    let value = match capability::arg(args, 1) {
        Value::String(text) => StyleValue::Text(text.clone()),
        other => StyleValue::Json(other.clone()),
    };
    let id = m.id.clone();
    m.world.set_style(&id, &name, value);
    Ok(Value::Null)
}

fn remove_style(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let name = capability::arg_str(args, 0)?.to_string();
    let id = m.id.clone();
    m.world.remove_style(&id, &name);
    Ok(Value::Null)
}

fn set(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let name = capability::arg_str(args, 0)?.to_string();
    m.set(&name, capability::arg(args, 1).clone());
    Ok(Value::Null)
}

fn delete(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let name = capability::arg_str(args, 0)?.to_string();
    m.delete(&name);
    Ok(Value::Null)
}

fn set_dom_id(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let dom_id = capability::arg(args, 0).as_str().map(str::to_string);
    let id = m.id.clone();
    m.world.set_dom_id(&id, dom_id);
    Ok(Value::Null)
}

fn set_class_list(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let classes = match capability::arg(args, 0) {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(text) => text.split_whitespace().map(str::to_string).collect(),
        Value::Null => Vec::new(),
        _ => {
            return Err(DispatchError::BadArgument {
                index: 0,
                expected: "array of strings",
            })
        }
    };
    let id = m.id.clone();
    m.world.set_class_list(&id, classes);
    Ok(Value::Null)
}

fn add_classes(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let classes = capability::arg_str(args, 0)?.to_string();
    let id = m.id.clone();
    m.world.add_classes(&id, &classes);
    Ok(Value::Null)
}

fn remove_classes(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let classes = capability::arg_str(args, 0)?.to_string();
    let id = m.id.clone();
    m.world.remove_classes(&id, &classes);
    Ok(Value::Null)
}

fn set_content(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let content = capability::arg(args, 0).as_str().map(str::to_string);
    let id = m.id.clone();
    m.world.set_content(&id, content);
    Ok(Value::Null)
}

fn append_child(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let child = EntityId::from(capability::arg_str(args, 0)?);
    let id = m.id.clone();
    m.world.append_child(&id, &child).map_err(failed)?;
    Ok(Value::Null)
}

fn remove_child(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let child = EntityId::from(capability::arg_str(args, 0)?);
    let id = m.id.clone();
    m.world.remove_child(&id, &child).map_err(failed)?;
    Ok(Value::Null)
}

fn remove(m: &mut ModelFacade<'_>, _: &[Value]) -> OpResult {
    let id = m.id.clone();
    m.world.remove(&id).map_err(failed)?;
    Ok(Value::Null)
}

fn publish_to_all(m: &mut ModelFacade<'_>, args: &[Value]) -> OpResult {
    let id = m.id.clone();
    m.world.publish_to_all(&id, capability::arg(args, 0).clone());
    Ok(Value::Null)
}

/// Operations every entity has, reachable with no capability name.
pub(super) fn builtins() -> ModelCapability {
    ModelCapability::new(BUILTIN)
        .with_op("setStyle", set_style)
        .with_op("removeStyle", remove_style)
        .with_op("set", set)
        .with_op("delete", delete)
        .with_op("setDomId", set_dom_id)
        .with_op("setClassList", set_class_list)
        .with_op("addClasses", add_classes)
        .with_op("removeClasses", remove_classes)
        .with_op("setContent", set_content)
        .with_op("appendChild", append_child)
        .with_op("removeChild", remove_child)
        .with_op("remove", remove)
        .with_op("publishToAll", publish_to_all)
}
