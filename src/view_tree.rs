//! The view tree: reconciles a world onto a backend, once per tick.

use crate::asset::{AssetCompletion, AssetFetcher, Completion};
use crate::backend::Backend;
use crate::capability::{self, CapabilityRegistry, OpResult, Resolved, ViewCapability, ViewOp, INIT};
use crate::children::{self, ChildOp, Plan};
use crate::config::Config;
use crate::entity::{Entity, EntityId, HandlerSpec};
use crate::error::DispatchError;
use crate::events::{self, Cooked, RawEvent};
use crate::nv_tree::NVTree;
use crate::patch::{NodeId, Patch};
use crate::pointer::{self, Grab, GrabHandler, PointerBroker};
use crate::rect::Rect;
use crate::view::Reconciler;
use crate::world::{DomEvent, Message, Substrate, World, DOM_EVENT};
use crossbeam::channel::{self, Receiver, Sender};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

/// Scope name used in errors for the built-in view operations.
const BUILTIN: &str = "builtin";

/// What a tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Entities applied, in order. Each at most once.
    pub applied: Vec<EntityId>,
    /// Entities whose views were torn down.
    pub removed: Vec<EntityId>,
    /// Every patch applied to the surface since the previous frame, in order.
    pub patches: Vec<Patch>,
}

/// Services a view operation can reach through its [`ViewFacade`].
///
/// Implemented by [`ViewTree`]; kept object-safe so operations do not depend on the backend.
pub trait ViewHost {
    /// Calls a view operation on an entity.
    fn dispatch(
        &mut self,
        world: &World,
        id: &EntityId,
        capability: Option<&str>,
        operation: &str,
        args: &[Value],
    ) -> OpResult;

    fn view_state(&self, id: &EntityId) -> Option<&Map<String, Value>>;

    fn view_state_mut(&mut self, id: &EntityId) -> Option<&mut Map<String, Value>>;

    fn bounding_rect(&self, id: &EntityId) -> Option<Rect>;

    /// Queues a message for the substrate.
    fn publish(&mut self, scope: &str, event: &str, data: Value);

    /// Runs `spec` on the entity's view at the end of the next tick.
    fn request_initialization(&mut self, id: &EntityId, spec: HandlerSpec);

    fn grab(&mut self, target: &EntityId, on_move: GrabHandler, on_up: GrabHandler, for_touch: bool);

    fn release_grab(&mut self);

    fn capture_pointer(&mut self, id: &EntityId, pointer_id: i64);

    /// Releases one pointer held by the entity's node, or every captured pointer with `None`.
    fn release_pointer(&mut self, id: &EntityId, pointer_id: Option<i64>);
}

/// A view as seen from inside one of its operations.
pub struct ViewFacade<'a> {
    host: &'a mut dyn ViewHost,
    world: &'a World,
    id: EntityId,
    capability: Option<Arc<ViewCapability>>,
}

impl<'a> ViewFacade<'a> {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// The replicated entity. Read-only: views never write into the world.
    pub fn entity(&self) -> Option<&'a Entity> {
        let world: &'a World = self.world;
        world.get(&self.id)
    }

    pub fn world(&self) -> &'a World {
        self.world
    }

    pub fn capability_name(&self) -> Option<&str> {
        self.capability.as_deref().map(ViewCapability::name)
    }

    /// Reads view-local state.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.host.view_state(&self.id)?.get(name)
    }

    /// Writes view-local state.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(state) = self.host.view_state_mut(&self.id) {
            state.insert(name.to_string(), value);
        }
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
        let mut facade = ViewFacade {
            host: &mut *self.host,
            world: self.world,
            id: self.id.clone(),
            capability: Some(capability),
        };
        op(&mut facade, args)
    }

    /// Calls an operation on this view, logging failures.
    pub fn call(&mut self, capability: Option<&str>, operation: &str, args: &[Value]) -> Option<Value> {
        match self
            .host
            .dispatch(self.world, &self.id, capability, operation, args)
        {
            Ok(value) => Some(value),
            Err(err) => {
                log_call_error(&self.id, capability, operation, &err);
                None
            }
        }
    }

    pub fn publish(&mut self, scope: &str, event: &str, data: Value) {
        self.host.publish(scope, event, data);
    }

    /// Runs an operation again at the end of the next tick; a bare name refers to this
    /// capability.
    pub fn request_initialization(&mut self, operation: &str) {
        let spec = HandlerSpec::qualified(self.capability_name(), operation);
        self.host.request_initialization(&self.id, spec);
    }

    /// Grabs the pointer for this view. Bare operation names refer to this capability.
    pub fn grab(&mut self, on_move: GrabHandler, on_up: GrabHandler, for_touch: bool) {
        let on_move = self.qualify(on_move);
        let on_up = self.qualify(on_up);
        self.host.grab(&self.id, on_move, on_up, for_touch);
    }

    fn qualify(&self, handler: GrabHandler) -> GrabHandler {
        match handler {
            GrabHandler::Spec(spec) if spec.capability.is_none() => GrabHandler::Spec(
                HandlerSpec::new(self.capability_name(), &spec.operation),
            ),
            other => other,
        }
    }

    pub fn release_grab(&mut self) {
        self.host.release_grab();
    }

    pub fn set_pointer_capture(&mut self, pointer_id: i64) {
        self.host.capture_pointer(&self.id, pointer_id);
    }

    pub fn release_pointer_capture(&mut self, pointer_id: i64) {
        self.host.release_pointer(&self.id, Some(pointer_id));
    }

    pub fn release_all_pointer_capture(&mut self) {
        self.host.release_pointer(&self.id, None);
    }

    pub fn bounding_rect(&self) -> Option<Rect> {
        self.host.bounding_rect(&self.id)
    }
}

fn log_call_error(id: &EntityId, capability: Option<&str>, operation: &str, err: &DispatchError) {
    tracing::error!(
        entity = %id,
        capability = capability.unwrap_or(BUILTIN),
        operation,
        error = %err,
        "view call failed"
    );
}

/// Reconciles a [`World`] onto a [`Backend`].
pub struct ViewTree<B: Backend> {
    nv: NVTree<B>,
    reconcilers: HashMap<EntityId, Reconciler>,
    in_flight: HashSet<EntityId>,
    registry: Arc<CapabilityRegistry<ViewOp>>,
    builtins: Arc<ViewCapability>,
    broker: PointerBroker,
    fetcher: Box<dyn AssetFetcher>,
    asset_tx: Sender<AssetCompletion>,
    asset_rx: Receiver<AssetCompletion>,
    top: Option<EntityId>,
    pending_inits: Vec<(EntityId, String)>,
    deferred: Vec<(EntityId, HandlerSpec)>,
    rounds: usize,
    max_rounds: usize,
    full_refresh: bool,
    outgoing: Vec<Message>,
    patches: Vec<Patch>,
}

impl<B: Backend> ViewTree<B> {
    pub fn new(
        backend: B,
        registry: Arc<CapabilityRegistry<ViewOp>>,
        fetcher: Box<dyn AssetFetcher>,
        config: &Config,
    ) -> ViewTree<B> {
        let (asset_tx, asset_rx) = channel::unbounded();
        ViewTree {
            nv: NVTree::new(backend),
            reconcilers: HashMap::new(),
            in_flight: HashSet::new(),
            registry,
            builtins: Arc::new(builtins()),
            broker: PointerBroker::new(),
            fetcher,
            asset_tx,
            asset_rx,
            top: None,
            pending_inits: Vec::new(),
            deferred: Vec::new(),
            rounds: 0,
            max_rounds: config.initializer_rounds,
            full_refresh: config.full_refresh_on_start,
            outgoing: Vec::new(),
            patches: Vec::new(),
        }
    }

    pub fn nv_tree(&self) -> &NVTree<B> {
        &self.nv
    }

    pub fn backend(&self) -> &B {
        self.nv.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.nv.backend_mut()
    }

    pub fn broker(&self) -> &PointerBroker {
        &self.broker
    }

    pub fn reconciler(&self, id: &EntityId) -> Option<&Reconciler> {
        self.reconcilers.get(id)
    }

    /// The surface node of an entity's view.
    pub fn node(&self, id: &EntityId) -> Option<NodeId> {
        self.reconcilers.get(id).map(Reconciler::node)
    }

    pub fn len(&self) -> usize {
        self.reconcilers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reconcilers.is_empty()
    }

    /// The entity attached under the anchor.
    pub fn top(&self) -> Option<&EntityId> {
        self.top.as_ref()
    }

    /// Makes the next tick apply every entity.
    pub fn request_full_refresh(&mut self) {
        self.full_refresh = true;
    }

    /// Messages queued for the substrate.
    pub fn outgoing(&self) -> &[Message] {
        &self.outgoing
    }

    /// Hands queued messages to the substrate.
    pub fn flush(&mut self, substrate: &mut dyn Substrate) {
        for message in self.outgoing.drain(..) {
            substrate.publish(&message.scope, &message.event, message.data);
        }
    }

    fn emit(&mut self, patch: Patch) {
        tracing::trace!(?patch, "applying patch");
        if let Err(err) = self.nv.patch(patch.clone()) {
            tracing::warn!(error = ?err, ?patch, "failed to apply patch");
        }
        self.patches.push(patch);
    }

    /// Drains the world's dirty set and brings the surface up to date.
    pub fn tick(&mut self, world: &mut World) -> Frame {
        let full = mem::take(&mut self.full_refresh);
        let changed = world.changed_elements(full);
        let world: &World = world;

        let mut frame = Frame::default();
        let mut top_child = None;
        for id in changed {
            match world.get(&id) {
                None => {
                    if self.teardown(&id) {
                        frame.removed.push(id);
                    }
                }
                Some(entity) => {
                    if self.apply(world, entity) {
                        frame.applied.push(id.clone());
                    }
                    let is_top = self.top.as_ref() == Some(&id);
                    if is_top && !entity.is_top_child() {
                        // its parent's children pass has moved it off the anchor
                        self.top = None;
                    } else if !is_top && top_child.is_none() && entity.is_top_child() {
                        top_child = Some(id);
                    }
                }
            }
        }

        if let (None, Some(id)) = (&self.top, top_child) {
            if let Some(node) = self.node(&id) {
                self.emit(Patch::AttachToAnchor(node));
                self.top = Some(id);
            }
        }

        self.poll_assets();
        self.run_initializers(world);
        frame.patches = mem::take(&mut self.patches);
        frame
    }

    /// The entity's node, creating its reconciler if there is none.
    fn ensure_node(&mut self, id: &EntityId) -> Option<NodeId> {
        if let Some(reconciler) = self.reconcilers.get(id) {
            return Some(reconciler.node());
        }
        if self.in_flight.contains(id) {
            tracing::warn!(entity = %id, "view requested while it is being applied");
            return None;
        }
        let node = NodeId::new();
        self.emit(Patch::Create(node, id.clone()));
        self.reconcilers
            .insert(id.clone(), Reconciler::new(id.clone(), node));
        Some(node)
    }

    fn apply(&mut self, world: &World, entity: &Entity) -> bool {
        let id = entity.id().clone();
        let node = match self.ensure_node(&id) {
            Some(node) => node,
            None => return false,
        };
        if !self.in_flight.insert(id.clone()) {
            tracing::warn!(entity = %id, "re-entrant apply rejected");
            return false;
        }
        let mut reconciler = match self.reconcilers.remove(&id) {
            Some(reconciler) => reconciler,
            None => {
                self.in_flight.remove(&id);
                return false;
            }
        };

        let mut out = Vec::new();
        let request = reconciler.apply(entity, &mut out);
        let unused = reconciler.take_unused_asset();
        if reconciler.behaviors_changed(entity) {
            let sources = entity.view_behaviors().to_vec();
            let resolved = Resolved::resolve(&sources, &*self.registry, |path| {
                world.resolve_library(&id, path)
            });
            for name in resolved.initializers() {
                if !self.pending_inits.iter().any(|(e, n)| *e == id && *n == name) {
                    self.pending_inits.push((id.clone(), name));
                }
            }
            reconciler.set_resolved(sources, resolved);
        }
        self.reconcilers.insert(id.clone(), reconciler);

        for patch in out {
            self.emit(patch);
        }
        self.reconcile_children(world, entity, node);

        if let Some(unused) = unused {
            self.fetcher.release(&unused);
        }
        if let Some(request) = request {
            tracing::debug!(entity = %id, asset = %request.asset, "fetching asset");
            let completion = Completion::new(id.clone(), request.generation, self.asset_tx.clone());
            self.fetcher.fetch(&request.asset, completion);
        }

        self.in_flight.remove(&id);
        true
    }

    fn reconcile_children(&mut self, world: &World, entity: &Entity, node: NodeId) {
        // the top child hangs under the anchor, not under its parent
        let target: Vec<EntityId> = entity
            .children()
            .iter()
            .filter(|child| !world.get(child).map_or(false, Entity::is_top_child))
            .cloned()
            .collect();
        let existing = self.nv.subview_keys(node);

        let plan = match children::plan(&existing, &target) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(entity = %entity.id(), error = %err, "refusing child list");
                return;
            }
        };
        match plan {
            Plan::Incremental(ops) => {
                for op in ops {
                    match op {
                        ChildOp::Insert { key, before } => {
                            self.insert_child(node, &key, before.as_ref())
                        }
                        ChildOp::Remove(key) => self.remove_child(node, &key),
                    }
                }
            }
            Plan::Rebuild => {
                tracing::debug!(entity = %entity.id(), "rebuilding child list");
                for key in &existing {
                    self.remove_child(node, key);
                }
                for key in &target {
                    self.insert_child(node, key, None);
                }
            }
        }
    }

    fn insert_child(&mut self, parent: NodeId, key: &EntityId, before: Option<&EntityId>) {
        let child = match self.ensure_node(key) {
            Some(child) => child,
            None => return,
        };
        let before = before.and_then(|before| self.node(before));
        self.emit(Patch::InsertSubview {
            parent,
            child,
            before,
        });
    }

    fn remove_child(&mut self, parent: NodeId, key: &EntityId) {
        // the child may already have moved under another parent this tick
        if let Some(child) = self.node(key) {
            if self.nv.superview(child) == Some(parent) {
                self.emit(Patch::RemoveSubview { parent, child });
            }
        }
    }

    /// Tears down an entity's view. Returns whether it had one.
    fn teardown(&mut self, id: &EntityId) -> bool {
        let reconciler = match self.reconcilers.remove(id) {
            Some(reconciler) => reconciler,
            None => return false,
        };
        tracing::debug!(entity = %id, "tearing down view");
        let node = reconciler.node();
        self.broker.forget_node(node);
        if self.broker.grab().map_or(false, |grab| grab.target == *id) {
            for patch in self.broker.release_grab() {
                self.emit(patch);
            }
        }

        let mut out = Vec::new();
        let shown = reconciler.teardown(&mut out);
        for patch in out {
            self.emit(patch);
        }
        if let Some(shown) = shown {
            self.fetcher.release(&shown);
        }

        if self.top.as_ref() == Some(id) {
            self.top = None;
        }
        self.pending_inits.retain(|(e, _)| e != id);
        self.deferred.retain(|(e, _)| e != id);
        true
    }

    /// Applies asset completions that have arrived.
    pub fn poll_assets(&mut self) {
        while let Ok(completion) = self.asset_rx.try_recv() {
            let mut out = Vec::new();
            let release = match self.reconcilers.get_mut(&completion.entity) {
                Some(reconciler) => {
                    reconciler.complete_asset(completion.generation, completion.result, &mut out)
                }
                None => {
                    tracing::debug!(entity = %completion.entity, "asset completion for a removed view");
                    completion.result.ok()
                }
            };
            for patch in out {
                self.emit(patch);
            }
            if let Some(release) = release {
                self.fetcher.release(&release);
            }
        }
    }

    fn run_initializers(&mut self, world: &World) {
        let due = mem::take(&mut self.deferred);
        for (id, name) in mem::take(&mut self.pending_inits) {
            self.call(world, &id, Some(&name), INIT, &[]);
        }

        if due.is_empty() {
            self.rounds = 0;
            return;
        }
        self.rounds += 1;
        if self.rounds > self.max_rounds {
            tracing::warn!(
                dropped = due.len(),
                rounds = self.rounds,
                "initializers kept requesting another round; giving up"
            );
            self.rounds = 0;
            return;
        }
        for (id, spec) in due {
            self.call(world, &id, spec.capability.as_deref(), &spec.operation, &[]);
        }
    }

    /// Calls a view operation and logs any failure.
    pub fn call(
        &mut self,
        world: &World,
        id: &EntityId,
        capability: Option<&str>,
        operation: &str,
        args: &[Value],
    ) -> Option<Value> {
        match self.try_call(world, id, capability, operation, args) {
            Ok(value) => Some(value),
            Err(err) => {
                log_call_error(id, capability, operation, &err);
                None
            }
        }
    }

    /// Like [`ViewTree::call`], but hands the error back.
    pub fn try_call(
        &mut self,
        world: &World,
        id: &EntityId,
        capability: Option<&str>,
        operation: &str,
        args: &[Value],
    ) -> OpResult {
        let resolved = self
            .reconcilers
            .get(id)
            .map(|reconciler| reconciler.resolved().clone())
            .ok_or_else(|| DispatchError::NoSuchView(id.clone()))?;
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
        let mut facade = ViewFacade {
            host: self,
            world,
            id: id.clone(),
            capability,
        };
        op(&mut facade, args)
    }

    /// Handles an event from a listener bound on `node` and queues the matching `domEvent`.
    ///
    /// Returns the cooked event so the caller can honour its propagation controls.
    pub fn handle_raw_event(&mut self, world: &World, node: NodeId, raw: &RawEvent) -> Option<Cooked> {
        let key = self.nv.key(node)?.clone();
        let binding = match self.reconcilers.get(&key).and_then(|r| r.listener(&raw.kind)) {
            Some(binding) => binding.clone(),
            None => {
                tracing::debug!(entity = %key, event = %raw.kind, "no listener bound");
                return None;
            }
        };

        let origin = raw.target.unwrap_or(node);
        let target = self.nv.key(origin).cloned();
        let mut cooked = events::cook(raw, target, self.nv.bounding_rect(origin));
        cooked.prevent_default();

        let payload = serde_json::to_value(cooked.event()).and_then(|evt| {
            serde_json::to_value(DomEvent {
                element_id: key.clone(),
                evt,
                capability: binding.spec.capability.clone(),
                method: binding.spec.operation.clone(),
            })
        });
        match payload {
            Ok(data) => self
                .outgoing
                .push(Message::new(world.root().as_str(), DOM_EVENT, data)),
            Err(err) => tracing::warn!(entity = %key, error = %err, "failed to encode event"),
        }
        Some(cooked)
    }

    /// Handles an event from a surface-wide listener. Only grabs install those.
    pub fn handle_host_event(&mut self, world: &World, raw: &RawEvent) -> Option<Cooked> {
        if raw.kind == "dragstart" {
            // drags leaving the window can start spurious native drags
            let grab = self.broker.grab()?;
            tracing::debug!(entity = %grab.target, "cancelling native drag during grab");
            let mut cooked = events::cook(raw, None, None);
            cooked.prevent_default();
            cooked.stop_propagation();
            return Some(cooked);
        }

        if pointer::is_move(&raw.kind) {
            let (target, handler) = self.broker.pointer_move()?;
            let cooked = self.cook_for(&target, raw);
            self.run_grab_handler(world, &target, &handler, &cooked);
            Some(cooked)
        } else if pointer::is_up(&raw.kind) {
            let (target, handler, patches) = self.broker.pointer_up()?;
            for patch in patches {
                self.emit(patch);
            }
            let mut cooked = self.cook_for(&target, raw);
            cooked.prevent_default();
            cooked.stop_propagation();
            self.run_grab_handler(world, &target, &handler, &cooked);
            Some(cooked)
        } else {
            None
        }
    }

    fn cook_for(&self, target: &EntityId, raw: &RawEvent) -> Cooked {
        let origin = raw.target.or_else(|| self.node(target));
        let key = raw
            .target
            .and_then(|node| self.nv.key(node).cloned())
            .or_else(|| Some(target.clone()));
        events::cook(raw, key, origin.and_then(|node| self.nv.bounding_rect(node)))
    }

    fn run_grab_handler(&mut self, world: &World, target: &EntityId, handler: &GrabHandler, cooked: &Cooked) {
        match handler {
            GrabHandler::Spec(spec) => match serde_json::to_value(cooked.event()) {
                Ok(evt) => {
                    self.call(world, target, spec.capability.as_deref(), &spec.operation, &[evt]);
                }
                Err(err) => tracing::warn!(entity = %target, error = %err, "failed to encode event"),
            },
            GrabHandler::Callback(callback) => callback.call(cooked.event()),
        }
    }

    /// Tears down every view, releases captured pointers and cancels the grab. The next tick
    /// repaints from scratch.
    pub fn detach(&mut self) -> Frame {
        for (pointer_id, holder) in self.broker.release_pointer(None, None) {
            if let Err(err) = self.nv.release_pointer_capture(holder, pointer_id) {
                tracing::warn!(pointer_id, error = ?err, "failed to release pointer capture");
            }
        }
        for patch in self.broker.release_grab() {
            self.emit(patch);
        }

        let mut ids: Vec<EntityId> = self.reconcilers.keys().cloned().collect();
        ids.sort();
        let mut frame = Frame::default();
        for id in ids {
            if self.teardown(&id) {
                frame.removed.push(id);
            }
        }
        self.pending_inits.clear();
        self.deferred.clear();
        self.rounds = 0;
        self.full_refresh = true;
        frame.patches = mem::take(&mut self.patches);
        frame
    }
}

impl<B: Backend> ViewHost for ViewTree<B> {
    fn dispatch(
        &mut self,
        world: &World,
        id: &EntityId,
        capability: Option<&str>,
        operation: &str,
        args: &[Value],
    ) -> OpResult {
        self.try_call(world, id, capability, operation, args)
    }

    fn view_state(&self, id: &EntityId) -> Option<&Map<String, Value>> {
        self.reconcilers.get(id).map(Reconciler::state)
    }

    fn view_state_mut(&mut self, id: &EntityId) -> Option<&mut Map<String, Value>> {
        self.reconcilers.get_mut(id).map(Reconciler::state_mut)
    }

    fn bounding_rect(&self, id: &EntityId) -> Option<Rect> {
        self.nv.bounding_rect(self.node(id)?)
    }

    fn publish(&mut self, scope: &str, event: &str, data: Value) {
        self.outgoing.push(Message::new(scope, event, data));
    }

    fn request_initialization(&mut self, id: &EntityId, spec: HandlerSpec) {
        self.deferred.push((id.clone(), spec));
    }

    fn grab(&mut self, target: &EntityId, on_move: GrabHandler, on_up: GrabHandler, for_touch: bool) {
        let patches = self.broker.start_grab(Grab {
            target: target.clone(),
            on_move,
            on_up,
            for_touch,
        });
        for patch in patches {
            self.emit(patch);
        }
    }

    fn release_grab(&mut self) {
        for patch in self.broker.release_grab() {
            self.emit(patch);
        }
    }

    fn capture_pointer(&mut self, id: &EntityId, pointer_id: i64) {
        let node = match self.node(id) {
            Some(node) => node,
            None => {
                tracing::warn!(entity = %id, pointer_id, "capturing pointer for an entity without a view");
                return;
            }
        };
        match self.nv.set_pointer_capture(node, pointer_id) {
            Ok(()) => self.broker.capture_pointer(pointer_id, node),
            Err(err) => tracing::warn!(entity = %id, pointer_id, error = ?err, "failed to capture pointer"),
        }
    }

    fn release_pointer(&mut self, id: &EntityId, pointer_id: Option<i64>) {
        let node = self.node(id);
        for (pointer_id, holder) in self.broker.release_pointer(pointer_id, node) {
            if let Err(err) = self.nv.release_pointer_capture(holder, pointer_id) {
                tracing::warn!(pointer_id, error = ?err, "failed to release pointer capture");
            }
        }
    }
}

fn pointer_id(args: &[Value]) -> Result<i64, DispatchError> {
    capability::arg(args, 0)
        .as_i64()
        .ok_or(DispatchError::BadArgument {
            index: 0,
            expected: "integer",
        })
}

fn set_pointer_capture(v: &mut ViewFacade<'_>, args: &[Value]) -> OpResult {
    v.set_pointer_capture(pointer_id(args)?);
    Ok(Value::Null)
}

fn release_pointer_capture(v: &mut ViewFacade<'_>, args: &[Value]) -> OpResult {
    v.release_pointer_capture(pointer_id(args)?);
    Ok(Value::Null)
}

fn release_all_pointer_capture(v: &mut ViewFacade<'_>, _: &[Value]) -> OpResult {
    v.release_all_pointer_capture();
    Ok(Value::Null)
}

fn publish(v: &mut ViewFacade<'_>, args: &[Value]) -> OpResult {
    let scope = capability::arg_str(args, 0)?.to_string();
    let event = capability::arg_str(args, 1)?.to_string();
    v.publish(&scope, &event, capability::arg(args, 2).clone());
    Ok(Value::Null)
}

/// Operations every view has, reachable with no capability name.
fn builtins() -> ViewCapability {
    ViewCapability::new(BUILTIN)
        .with_op("setPointerCapture", set_pointer_capture)
        .with_op("releasePointerCapture", release_pointer_capture)
        .with_op("releaseAllPointerCapture", release_all_pointer_capture)
        .with_op("publish", publish)
}
