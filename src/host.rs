//! Connects a world and its view tree to a replication substrate.

use crate::asset::AssetFetcher;
use crate::backend::Backend;
use crate::capability::{CapabilityRegistry, ModelOp, ViewOp};
use crate::config::Config;
use crate::events::{Cooked, RawEvent};
use crate::patch::NodeId;
use crate::view_tree::{Frame, ViewTree};
use crate::world::{Message, Substrate, World, VIEW_EXIT, VIEW_JOIN};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifies one participant's view of the session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u32, u16, u16, [u8; 8]);

impl ViewId {
    pub(crate) fn new() -> ViewId {
        let uuid = Uuid::new_v4();
        let (a, b, c, d) = uuid.as_fields();
        ViewId(a, b, c, *d)
    }

    fn uuid(&self) -> Uuid {
        Uuid::from_fields(self.0, self.1, self.2, &self.3)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.uuid().simple())
    }
}

impl fmt::Debug for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ViewId({})", self.uuid().simple())
    }
}

/// A substrate that loops every publication back through a channel.
///
/// Stands in for the network when there is only one participant; a real substrate would
/// sequence messages from every participant before they come back.
#[derive(Debug, Clone)]
pub struct SubstrateSender(Sender<Message>);

impl SubstrateSender {
    pub fn new(sender: Sender<Message>) -> SubstrateSender {
        SubstrateSender(sender)
    }
}

impl Substrate for SubstrateSender {
    fn publish(&mut self, scope: &str, event: &str, data: Value) {
        if let Err(err) = self.0.send(Message::new(scope, event, data)) {
            tracing::warn!(error = %err, "failed to publish message");
        }
    }
}

/// One participant: a world replica, its view tree and the substrate connection.
pub struct Host<B: Backend> {
    world: World,
    tree: ViewTree<B>,
    view_id: ViewId,
    sender: SubstrateSender,
    receiver: Receiver<Message>,
    synced: bool,
}

impl<B: Backend> Host<B> {
    /// Creates a host with a loopback substrate.
    ///
    /// Nothing is rendered until the host is synced and [`Host::frame`] is called.
    pub fn new(world: World, tree: ViewTree<B>) -> Host<B> {
        let (sender, receiver) = channel::unbounded();
        Host {
            world,
            tree,
            view_id: ViewId::new(),
            sender: SubstrateSender::new(sender),
            receiver,
            synced: false,
        }
    }

    /// Builds the world and view tree from `config`, installing the log subscriber first.
    pub fn from_config(
        config: &Config,
        models: Arc<CapabilityRegistry<ModelOp>>,
        backend: B,
        views: Arc<CapabilityRegistry<ViewOp>>,
        fetcher: Box<dyn AssetFetcher>,
    ) -> Host<B> {
        config.init_logging();
        let world = World::new(config, models);
        let tree = ViewTree::new(backend, views, fetcher, config);
        tracing::debug!(session = %config.session_id, "host created");
        Host::new(world, tree)
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn tree(&self) -> &ViewTree<B> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ViewTree<B> {
        &mut self.tree
    }

    /// A handle for publishing into this host's substrate from elsewhere.
    pub fn sender(&self) -> SubstrateSender {
        self.sender.clone()
    }

    pub fn publish(&mut self, scope: &str, event: &str, data: Value) {
        self.sender.publish(scope, event, data);
    }

    /// Announces this participant on the session scope.
    pub fn join(&mut self) {
        let scope = self.world.session_id().to_string();
        self.sender
            .publish(&scope, VIEW_JOIN, json!(self.view_id.to_string()));
    }

    /// Marks the replica as caught up with the session. Frames are skipped until then.
    pub fn set_synced(&mut self, synced: bool) {
        if synced && !self.synced {
            self.tree.request_full_refresh();
        }
        self.synced = synced;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Delivers every queued message to the world and applies finished asset fetches.
    /// Returns the number of messages delivered.
    pub fn poll(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    self.world.deliver(message);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) => break,
                // we hold a sender ourselves, so this cannot happen
                Err(TryRecvError::Disconnected) => break,
            }
        }
        self.tree.poll_assets();
        delivered
    }

    /// Advances the world's clock, running due future calls.
    pub fn advance_to(&mut self, time: u64) {
        self.world.advance_to(time);
    }

    /// Reconciles the surface with the world and publishes what the views queued.
    pub fn frame(&mut self) -> Frame {
        let frame = if self.synced {
            self.tree.tick(&mut self.world)
        } else {
            Frame::default()
        };
        self.tree.flush(&mut self.sender);
        frame
    }

    /// Handles input from a bound surface listener.
    pub fn handle_raw_event(&mut self, node: NodeId, raw: &RawEvent) -> Option<Cooked> {
        let cooked = self.tree.handle_raw_event(&self.world, node, raw);
        self.tree.flush(&mut self.sender);
        cooked
    }

    /// Handles input from a surface-wide listener.
    pub fn handle_host_event(&mut self, raw: &RawEvent) -> Option<Cooked> {
        let cooked = self.tree.handle_host_event(&self.world, raw);
        self.tree.flush(&mut self.sender);
        cooked
    }

    /// Leaves the session and tears the surface down. The world replica is kept.
    pub fn detach(&mut self) -> Frame {
        let scope = self.world.session_id().to_string();
        self.sender
            .publish(&scope, VIEW_EXIT, json!(self.view_id.to_string()));
        self.synced = false;
        self.tree.detach()
    }
}
