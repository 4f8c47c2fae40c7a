//! Replicated scene-graph core.
//!
//! # Conceptual overview
//! Cards is the runtime core of a framework for collaborative, multi-user interactive surfaces.
//! Every participant holds an identical copy of a tree of entities (the [`World`]); an external
//! replication substrate delivers the same events in the same order to every copy, so the
//! copies never diverge. Each participant then renders its copy onto a retained-mode native
//! display surface (a [`Backend`]) through an incremental reconciler (the [`ViewTree`]).
//!
//! ## Entities
//! Entities are the nodes of the replicated tree. They have an identity, a parent (by identity,
//! never by pointer), an ordered list of children, a [`Style`], free-form attributes, and lists
//! of behaviors. All mutations go through the world, which keeps the reverse index from identity
//! to entity and records which entities were touched since the last frame.
//!
//! ## Capabilities
//! Behavior is attached to entities by name. A capability is a named table of operations,
//! registered once at startup in a [`CapabilityRegistry`]. An entity lists the capabilities it
//! wants (directly or through a dotted library path) and the world resolves that list into an
//! operation table the first time it is needed. Calls go through a façade bound to the entity,
//! and a misbehaving operation is logged at the call boundary instead of aborting delivery.
//!
//! ## Reconciliation
//! Once per frame the view tree drains the world's dirty set. Every dirty entity has a
//! [`Reconciler`] holding the values it last applied; the reconciler diffs the entity against
//! those values and emits [`Patch`]es. Patches are applied to the [`NVTree`] (native-view tree),
//! which keeps the backend in sync and knows which surface nodes are children of which.
//!
//! Child lists are diffed with a two-cursor matcher that handles appends, removals and
//! insertions incrementally and falls back to rebuilding the list when a reorder cannot be
//! expressed that way.
//!
//! ## Events
//! Input arriving at a surface node is cooked into a portable descriptor (see [`events`]),
//! stripped of its propagation controls and published to the substrate; the world then
//! delivers it to the entity's bound operation. Drags are tracked by the [`PointerBroker`],
//! which owns at most one grab at a time.
//!
//! ## Replicated vs. local state
//! The view side never writes into the world. Anything asynchronous (asset fetches) completes
//! into reconciler-local state only, so replicas stay identical regardless of timing.

pub mod asset;
pub mod backend;
pub mod capability;
pub mod children;
pub mod config;
pub mod dirty;
pub mod entity;
pub mod error;
pub mod events;
mod host;
pub mod library;
pub mod logging;
pub mod memory;
mod nv_tree;
mod patch;
pub mod pointer;
mod rect;
pub mod style;
mod view;
mod view_tree;
pub mod world;

pub use asset::{AssetFetcher, AssetRef, ResolvedAsset, StaticAssets};
pub use backend::Backend;
pub use capability::{CapabilityRegistry, ModelCapability, ModelOp, ViewCapability, ViewOp};
pub use config::Config;
pub use entity::{BehaviorSource, Entity, EntityId, HandlerSpec};
pub use host::{Host, SubstrateSender, ViewId};
pub use nv_tree::{NVTree, PatchError};
pub use patch::{HostScope, NodeId, Patch};
pub use pointer::{GrabCallback, GrabHandler, PointerBroker};
pub use rect::Rect;
pub use style::{Style, StyleValue};
pub use view::Reconciler;
pub use view_tree::{Frame, ViewFacade, ViewHost, ViewTree};
pub use world::{DomEvent, Message, ModelFacade, Substrate, World};
