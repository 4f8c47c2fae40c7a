//! Error types.

use crate::entity::EntityId;
use thiserror::Error;

/// Errors raised while dispatching a capability operation.
///
/// These never escape a `call`; they are logged at the call boundary. `try_call` hands them to
/// callers that want to react.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("capability not installed: {capability} on {entity}")]
    CapabilityNotInstalled { entity: EntityId, capability: String },

    #[error("operation not found: {operation} in {scope} on {entity}")]
    OperationNotFound {
        entity: EntityId,
        scope: String,
        operation: String,
    },

    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),

    #[error("no view for entity: {0}")]
    NoSuchView(EntityId),

    #[error("bad argument {index}: expected {expected}")]
    BadArgument { index: usize, expected: &'static str },

    #[error("operation failed: {0}")]
    Failed(String),
}

impl DispatchError {
    pub fn failed(message: impl Into<String>) -> Self {
        DispatchError::Failed(message.into())
    }
}

/// Consistency errors in scene-graph mutations.
///
/// A mutation that hits one of these changes nothing and logs a warning; message handlers carry
/// on with the next message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),

    #[error("nonexistent source parent: {0}")]
    NoSuchParent(EntityId),

    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: EntityId, child: EntityId },

    #[error("{child} is an ancestor of {parent}")]
    Cycle { parent: EntityId, child: EntityId },

    #[error("the world entity cannot be removed")]
    RemoveWorld,

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

/// Errors parsing style text.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("invalid value for {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid asset reference: {0}")]
    BadAsset(String),

    #[error("invalid transform: {0}")]
    BadTransform(String),
}

/// Input-validation errors in child reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("duplicate key in target child list: {0}")]
    DuplicateKey(EntityId),
}

/// Asset resolution errors; these are swallowed at the async boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("failed to fetch asset {handle}: {message}")]
    Fetch { handle: String, message: String },

    #[error("asset {0} is not available")]
    Unavailable(String),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}
