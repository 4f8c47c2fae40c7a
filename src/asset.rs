//! Asset references and their asynchronous resolution.
//!
//! The model only ever stores an [`AssetRef`]. Turning it into something the surface can show
//! is the job of an [`AssetFetcher`], which may complete immediately or later from any thread.
//! Completions carry the generation of the request; a reconciler only accepts the completion for
//! its latest request, so out-of-order completions cannot clobber a newer resource.

use crate::entity::EntityId;
use crate::error::AssetError;
use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A reference to stored data, by handle and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub handle: String,
    pub mime: String,
}

impl AssetRef {
    pub fn new(handle: impl Into<String>, mime: impl Into<String>) -> Self {
        AssetRef {
            handle: handle.into(),
            mime: mime.into(),
        }
    }

    /// Parses the `<handle>.<mime suffix>` text form.
    pub fn parse(text: &str) -> Option<Self> {
        let (handle, mime) = text.trim().split_once('.')?;
        if handle.is_empty() || mime.is_empty() {
            return None;
        }
        Some(AssetRef::new(handle, mime))
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.handle, self.mime)
    }
}

/// A resolved asset, usable as a surface resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub url: String,
}

/// Message sent back when a fetch finishes.
#[derive(Debug)]
pub(crate) struct AssetCompletion {
    pub(crate) entity: EntityId,
    pub(crate) generation: u64,
    pub(crate) result: Result<ResolvedAsset, AssetError>,
}

/// Completion handle passed to [`AssetFetcher::fetch`]. Consumed by completing it.
#[derive(Debug)]
pub struct Completion {
    entity: EntityId,
    generation: u64,
    sender: Sender<AssetCompletion>,
}

impl Completion {
    pub(crate) fn new(entity: EntityId, generation: u64, sender: Sender<AssetCompletion>) -> Self {
        Completion {
            entity,
            generation,
            sender,
        }
    }

    /// The entity the asset was requested for.
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn complete(self, result: Result<ResolvedAsset, AssetError>) {
        let completion = AssetCompletion {
            entity: self.entity,
            generation: self.generation,
            result,
        };
        if self.sender.send(completion).is_err() {
            // the view tree is gone; nothing left to update
            tracing::trace!("asset completion dropped after view tree shutdown");
        }
    }
}

/// Fetches assets by handle.
pub trait AssetFetcher {
    /// Starts fetching an asset. The completion may be called before returning or at any later
    /// point, from any thread.
    fn fetch(&mut self, asset: &AssetRef, completion: Completion);

    /// Releases a previously resolved asset that is no longer displayed.
    fn release(&mut self, resolved: &ResolvedAsset) {
        let _ = resolved;
    }
}

/// A fetcher backed by a fixed map of handles to URLs; completes synchronously.
#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    urls: HashMap<String, String>,
    released: Vec<String>,
}

impl StaticAssets {
    pub fn new() -> Self {
        StaticAssets::default()
    }

    pub fn insert(&mut self, handle: impl Into<String>, url: impl Into<String>) {
        self.urls.insert(handle.into(), url.into());
    }

    /// URLs that have been released so far, in order.
    pub fn released(&self) -> &[String] {
        &self.released
    }
}

impl AssetFetcher for StaticAssets {
    fn fetch(&mut self, asset: &AssetRef, completion: Completion) {
        let result = match self.urls.get(&asset.handle) {
            Some(url) => Ok(ResolvedAsset { url: url.clone() }),
            None => Err(AssetError::Unavailable(asset.handle.clone())),
        };
        completion.complete(result);
    }

    fn release(&mut self, resolved: &ResolvedAsset) {
        self.released.push(resolved.url.clone());
    }
}
