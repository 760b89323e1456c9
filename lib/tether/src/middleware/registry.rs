//! Shared middleware store.

use std::sync::{Arc, PoisonError, RwLock};

use derive_more::{Display, Error};
use tracing::debug;

use super::{Middleware, MiddlewareChain, MiddlewareId};

/// Error returned by [`MiddlewareRegistry::add`].
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum RegistryError {
    /// An entry with the same id is already registered.
    #[display("middleware {_0} is already registered")]
    DuplicateId(#[error(not(source))] MiddlewareId),
}

/// Ordered store of [`Middleware`] entries.
///
/// Writers (registration, removal) take the write lock; readers only ever
/// clone the list under the read lock and work on that snapshot, so a
/// concurrent removal never affects a dispatch pass already in progress.
#[derive(Debug, Default)]
pub struct MiddlewareRegistry {
    entries: RwLock<Vec<Arc<Middleware>>>,
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; registration order is dispatch order.
    pub fn add(&self, middleware: Middleware) -> Result<MiddlewareId, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|entry| entry.id() == middleware.id()) {
            return Err(RegistryError::DuplicateId(middleware.id().clone()));
        }
        let id = middleware.id().clone();
        debug!(id = %id, pattern = ?middleware.pattern(), "middleware registered");
        entries.push(Arc::new(middleware));
        Ok(id)
    }

    /// Remove the entry with the given id.
    pub fn remove(&self, id: &MiddlewareId) -> Option<Arc<Middleware>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let index = entries.iter().position(|entry| entry.id() == id)?;
        debug!(id = %id, "middleware removed");
        Some(entries.remove(index))
    }

    /// Remove every entry whose pattern text equals `pattern`.
    ///
    /// Returns the number of removed entries.
    pub fn remove_matching(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|entry| entry.pattern().pattern() != pattern);
        let removed = before - entries.len();
        debug!(pattern, removed, "middleware removed by pattern");
        removed
    }

    /// Copy of the current entries, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Middleware>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot grouped for `path`.
    #[must_use]
    pub fn chain_for(&self, path: &str) -> MiddlewareChain {
        MiddlewareChain::new(self.snapshot(), path)
    }

    /// Ids of the current entries, in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<MiddlewareId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.id().clone())
            .collect()
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
