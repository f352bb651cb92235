//! Per-context mapping from configuration name to cached handle.

use std::collections::HashMap;

use crate::connection::HandleId;
use crate::name::ConfigName;
use crate::observability::LOG_TARGET;

/// A connection stored in a registry together with its identity.
#[derive(Debug)]
pub struct CachedHandle<C> {
    id: HandleId,
    conn: C,
}

impl<C> CachedHandle<C> {
    /// Wraps `conn`, assigning it a fresh [`HandleId`].
    pub fn new(conn: C) -> Self {
        Self {
            id: HandleId::next(),
            conn,
        }
    }

    /// Returns the identity assigned when the handle was cached.
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }

    /// Borrows the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.conn
    }

    /// Mutably borrows the underlying connection.
    pub const fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Unwraps the underlying connection.
    pub fn into_inner(self) -> C {
        self.conn
    }
}

/// Holds at most one cached handle per configuration name.
///
/// The backing map is allocated the first time an entry is stored. Only
/// [`ContextRegistry::evict`] and [`ContextRegistry::drain`] remove entries.
#[derive(Debug)]
pub struct ContextRegistry<C> {
    entries: Option<HashMap<ConfigName, CachedHandle<C>>>,
}

impl<C> ContextRegistry<C> {
    /// Creates an empty registry without allocating storage.
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: None }
    }

    /// Returns the handle cached under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &ConfigName) -> Option<&CachedHandle<C>> {
        self.entries.as_ref()?.get(name)
    }

    /// Returns the handle cached under `name` for probing or use.
    pub fn lookup(&mut self, name: &ConfigName) -> Option<&mut CachedHandle<C>> {
        self.entries.as_mut()?.get_mut(name)
    }

    /// Inserts `handle` under `name`, returning the entry it displaced.
    pub fn store(&mut self, name: ConfigName, handle: CachedHandle<C>) -> Option<CachedHandle<C>> {
        let entries = self.entries.get_or_insert_with(|| {
            tracing::trace!(target: LOG_TARGET, "allocating context registry storage");
            HashMap::new()
        });
        entries.insert(name, handle)
    }

    /// Removes and returns the entry for `name`.
    pub fn evict(&mut self, name: &ConfigName) -> Option<CachedHandle<C>> {
        self.entries.as_mut()?.remove(name)
    }

    /// Removes every entry, yielding them in name order.
    pub fn drain(&mut self) -> Vec<(ConfigName, CachedHandle<C>)> {
        let mut drained: Vec<_> = self
            .entries
            .as_mut()
            .map(|entries| entries.drain().collect())
            .unwrap_or_default();
        drained.sort_by(|(a, _), (b, _)| a.cmp(b));
        drained
    }

    /// Number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, HashMap::len)
    }

    /// Returns `true` when no handle is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached configuration names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&ConfigName> {
        let mut names: Vec<_> = self
            .entries
            .as_ref()
            .map(|entries| entries.keys().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    #[cfg(test)]
    const fn is_allocated(&self) -> bool {
        self.entries.is_some()
    }
}

impl<C> Default for ContextRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
