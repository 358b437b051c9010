//! Storage-boundary constraints the event store cannot express per stream.
//!
//! Uniqueness (SKU, email, username) and supplier references span aggregates,
//! so they are enforced here, around the dispatch: reserve or link first,
//! dispatch, and release or unlink if the dispatch fails.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use thiserror::Error;

use stockroom_core::AggregateId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("{index} '{key}' is already in use")]
    UniqueViolation { index: &'static str, key: String },

    #[error("{parent} is still referenced by {count} record(s)")]
    Referenced { parent: AggregateId, count: usize },

    #[error("referenced record {0} does not exist")]
    MissingParent(AggregateId),

    #[error("constraint index unavailable: {0}")]
    Unavailable(String),
}

fn poisoned(name: &str) -> ConstraintError {
    ConstraintError::Unavailable(format!("{name} lock poisoned"))
}

/// A set of normalized keys, each owned by one aggregate.
#[derive(Debug)]
pub struct UniqueIndex {
    name: &'static str,
    normalize: fn(&str) -> String,
    owners: RwLock<HashMap<String, AggregateId>>,
}

impl UniqueIndex {
    pub fn new(name: &'static str, normalize: fn(&str) -> String) -> Self {
        Self {
            name,
            normalize,
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Trimmed and lowercased keys.
    pub fn case_insensitive(name: &'static str) -> Self {
        Self::new(name, |k| k.trim().to_lowercase())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Claim `key` for `owner`. Idempotent for the current owner.
    pub fn reserve(&self, key: &str, owner: AggregateId) -> Result<(), ConstraintError> {
        let key = (self.normalize)(key);
        let mut owners = self.owners.write().map_err(|_| poisoned(self.name))?;

        match owners.get(&key) {
            Some(existing) if *existing == owner => Ok(()),
            Some(_) => Err(ConstraintError::UniqueViolation {
                index: self.name,
                key,
            }),
            None => {
                owners.insert(key, owner);
                Ok(())
            }
        }
    }

    /// Release `key` if `owner` holds it. Returns whether anything was released.
    pub fn release(&self, key: &str, owner: AggregateId) -> bool {
        let key = (self.normalize)(key);
        match self.owners.write() {
            Ok(mut owners) if owners.get(&key) == Some(&owner) => {
                owners.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn owner_of(&self, key: &str) -> Option<AggregateId> {
        let key = (self.normalize)(key);
        self.owners.read().ok()?.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut owners) = self.owners.write() {
            owners.clear();
        }
    }
}

#[derive(Debug, Default)]
struct References {
    children: HashMap<AggregateId, HashSet<AggregateId>>,
    tombstoned: HashSet<AggregateId>,
}

/// Parent -> live children links (supplier -> products), with restrict-on-delete.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    inner: RwLock<References>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `parent` linkable.
    pub fn add_parent(&self, parent: AggregateId) -> Result<(), ConstraintError> {
        let mut refs = self.inner.write().map_err(|_| poisoned("reference"))?;
        refs.tombstoned.remove(&parent);
        refs.children.entry(parent).or_default();
        Ok(())
    }

    /// Link `child` to a live `parent`.
    pub fn link(&self, parent: AggregateId, child: AggregateId) -> Result<(), ConstraintError> {
        let mut refs = self.inner.write().map_err(|_| poisoned("reference"))?;
        if refs.tombstoned.contains(&parent) {
            return Err(ConstraintError::MissingParent(parent));
        }
        match refs.children.get_mut(&parent) {
            Some(children) => {
                children.insert(child);
                Ok(())
            }
            None => Err(ConstraintError::MissingParent(parent)),
        }
    }

    pub fn unlink(&self, parent: AggregateId, child: AggregateId) {
        if let Ok(mut refs) = self.inner.write() {
            if let Some(children) = refs.children.get_mut(&parent) {
                children.remove(&child);
            }
        }
    }

    pub fn reference_count(&self, parent: AggregateId) -> usize {
        self.inner
            .read()
            .ok()
            .and_then(|r| r.children.get(&parent).map(HashSet::len))
            .unwrap_or(0)
    }

    /// Mark `parent` deleted unless something still links to it.
    ///
    /// Once tombstoned, `link` refuses the parent, so no child can sneak in
    /// between this check and the delete being recorded.
    pub fn tombstone_if_unreferenced(&self, parent: AggregateId) -> Result<(), ConstraintError> {
        let mut refs = self.inner.write().map_err(|_| poisoned("reference"))?;
        let count = refs.children.get(&parent).map(HashSet::len).unwrap_or(0);
        if count > 0 {
            return Err(ConstraintError::Referenced { parent, count });
        }
        refs.tombstoned.insert(parent);
        Ok(())
    }

    /// Undo a tombstone whose delete was not recorded.
    pub fn untombstone(&self, parent: AggregateId) {
        if let Ok(mut refs) = self.inner.write() {
            refs.tombstoned.remove(&parent);
        }
    }

    /// Forget a parent whose delete has been recorded.
    pub fn remove_parent(&self, parent: AggregateId) {
        if let Ok(mut refs) = self.inner.write() {
            refs.children.remove(&parent);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut refs) = self.inner.write() {
            refs.children.clear();
            refs.tombstoned.clear();
        }
    }
}
