//! Typed relations over an in-memory concurrent map

use dashmap::DashMap;
use std::sync::Arc;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists in {relation}: {id}")]
    Duplicate {
        relation: &'static str,
        id: String,
    },

    #[error("record not found in {relation}: {id}")]
    NotFound {
        relation: &'static str,
        id: String,
    },
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A named, typed relation mapping record ID to record.
///
/// Cloning a `Relation` clones the handle, not the data; all clones observe
/// the same records.
pub struct Relation<T> {
    name: &'static str,
    records: Arc<DashMap<String, T>>,
}

impl<T> Clone for Relation<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            records: self.records.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Relation<T> {
    /// Create an empty relation.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: Arc::new(DashMap::new()),
        }
    }

    /// Relation name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert a record that must not already exist.
    pub fn insert_new(&self, id: impl Into<String>, record: T) -> StoreResult<()> {
        let id = id.into();
        match self.records.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate {
                relation: self.name,
                id,
            }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    /// Insert or overwrite a record.
    pub fn put(&self, id: impl Into<String>, record: T) {
        self.records.insert(id.into(), record);
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<T> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Whether a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Mutate a record under the entry lock.
    ///
    /// The closure observes and modifies the record atomically with respect
    /// to all other operations on the same key. Returns the closure's value.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut T) -> R) -> StoreResult<R> {
        match self.records.get_mut(id) {
            Some(mut record) => Ok(f(&mut record)),
            None => Err(StoreError::NotFound {
                relation: self.name,
                id: id.to_string(),
            }),
        }
    }

    /// Remove a record, returning it if present.
    pub fn remove(&self, id: &str) -> Option<T> {
        self.records.remove(id).map(|(_, record)| record)
    }

    /// Snapshot of all records.
    pub fn list(&self) -> Vec<T> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Snapshot of all (id, record) pairs.
    pub fn entries(&self) -> Vec<(String, T)> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Records matching a predicate.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.records
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the relation holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
