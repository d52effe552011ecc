//! Data access collaborator used by reference loading

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use bson::{Bson, Document};

use crate::errors::{poisoned, MappingError, MappingResult};
use crate::model::ID_FIELD;

/// Fetches stored documents by id.
///
/// Calls are synchronous; a non-blocking implementation is the caller's
/// concern.
pub trait DataAccess: Send + Sync {
    fn find_by_id(&self, collection: &str, id: &Bson) -> MappingResult<Option<Document>>;
}

/// In-memory data access, keyed by collection name
#[derive(Debug, Default)]
pub struct MemoryDataAccess {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    fetches: AtomicUsize,
}

impl MemoryDataAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document, replacing any document with the same `_id`
    pub fn insert(&self, collection: &str, document: Document) -> MappingResult<()> {
        let id = document
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| MappingError::DataAccess(format!("document without {}", ID_FIELD)))?;
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let documents = collections.entry(collection.to_string()).or_default();
        documents.retain(|d| d.get(ID_FIELD) != Some(&id));
        documents.push(document);
        Ok(())
    }

    /// Remove the document with the given id; returns whether it existed
    pub fn remove(&self, collection: &str, id: &Bson) -> MappingResult<bool> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = documents.len();
        documents.retain(|d| d.get(ID_FIELD) != Some(id));
        Ok(documents.len() != before)
    }

    /// Number of documents stored in a collection
    pub fn count(&self, collection: &str) -> MappingResult<usize> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(collection).map_or(0, |d| d.len()))
    }

    /// Number of `find_by_id` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DataAccess for MemoryDataAccess {
    fn find_by_id(&self, collection: &str, id: &Bson) -> MappingResult<Option<Document>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|d| d.get(ID_FIELD) == Some(id)))
            .cloned())
    }
}
