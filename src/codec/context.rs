//! Per-call encode/decode state

use std::collections::HashSet;

use bson::Bson;

use super::data_access::DataAccess;
use super::CodecRegistry;
use crate::options::LoadingPolicy;

/// State of one encode call.
///
/// Tracks the entities currently being written, by identity, so a true
/// embed-time cycle is rejected instead of recursing forever.
pub struct EncodeContext<'a> {
    codecs: &'a CodecRegistry,
    in_flight: HashSet<usize>,
}

impl<'a> EncodeContext<'a> {
    pub fn new(codecs: &'a CodecRegistry) -> Self {
        Self {
            codecs,
            in_flight: HashSet::new(),
        }
    }

    pub fn codecs(&self) -> &'a CodecRegistry {
        self.codecs
    }

    /// Returns false if the entity is already being encoded
    pub(crate) fn enter(&mut self, address: usize) -> bool {
        self.in_flight.insert(address)
    }

    pub(crate) fn leave(&mut self, address: usize) {
        self.in_flight.remove(&address);
    }

    /// Number of entities currently being encoded
    pub fn depth(&self) -> usize {
        self.in_flight.len()
    }
}

/// State of one decode call
pub struct DecodeContext<'a> {
    codecs: &'a CodecRegistry,
    data_access: Option<&'a dyn DataAccess>,
    loading: LoadingPolicy,
    /// (collection, id) pairs whose eager fetch is in progress
    fetching: HashSet<(String, String)>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(codecs: &'a CodecRegistry) -> Self {
        Self {
            codecs,
            data_access: None,
            loading: codecs.options().reference_loading,
            fetching: HashSet::new(),
        }
    }

    pub fn with_data_access(mut self, data_access: Option<&'a dyn DataAccess>) -> Self {
        self.data_access = data_access;
        self
    }

    /// Override the configured loading policy for this call
    pub fn with_loading(mut self, loading: LoadingPolicy) -> Self {
        self.loading = loading;
        self
    }

    pub fn codecs(&self) -> &'a CodecRegistry {
        self.codecs
    }

    pub fn data_access(&self) -> Option<&'a dyn DataAccess> {
        self.data_access
    }

    /// Loading policy for references without a per-property override
    pub fn loading(&self) -> LoadingPolicy {
        self.loading
    }

    /// Returns false if the same target is already being fetched
    pub(crate) fn begin_fetch(&mut self, collection: &str, id: &Bson) -> bool {
        self.fetching.insert((collection.to_string(), id.to_string()))
    }

    pub(crate) fn end_fetch(&mut self, collection: &str, id: &Bson) {
        self.fetching.remove(&(collection.to_string(), id.to_string()));
    }
}
