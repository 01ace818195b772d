//! Memoized resolution state shared by every transform of one document.
//!
//! Every insert is idempotent: the value stored under a key is a pure function
//! of the document and the key, so racing workers may both compute it and the
//! last write wins. Locks are only held for the duration of a single map
//! operation, never across a resolver call.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::config::TransformFlavor;
use crate::keys::{SchemaKey, key_for_reference};
use crate::resolver::Resolver;

/// Resolution cache for one logical document.
///
/// Partitioned by [`TransformFlavor`] because moved schemas are stored after
/// keyword transformation.
#[derive(Default)]
pub struct ResolutionCache {
    partitions: RwLock<HashMap<TransformFlavor, Arc<CacheState>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, flavor: &TransformFlavor) -> Arc<CacheState> {
        if let Some(state) = self.partitions.read().unwrap().get(flavor) {
            return Arc::clone(state);
        }
        let mut partitions = self.partitions.write().unwrap();
        Arc::clone(partitions.entry(flavor.clone()).or_default())
    }
}

impl fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let partitions = self.partitions.read().unwrap().len();
        f.debug_struct("ResolutionCache")
            .field("partitions", &partitions)
            .finish_non_exhaustive()
    }
}

/// A referenced schema relocated into the moved-schemas registry.
pub struct MovedSchema {
    /// Contents with keywords transformed and every `$ref` in moved form.
    pub contents: Value,
    /// Outgoing references of `contents`, as written in the source document.
    pub references: Vec<String>,
    /// Resolver for `references`.
    pub resolver: Arc<dyn Resolver>,
}

#[derive(Default)]
pub struct CacheState {
    moved: RwLock<HashMap<SchemaKey, Arc<MovedSchema>>>,
    recursive: RwLock<HashSet<String>>,
    reachable: RwLock<HashMap<SchemaKey, Arc<HashSet<SchemaKey>>>>,
    results: RwLock<HashMap<String, Value>>,
}

impl CacheState {
    pub fn moved_schema(&self, key: &str) -> Option<Arc<MovedSchema>> {
        self.moved.read().unwrap().get(key).cloned()
    }

    /// Store `schema` unless another caller stored it first; return the stored entry.
    pub fn insert_moved(&self, key: SchemaKey, schema: MovedSchema) -> Arc<MovedSchema> {
        let mut moved = self.moved.write().unwrap();
        Arc::clone(moved.entry(key).or_insert_with(|| Arc::new(schema)))
    }

    pub fn moved_len(&self) -> usize {
        self.moved.read().unwrap().len()
    }

    /// Moved schemas restricted to `keys`, ordered by key.
    pub fn moved_subset(&self, keys: &HashSet<SchemaKey>) -> Map<String, Value> {
        let moved = self.moved.read().unwrap();
        let ordered: BTreeSet<&SchemaKey> = keys.iter().collect();
        ordered
            .into_iter()
            .filter_map(|key| {
                moved
                    .get(key)
                    .map(|schema| (key.clone(), schema.contents.clone()))
            })
            .collect()
    }

    pub fn mark_recursive<I>(&self, references: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.recursive.write().unwrap().extend(references);
    }

    pub fn is_recursive(&self, reference: &str) -> bool {
        self.recursive.read().unwrap().contains(reference)
    }

    /// Recursive references whose target is one of `keys`.
    pub fn recursive_among(&self, keys: &HashSet<SchemaKey>) -> HashSet<String> {
        self.recursive
            .read()
            .unwrap()
            .iter()
            .filter(|reference| keys.contains(&key_for_reference(reference).0))
            .cloned()
            .collect()
    }

    pub fn reachable(&self, key: &str) -> Option<Arc<HashSet<SchemaKey>>> {
        self.reachable.read().unwrap().get(key).cloned()
    }

    pub fn remember_reachable(&self, key: SchemaKey, keys: HashSet<SchemaKey>) {
        self.reachable.write().unwrap().insert(key, Arc::new(keys));
    }

    pub fn result(&self, reference: &str) -> Option<Value> {
        self.results.read().unwrap().get(reference).cloned()
    }

    pub fn remember_result(&self, reference: String, schema: Value) {
        self.results.write().unwrap().insert(reference, schema);
    }
}
