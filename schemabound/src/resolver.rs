//! Reference resolution against a registry of loaded documents.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::ResolveError;

/// Result of a successful lookup.
pub struct Resolved {
    pub contents: Value,
    /// Resolver for references found inside `contents`.
    pub resolver: Arc<dyn Resolver>,
}

/// Capability to resolve a reference relative to some base document.
///
/// Implementations must be deterministic and idempotent per reference.
pub trait Resolver: Send + Sync {
    fn lookup(&self, reference: &str) -> Result<Resolved, ResolveError>;

    /// URI of the document that local references are resolved in.
    fn base_uri(&self) -> &str;

    /// Documents entered before reaching this resolver, most recent first.
    fn dynamic_scope(&self) -> Vec<(String, Registry)>;
}

/// Fetches a document that is not registered yet.
pub trait Retrieve: Send + Sync {
    fn retrieve(&self, uri: &str) -> Result<Value, ResolveError>;
}

#[derive(Default)]
struct RegistryInner {
    documents: RwLock<HashMap<String, Arc<Value>>>,
    retriever: Option<Arc<dyn Retrieve>>,
}

/// Shared store of documents keyed by URI.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retriever(retriever: Arc<dyn Retrieve>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                documents: RwLock::new(HashMap::new()),
                retriever: Some(retriever),
            }),
        }
    }

    pub fn with_document(self, uri: impl Into<String>, document: Value) -> Self {
        self.insert(uri, document);
        self
    }

    pub fn insert(&self, uri: impl Into<String>, document: Value) {
        self.inner
            .documents
            .write()
            .unwrap()
            .insert(uri.into(), Arc::new(document));
    }

    pub fn get(&self, uri: &str) -> Option<Arc<Value>> {
        self.inner.documents.read().unwrap().get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.documents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered document, retrieving and registering it first if needed.
    pub fn get_or_retrieve(&self, uri: &str) -> Result<Arc<Value>, ResolveError> {
        if let Some(document) = self.get(uri) {
            return Ok(document);
        }
        let Some(retriever) = self.inner.retriever.as_ref() else {
            return Err(ResolveError::unretrievable(uri, "no retriever configured"));
        };
        debug!("Retrieving {}", uri);
        let document = retriever.retrieve(uri)?;
        let mut documents = self.inner.documents.write().unwrap();
        Ok(Arc::clone(
            documents
                .entry(uri.to_string())
                .or_insert_with(|| Arc::new(document)),
        ))
    }

    /// Resolver rooted at the document registered under `base_uri`.
    pub fn resolver(&self, base_uri: impl Into<String>) -> DocumentResolver {
        DocumentResolver {
            registry: self.clone(),
            base_uri: base_uri.into(),
            previous: Vec::new(),
        }
    }
}

/// Default [`Resolver`] backed by a [`Registry`].
#[derive(Clone)]
pub struct DocumentResolver {
    registry: Registry,
    base_uri: String,
    previous: Vec<String>,
}

impl Resolver for DocumentResolver {
    fn lookup(&self, reference: &str) -> Result<Resolved, ResolveError> {
        let (uri, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let target = if uri.is_empty() {
            self.base_uri.clone()
        } else {
            join_uri(&self.base_uri, uri)
        };
        let document = self.registry.get_or_retrieve(&target)?;
        let fragment = percent_decode_str(fragment)
            .decode_utf8()
            .map_err(|_| ResolveError::unresolvable(reference))?;
        let contents = resolve_pointer(&document, &fragment)
            .ok_or_else(|| ResolveError::unresolvable(reference))?
            .clone();

        let previous = if target == self.base_uri {
            self.previous.clone()
        } else {
            let mut previous = Vec::with_capacity(self.previous.len() + 1);
            previous.push(self.base_uri.clone());
            previous.extend(self.previous.iter().cloned());
            previous
        };
        Ok(Resolved {
            contents,
            resolver: Arc::new(DocumentResolver {
                registry: self.registry.clone(),
                base_uri: target,
                previous,
            }),
        })
    }

    fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn dynamic_scope(&self) -> Vec<(String, Registry)> {
        self.previous
            .iter()
            .map(|uri| (uri.clone(), self.registry.clone()))
            .collect()
    }
}

/// Resolve a JSON Pointer (RFC 6901) inside `document`.
///
/// `None` for a pointer that is not empty and does not start with `/`, or that
/// walks past the end of an array or into a scalar.
pub fn resolve_pointer<'a>(document: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        return Some(document);
    }
    if !pointer.starts_with('/') {
        return None;
    }
    document.pointer(pointer)
}

/// Resolve `uri` against `base`; plain filesystem paths are joined lexically.
pub fn join_uri(base: &str, uri: &str) -> String {
    if Url::parse(uri).is_ok() {
        return uri.to_string();
    }
    if let Ok(base) = Url::parse(base) {
        if let Ok(joined) = base.join(uri) {
            return joined.to_string();
        }
    }
    let directory = Path::new(base).parent().unwrap_or(Path::new(""));
    normalize_path(&directory.join(uri))
        .to_string_lossy()
        .into_owned()
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
