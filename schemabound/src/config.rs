use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::cache::{CacheState, ResolutionCache};

pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_MAX_INLININGS: usize = 100;

/// Bounds applied when recursive references are inlined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InlineLimits {
    /// How many times one schema may be substituted along a single branch.
    pub max_depth: usize,
    /// How many substitutions one moved schema may receive in total.
    pub max_inlinings: usize,
}

impl Default for InlineLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_inlinings: DEFAULT_MAX_INLININGS,
        }
    }
}

/// Pre-loaded schemas of the current document, keyed by pointer prefix.
///
/// `#/components/schemas` -> `{"User": {...}, ...}`. A lookup here is
/// equivalent to a successful resolver lookup in the same document.
#[derive(Clone, Debug, Default)]
pub struct Components {
    tables: HashMap<String, Value>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, prefix: impl Into<String>, table: Value) -> Self {
        self.tables.insert(prefix.into(), table);
        self
    }

    pub fn get(&self, reference: &str) -> Option<&Value> {
        let reference = percent_decode_str(reference).decode_utf8().ok()?;
        self.tables.iter().find_map(|(prefix, table)| {
            let rest = reference.strip_prefix(prefix.as_str())?;
            if !rest.starts_with('/') {
                return None;
            }
            table.pointer(rest)
        })
    }
}

/// Settings that change what a transform stores in the cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransformFlavor {
    pub nullable_key: String,
    pub remove_write_only: bool,
    pub remove_read_only: bool,
    pub limits: InlineLimits,
}

/// Per-call transformation settings.
#[derive(Clone, Debug)]
pub struct TransformConfig {
    /// `nullable` in Open API 3, `x-nullable` in Open API 2
    pub nullable_key: String,
    /// Used for responses
    pub remove_write_only: bool,
    /// Used for requests
    pub remove_read_only: bool,
    pub components: Arc<Components>,
    pub limits: InlineLimits,
    pub cache: Arc<ResolutionCache>,
}

impl TransformConfig {
    pub fn new(cache: Arc<ResolutionCache>) -> Self {
        Self {
            nullable_key: "nullable".to_string(),
            remove_write_only: false,
            remove_read_only: false,
            components: Arc::new(Components::new()),
            limits: InlineLimits::default(),
            cache,
        }
    }

    pub fn for_openapi2(mut self) -> Self {
        self.nullable_key = "x-nullable".to_string();
        self
    }

    pub fn for_openapi3(mut self) -> Self {
        self.nullable_key = "nullable".to_string();
        self
    }

    /// Read-only properties must not be generated.
    pub fn for_request(mut self) -> Self {
        self.remove_read_only = true;
        self.remove_write_only = false;
        self
    }

    /// Write-only properties must not be accepted.
    pub fn for_response(mut self) -> Self {
        self.remove_write_only = true;
        self.remove_read_only = false;
        self
    }

    pub fn with_components(mut self, components: Arc<Components>) -> Self {
        self.components = components;
        self
    }

    pub fn with_limits(mut self, limits: InlineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn flavor(&self) -> TransformFlavor {
        TransformFlavor {
            nullable_key: self.nullable_key.clone(),
            remove_write_only: self.remove_write_only,
            remove_read_only: self.remove_read_only,
            limits: self.limits,
        }
    }

    /// Cache partition used by transforms with these settings.
    pub fn cache_state(&self) -> Arc<CacheState> {
        self.cache.state(&self.flavor())
    }
}
