//! Relocation of every referenced schema into the moved-schemas registry.
//!
//! The walk visits the reference graph depth-first with an explicit stack, so
//! deeply nested documents never exhaust the thread stack. A reference that
//! closes a cycle marks every reference on the cycle as recursive.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::{CacheState, MovedSchema};
use crate::config::TransformConfig;
use crate::error::ResolveError;
use crate::iteration::{Reach, subschemas_mut};
use crate::keys::{SchemaKey, is_moved_reference, key_for_reference, moved_reference};
use crate::keywords::transform_keywords;
use crate::resolver::Resolver;

/// Rewrite every `$ref` in `root` into moved form and relocate its target.
///
/// Returns the keys of every moved schema transitively reachable from `root`.
pub fn walk(
    root: &mut Value,
    resolver: &Arc<dyn Resolver>,
    config: &TransformConfig,
) -> Result<HashSet<SchemaKey>, ResolveError> {
    let state = config.cache_state();
    let mut walker = Walker {
        config,
        state: &state,
        root_base: resolver.base_uri().to_string(),
        path: Vec::new(),
        reachable: HashSet::new(),
    };
    let mut stack: Vec<Step> = prepare(root, config, None)
        .into_iter()
        .rev()
        .map(|reference| Step::Enter {
            reference,
            resolver: Arc::clone(resolver),
        })
        .collect();
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter {
                reference,
                resolver,
            } => walker.enter(reference, resolver, &mut stack)?,
            Step::Exit => walker.exit(),
        }
    }
    Ok(walker.reachable)
}

/// Key of `reference` found in the document at `scope`.
///
/// Local references of any document other than the entry one are qualified
/// with that document's URI, so `#/definitions/Item` in two documents yields
/// two keys.
pub fn reference_key(reference: &str, scope: Option<&str>) -> (SchemaKey, bool) {
    match scope {
        Some(base) if reference.starts_with('#') && !is_moved_reference(reference) => {
            key_for_reference(&format!("{base}{reference}"))
        }
        _ => key_for_reference(reference),
    }
}

/// Transform keywords of every non-reference node and rewrite references in place.
///
/// Returns the outgoing references as written before the rewrite, in document
/// order. Reference nodes are neither transformed nor descended into.
fn prepare(schema: &mut Value, config: &TransformConfig, scope: Option<&str>) -> Vec<String> {
    let mut references = Vec::new();
    let mut stack = vec![schema];
    while let Some(node) = stack.pop() {
        let Value::Object(map) = node else {
            continue;
        };
        if let Some(Value::String(reference)) = map.get_mut("$ref") {
            let (key, moved) = reference_key(reference, scope);
            let original = if moved {
                reference.clone()
            } else {
                std::mem::replace(reference, moved_reference(&key))
            };
            references.push(original);
            continue;
        }
        transform_keywords(map, config);
        let mut children = subschemas_mut(map, Reach::Document);
        children.reverse();
        stack.extend(children);
    }
    references
}

enum Step {
    Enter {
        reference: String,
        resolver: Arc<dyn Resolver>,
    },
    Exit,
}

/// A moved schema on the current DFS path.
struct Frame {
    moved: String,
    key: SchemaKey,
    reachable: HashSet<SchemaKey>,
    /// Lowest path index closed by a cycle found below this frame.
    low: usize,
}

struct Walker<'a> {
    config: &'a TransformConfig,
    state: &'a CacheState,
    root_base: String,
    path: Vec<Frame>,
    reachable: HashSet<SchemaKey>,
}

impl Walker<'_> {
    /// `None` while resolving inside the entry document.
    fn scope(&self, resolver: &Arc<dyn Resolver>) -> Option<String> {
        let base = resolver.base_uri();
        (base != self.root_base).then(|| base.to_string())
    }

    fn accumulator(&mut self) -> &mut HashSet<SchemaKey> {
        match self.path.last_mut() {
            Some(frame) => &mut frame.reachable,
            None => &mut self.reachable,
        }
    }

    fn enter(
        &mut self,
        reference: String,
        resolver: Arc<dyn Resolver>,
        stack: &mut Vec<Step>,
    ) -> Result<(), ResolveError> {
        let (key, already_moved) = reference_key(&reference, self.scope(&resolver).as_deref());
        let moved = moved_reference(&key);
        self.accumulator().insert(key.clone());

        if let Some(position) = self.path.iter().position(|frame| frame.moved == moved) {
            trace!("Cycle closed by {}", moved);
            self.state
                .mark_recursive(self.path[position..].iter().map(|frame| frame.moved.clone()));
            if let Some(parent) = self.path.last_mut() {
                parent.low = parent.low.min(position);
            }
            return Ok(());
        }

        // Reachability is only memoized for schemas whose exploration was not
        // cut short by a cycle through an ancestor, so a known set that avoids
        // the current path cannot hide a new cycle.
        if let Some(known) = self.state.reachable(&key) {
            let disjoint = !self
                .path
                .iter()
                .any(|frame| known.contains(&frame.key));
            if disjoint {
                self.accumulator().extend(known.iter().cloned());
                return Ok(());
            }
        }

        let entry = match self.state.moved_schema(&key) {
            Some(entry) => entry,
            None if already_moved => return Err(ResolveError::unresolvable(reference)),
            None => self.relocate(key.clone(), &reference, &resolver)?,
        };

        stack.push(Step::Exit);
        for child in entry.references.iter().rev() {
            stack.push(Step::Enter {
                reference: child.clone(),
                resolver: Arc::clone(&entry.resolver),
            });
        }
        self.path.push(Frame {
            moved,
            key: key.clone(),
            reachable: HashSet::from([key]),
            low: usize::MAX,
        });
        Ok(())
    }

    fn exit(&mut self) {
        let Some(frame) = self.path.pop() else {
            return;
        };
        let depth = self.path.len();
        if frame.low >= depth {
            self.state
                .remember_reachable(frame.key.clone(), frame.reachable.clone());
        }
        match self.path.last_mut() {
            Some(parent) => {
                parent.low = parent.low.min(frame.low);
                parent.reachable.extend(frame.reachable);
            }
            None => self.reachable.extend(frame.reachable),
        }
    }

    /// Resolve `reference`, prepare a private copy of its target and store it.
    fn relocate(
        &self,
        key: SchemaKey,
        reference: &str,
        resolver: &Arc<dyn Resolver>,
    ) -> Result<Arc<MovedSchema>, ResolveError> {
        // Pre-loaded components belong to the entry document only.
        let component = if self.scope(resolver).is_none() {
            self.config.components.get(reference)
        } else {
            None
        };
        let (mut contents, resolver) = match component {
            Some(contents) => (contents.clone(), Arc::clone(resolver)),
            None => {
                let resolved = resolver.lookup(reference)?;
                (resolved.contents, resolved.resolver)
            }
        };
        let scope = self.scope(&resolver);
        let references = prepare(&mut contents, self.config, scope.as_deref());
        debug!("Moved {} to {}", reference, moved_reference(&key));
        Ok(self.state.insert_moved(
            key,
            MovedSchema {
                contents,
                references,
                resolver,
            },
        ))
    }
}
