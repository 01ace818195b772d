//! Bounded unrolling of recursive moved schemas.
//!
//! Each recursive schema is expanded in place by substituting the original
//! contents for its recursive references. Once a schema appears `max_depth`
//! times along a branch, or the substitution budget is spent, the remaining
//! recursive references are pruned away.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::InlineLimits;
use crate::error::InfiniteRecursionError;
use crate::iteration::{Reach, reference_of, subschemas, subschemas_mut};
use crate::keys::{SchemaKey, key_for_reference, moved_reference};
use crate::limit::prune;

/// Expand every recursive schema in `moved` into a finite one.
///
/// `recursive` holds moved-form references. Schemas that are not recursive are
/// left untouched.
pub fn unrecurse(
    moved: &mut Map<String, Value>,
    recursive: &HashSet<String>,
    limits: InlineLimits,
) -> Result<(), InfiniteRecursionError> {
    let originals: HashMap<SchemaKey, Value> = moved
        .iter()
        .filter(|(key, _)| recursive.contains(&moved_reference(key)))
        .map(|(key, schema)| (key.clone(), schema.clone()))
        .collect();
    for (key, schema) in moved.iter_mut() {
        if !originals.contains_key(key) {
            continue;
        }
        let mut inliner = Inliner {
            originals: &originals,
            recursive,
            limits,
            path: vec![key.clone()],
            inlined: 0,
            reserved: 0,
        };
        inliner.visit(schema, false)?;
        debug!("Inlined {} recursive references into {}", inliner.inlined, key);
    }
    Ok(())
}

struct Inliner<'a> {
    originals: &'a HashMap<SchemaKey, Value>,
    recursive: &'a HashSet<String>,
    limits: InlineLimits,
    /// Keys substituted along the current branch, entry schema first.
    path: Vec<SchemaKey>,
    inlined: usize,
    /// Substitutions promised to direct children that are not visited yet.
    reserved: usize,
}

impl Inliner<'_> {
    /// `reserved` is set when the budget for substituting `node` was set aside
    /// by its parent.
    fn visit(&mut self, node: &mut Value, reserved: bool) -> Result<(), InfiniteRecursionError> {
        let reference = reference_of(node)
            .filter(|reference| self.recursive.contains(*reference))
            .map(str::to_string);
        if let Some(reference) = reference {
            return self.substitute(node, reference, reserved);
        }

        let forbidden = self.forbidden();
        if !forbidden.is_empty() {
            narrow(node, &forbidden)?;
        }
        let mut pending = self.recursive_children(node);
        if pending > self.budget_left() {
            narrow(node, self.recursive)?;
            pending = 0;
        }
        self.reserved += pending;

        if let Value::Object(map) = node {
            for child in subschemas_mut(map, Reach::Instance) {
                self.visit(child, true)?;
            }
        }
        Ok(())
    }

    fn substitute(
        &mut self,
        node: &mut Value,
        reference: String,
        reserved: bool,
    ) -> Result<(), InfiniteRecursionError> {
        let (key, _) = key_for_reference(&reference);
        if reserved {
            self.reserved = self.reserved.saturating_sub(1);
        } else if self.budget_left() == 0 {
            return Err(chain(reference));
        }
        // Depth-exhausted children are pruned before they are visited, so this
        // only triggers when references point straight at references.
        if self.count(&key) >= self.limits.max_depth {
            return Err(chain(reference));
        }
        let Some(original) = self.originals.get(&key) else {
            return Ok(());
        };
        *node = original.clone();
        self.inlined += 1;
        self.path.push(key);
        let result = self.visit(node, false);
        self.path.pop();
        result
    }

    fn count(&self, key: &str) -> usize {
        self.path.iter().filter(|item| item.as_str() == key).count()
    }

    fn budget_left(&self) -> usize {
        self.limits
            .max_inlinings
            .saturating_sub(self.inlined + self.reserved)
    }

    /// Recursive references that may not be expanded any further on this branch.
    fn forbidden(&self) -> HashSet<String> {
        self.recursive
            .iter()
            .filter(|reference| self.exhausted(key_for_reference(reference).0))
            .cloned()
            .collect()
    }

    /// Whether substituting `key` can only end at a schema out of depth.
    ///
    /// A schema that is nothing but a recursive reference is followed to its
    /// target, so an alias of an exhausted schema is exhausted too.
    fn exhausted(&self, mut key: SchemaKey) -> bool {
        let mut seen = HashSet::new();
        loop {
            if self.count(&key) >= self.limits.max_depth {
                return true;
            }
            if !seen.insert(key.clone()) {
                return false;
            }
            let next = self
                .originals
                .get(&key)
                .and_then(reference_of)
                .filter(|reference| self.recursive.contains(*reference));
            match next {
                Some(reference) => key = key_for_reference(reference).0,
                None => return false,
            }
        }
    }

    fn recursive_children(&self, node: &Value) -> usize {
        let Value::Object(map) = node else {
            return 0;
        };
        subschemas(map, Reach::Instance)
            .into_iter()
            .filter(|child| reference_of(child).is_some_and(|r| self.recursive.contains(r)))
            .count()
    }
}

fn narrow(node: &mut Value, forbidden: &HashSet<String>) -> Result<(), InfiniteRecursionError> {
    let pruned = match prune(node, forbidden)? {
        Cow::Owned(pruned) => Some(pruned),
        Cow::Borrowed(_) => None,
    };
    if let Some(pruned) = pruned {
        *node = pruned;
    }
    Ok(())
}

fn chain(reference: String) -> InfiniteRecursionError {
    InfiniteRecursionError::new("Schema is an infinite chain of references").with_reference(reference)
}
