//! Ordering strategies and the per-record-type ordering registry.
//!
//! An ordering is a comparison over two records. It must be a strict weak
//! ordering; an inconsistent comparison produces unordered output but never
//! loses records.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{PipelineError, PipelineResult};

/// A comparison between two records of type `T`.
pub trait RecordOrdering<T>: Send + Sync {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> RecordOrdering<T> for F
where
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// An ordering shared between the registry and the stages using it.
pub type SharedOrdering<T> = Arc<dyn RecordOrdering<T>>;

/// Named orderings for one record type, with an optional default.
pub struct OrderingRegistry<T> {
    orderings: HashMap<String, SharedOrdering<T>>,
    default_name: Option<String>,
}

impl<T: 'static> OrderingRegistry<T> {
    pub fn new() -> Self {
        Self {
            orderings: HashMap::new(),
            default_name: None,
        }
    }

    /// Registers an ordering under `name`.
    ///
    /// When `is_default` is set the ordering replaces any previous default.
    ///
    /// # Errors
    /// Returns [`PipelineError::DuplicateOrdering`] if `name` is taken.
    pub fn register<O>(&mut self, name: impl Into<String>, ordering: O, is_default: bool) -> PipelineResult<()>
    where
        O: RecordOrdering<T> + 'static,
    {
        self.register_shared(name, Arc::new(ordering), is_default)
    }

    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        ordering: SharedOrdering<T>,
        is_default: bool,
    ) -> PipelineResult<()> {
        let name = name.into();
        if self.orderings.contains_key(&name) {
            return Err(PipelineError::DuplicateOrdering { name });
        }

        if is_default {
            if let Some(previous) = &self.default_name {
                debug!("Default ordering changed from {} to {}", previous, name);
            }
            self.default_name = Some(name.clone());
        }

        self.orderings.insert(name, ordering);
        Ok(())
    }

    /// Returns the named ordering, or the default one when `name` is `None`.
    ///
    /// # Errors
    /// - [`PipelineError::UnknownOrdering`] if `name` is not registered
    /// - [`PipelineError::NoDefaultOrdering`] if no name was given and no
    ///   default exists
    pub fn resolve(&self, name: Option<&str>) -> PipelineResult<SharedOrdering<T>> {
        let name = match name {
            Some(name) => name,
            None => self
                .default_name
                .as_deref()
                .ok_or(PipelineError::NoDefaultOrdering)?,
        };

        self.orderings
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownOrdering {
                name: name.to_string(),
            })
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.orderings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<T: 'static> Default for OrderingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
