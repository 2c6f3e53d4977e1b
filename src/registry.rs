//! Named strategy registry.
//!
//! User-supplied key extractors and partition selectors are registered by name
//! once, at startup, and resolved by the [`Binder`](crate::binder::Binder) when a
//! binding is created. Nothing on the message path touches the registry.
//!
//! Resolution rules, per capability:
//!
//! - with a name: that strategy, or [`RegistryError::NotFound`]
//! - without a name: the only registered strategy, [`RegistryError::NoCandidate`]
//!   when none is registered, [`RegistryError::Ambiguous`] when several are

use crate::error::{Capability, RegistryError};
use crate::partitioning::PartitionKeyExtractor;
use crate::selector::PartitionSelector;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

/// Registry of named strategies for bindings carrying payloads of type `T`.
pub struct StrategyRegistry<T> {
  key_extractors: BTreeMap<String, Arc<dyn PartitionKeyExtractor<T>>>,
  selectors: BTreeMap<String, Arc<dyn PartitionSelector>>,
}

impl<T> Default for StrategyRegistry<T> {
  fn default() -> Self {
    Self {
      key_extractors: BTreeMap::new(),
      selectors: BTreeMap::new(),
    }
  }
}

impl<T> fmt::Debug for StrategyRegistry<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StrategyRegistry")
      .field("key_extractors", &self.key_extractors.keys().collect::<Vec<_>>())
      .field("selectors", &self.selectors.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl<T> StrategyRegistry<T> {
  /// Creates an empty registry.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a key extractor under `name`.
  ///
  /// # Errors
  ///
  /// [`RegistryError::Duplicate`] if the name is taken.
  pub fn register_key_extractor(
    &mut self,
    name: impl Into<String>,
    extractor: Arc<dyn PartitionKeyExtractor<T>>,
  ) -> Result<(), RegistryError> {
    insert(&mut self.key_extractors, Capability::KeyExtractor, name.into(), extractor)
  }

  /// Registers a partition selector under `name`.
  ///
  /// # Errors
  ///
  /// [`RegistryError::Duplicate`] if the name is taken.
  pub fn register_partition_selector(
    &mut self,
    name: impl Into<String>,
    selector: Arc<dyn PartitionSelector>,
  ) -> Result<(), RegistryError> {
    insert(&mut self.selectors, Capability::PartitionSelector, name.into(), selector)
  }

  /// Resolves a key extractor, by name or as the only one registered.
  pub fn key_extractor(
    &self,
    name: Option<&str>,
  ) -> Result<Arc<dyn PartitionKeyExtractor<T>>, RegistryError> {
    lookup(&self.key_extractors, Capability::KeyExtractor, name)
  }

  /// Resolves a partition selector, by name or as the only one registered.
  pub fn partition_selector(
    &self,
    name: Option<&str>,
  ) -> Result<Arc<dyn PartitionSelector>, RegistryError> {
    lookup(&self.selectors, Capability::PartitionSelector, name)
  }
}

fn insert<S: ?Sized>(
  map: &mut BTreeMap<String, Arc<S>>,
  capability: Capability,
  name: String,
  strategy: Arc<S>,
) -> Result<(), RegistryError> {
  match map.entry(name) {
    Entry::Occupied(entry) => Err(RegistryError::Duplicate {
      capability,
      name: entry.key().clone(),
    }),
    Entry::Vacant(entry) => {
      entry.insert(strategy);
      Ok(())
    }
  }
}

fn lookup<S: ?Sized>(
  map: &BTreeMap<String, Arc<S>>,
  capability: Capability,
  name: Option<&str>,
) -> Result<Arc<S>, RegistryError> {
  if let Some(name) = name {
    return map.get(name).cloned().ok_or_else(|| RegistryError::NotFound {
      capability,
      name: name.to_string(),
    });
  }
  let mut candidates = map.values();
  match (candidates.next(), candidates.next()) {
    (Some(only), None) => Ok(only.clone()),
    (None, _) => Err(RegistryError::NoCandidate { capability }),
    (Some(_), Some(_)) => Err(RegistryError::Ambiguous {
      capability,
      candidates: map.keys().cloned().collect(),
    }),
  }
}
