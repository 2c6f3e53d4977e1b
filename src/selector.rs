//! Partition selection strategies.
//!
//! A [`PartitionSelector`] maps a [`PartitionKey`] to a partition index in
//! `[0, partition_count)`:
//!
//! - [`DefaultHashSelector`]: `abs(hash_code) % partition_count`
//! - [`ExpressionSelector`]: evaluates an expression against the raw key
//! - closures via [`partition_selector`]
//!
//! Selectors must be pure. The [`OutputPartitioner`](crate::output::OutputPartitioner)
//! rejects any index outside the range instead of wrapping it.

use crate::error::PartitionSelectionError;
use crate::expression::{EvaluationContext, Expression, json_type_name};
use crate::partitioning::PartitionKey;
use serde_json::Value;
use std::sync::Arc;

/// Maps a partition key to a partition index.
pub trait PartitionSelector: Send + Sync {
  /// Returns the partition for `key`, expected in `[0, partition_count)`.
  fn select_partition(
    &self,
    key: &PartitionKey,
    partition_count: u32,
  ) -> Result<u32, PartitionSelectionError>;
}

/// Hash-based selector used when no other selector is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHashSelector;

impl DefaultHashSelector {
  /// Creates the selector.
  #[must_use]
  pub fn new() -> Self {
    Self
  }

  /// `abs(hash) % partition_count`, with `i32::MIN` mapped to partition 0
  /// since its absolute value does not fit in an `i32`.
  ///
  /// Returns `None` when `partition_count` is zero.
  #[must_use]
  pub fn partition_for_hash(hash: i32, partition_count: u32) -> Option<u32> {
    if partition_count == 0 {
      return None;
    }
    let magnitude = hash.checked_abs().unwrap_or(0).unsigned_abs();
    Some(magnitude % partition_count)
  }
}

impl PartitionSelector for DefaultHashSelector {
  fn select_partition(
    &self,
    key: &PartitionKey,
    partition_count: u32,
  ) -> Result<u32, PartitionSelectionError> {
    Self::partition_for_hash(key.hash_code(), partition_count).ok_or(
      PartitionSelectionError::OutOfRange {
        index: 0,
        partition_count,
      },
    )
  }
}

/// Selects the partition by evaluating an expression whose root `key` is the
/// raw key returned by the key extractor.
///
/// The expression must produce an integer in `[0, partition_count)`.
#[derive(Clone, Debug)]
pub struct ExpressionSelector {
  expression: Arc<dyn Expression>,
}

impl ExpressionSelector {
  /// Creates a selector over an already compiled expression.
  #[must_use]
  pub fn new(expression: Arc<dyn Expression>) -> Self {
    Self { expression }
  }

  /// The expression source.
  #[must_use]
  pub fn source(&self) -> &str {
    self.expression.source()
  }
}

impl PartitionSelector for ExpressionSelector {
  fn select_partition(
    &self,
    key: &PartitionKey,
    partition_count: u32,
  ) -> Result<u32, PartitionSelectionError> {
    let key_value = key.to_json();
    let value = self
      .expression
      .evaluate(&EvaluationContext::key(&key_value))
      .map_err(|source| PartitionSelectionError::Expression {
        expression: self.source().to_string(),
        source,
      })?;
    let index = match &value {
      Value::Number(n) => n.as_i64(),
      _ => None,
    }
    .ok_or_else(|| PartitionSelectionError::IncompatibleType {
      expression: self.source().to_string(),
      found: json_type_name(&value),
    })?;
    u32::try_from(index)
      .ok()
      .filter(|i| *i < partition_count)
      .ok_or(PartitionSelectionError::OutOfRange {
        index,
        partition_count,
      })
  }
}

/// Wrapper that implements `PartitionSelector` for closures.
struct FnSelector<F> {
  function: F,
}

impl<F> PartitionSelector for FnSelector<F>
where
  F: Fn(&PartitionKey, u32) -> Result<u32, PartitionSelectionError> + Send + Sync,
{
  fn select_partition(
    &self,
    key: &PartitionKey,
    partition_count: u32,
  ) -> Result<u32, PartitionSelectionError> {
    (self.function)(key, partition_count)
  }
}

/// Creates a selector from a closure.
pub fn partition_selector<F>(function: F) -> Arc<dyn PartitionSelector>
where
  F: Fn(&PartitionKey, u32) -> Result<u32, PartitionSelectionError> + Send + Sync + 'static,
{
  Arc::new(FnSelector { function })
}
