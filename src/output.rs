//! Outbound partitioning.
//!
//! An [`OutputPartitioner`] runs the configured key extractor, then the
//! configured selector, then attaches the resulting index to the message as
//! routing metadata. It holds only immutable state, so one instance is shared
//! by every producer thread of a binding.

use crate::error::{PartitionError, PartitionSelectionError};
use crate::message::Message;
use crate::partitioning::PartitionKeyExtractor;
use crate::selector::PartitionSelector;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Resolves and attaches the partition of outbound messages for one binding.
pub struct OutputPartitioner<T> {
  binding: String,
  partition_count: u32,
  key_extractor: Arc<dyn PartitionKeyExtractor<T>>,
  selector: Arc<dyn PartitionSelector>,
}

impl<T> Clone for OutputPartitioner<T> {
  fn clone(&self) -> Self {
    Self {
      binding: self.binding.clone(),
      partition_count: self.partition_count,
      key_extractor: self.key_extractor.clone(),
      selector: self.selector.clone(),
    }
  }
}

impl<T> fmt::Debug for OutputPartitioner<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OutputPartitioner")
      .field("binding", &self.binding)
      .field("partition_count", &self.partition_count)
      .finish_non_exhaustive()
  }
}

impl<T> OutputPartitioner<T> {
  /// Creates a partitioner.
  ///
  /// Normally built by the [`Binder`](crate::binder::Binder) from a validated
  /// config. With a `partition_count` of zero every message is rejected.
  #[must_use]
  pub fn new(
    binding: impl Into<String>,
    partition_count: u32,
    key_extractor: Arc<dyn PartitionKeyExtractor<T>>,
    selector: Arc<dyn PartitionSelector>,
  ) -> Self {
    Self {
      binding: binding.into(),
      partition_count,
      key_extractor,
      selector,
    }
  }

  /// Binding name.
  #[must_use]
  pub fn binding(&self) -> &str {
    &self.binding
  }

  /// Number of partitions messages are spread over.
  #[must_use]
  pub fn partition_count(&self) -> u32 {
    self.partition_count
  }

  /// Resolves the partition of `message` and attaches it as routing metadata.
  ///
  /// Returns the routed message together with its partition index. The payload
  /// and headers are left untouched.
  ///
  /// # Errors
  ///
  /// [`PartitionError::KeyExtraction`] or [`PartitionError::Selection`]; the
  /// message is dropped. Use [`partition_of`](Self::partition_of) to keep it.
  pub fn partition(&self, message: Message<T>) -> Result<(Message<T>, u32), PartitionError> {
    let partition = self.partition_of(&message)?;
    Ok((message.with_routing_partition(partition), partition))
  }

  /// Resolves the partition of `message` without modifying it.
  ///
  /// # Errors
  ///
  /// As [`partition`](Self::partition). An index outside
  /// `[0, partition_count)` from any selector is rejected, never wrapped.
  pub fn partition_of(&self, message: &Message<T>) -> Result<u32, PartitionError> {
    let key = self
      .key_extractor
      .extract_key(message)
      .map_err(|source| PartitionError::KeyExtraction {
        binding: self.binding.clone(),
        source,
      })?;
    let partition = self
      .selector
      .select_partition(&key, self.partition_count)
      .and_then(|partition| {
        if partition < self.partition_count {
          Ok(partition)
        } else {
          Err(PartitionSelectionError::OutOfRange {
            index: i64::from(partition),
            partition_count: self.partition_count,
          })
        }
      })
      .map_err(|source| PartitionError::Selection {
        binding: self.binding.clone(),
        source,
      })?;
    trace!(binding = %self.binding, %key, partition, "resolved message partition");
    Ok(partition)
  }
}
