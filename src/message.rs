//! Outbound message envelope.
//!
//! A [`Message<T>`] wraps a payload with [`MessageMetadata`]: string headers
//! visible to key expressions, and the routing partition attached by the
//! [`OutputPartitioner`](crate::output::OutputPartitioner) before the message is
//! handed to a transport producer.
//!
//! # Example
//!
//! ```rust
//! use streamweave_partition::message::Message;
//!
//! let msg = Message::new("created").header("id", "42");
//! assert_eq!(msg.metadata().get_header("id"), Some("42"));
//! assert_eq!(msg.routing_partition(), None);
//!
//! let routed = msg.with_routing_partition(2);
//! assert_eq!(routed.routing_partition(), Some(2));
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata carried alongside a payload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageMetadata {
  /// When the message was created (as Duration since UNIX_EPOCH).
  pub timestamp: Option<Duration>,

  /// Partition index resolved for this message on the outbound side.
  pub partition: Option<u32>,

  /// Additional headers, in insertion order.
  pub headers: Vec<(String, String)>,
}

impl MessageMetadata {
  /// Create new empty metadata.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Create metadata with the current timestamp.
  #[must_use]
  pub fn with_timestamp_now() -> Self {
    Self {
      timestamp: SystemTime::now().duration_since(UNIX_EPOCH).ok(),
      ..Default::default()
    }
  }

  /// Add a header. A later header with the same name shadows earlier ones.
  #[must_use]
  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Get a header by name.
  #[must_use]
  pub fn get_header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .rev()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

/// A payload plus its metadata.
///
/// The partitioning layer never touches the payload; it only reads headers and
/// writes [`MessageMetadata::partition`].
#[derive(Clone, Debug, PartialEq)]
pub struct Message<T> {
  payload: T,
  metadata: MessageMetadata,
}

impl<T> Message<T> {
  /// Create a message stamped with the current time.
  #[must_use]
  pub fn new(payload: T) -> Self {
    Self {
      payload,
      metadata: MessageMetadata::with_timestamp_now(),
    }
  }

  /// Create a message with explicit metadata.
  #[must_use]
  pub fn with_metadata(payload: T, metadata: MessageMetadata) -> Self {
    Self { payload, metadata }
  }

  /// Add a header.
  #[must_use]
  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata = self.metadata.header(name, value);
    self
  }

  /// Get the payload.
  #[must_use]
  pub fn payload(&self) -> &T {
    &self.payload
  }

  /// Get the metadata.
  #[must_use]
  pub fn metadata(&self) -> &MessageMetadata {
    &self.metadata
  }

  /// Partition index attached by the output partitioner, if any.
  #[must_use]
  pub fn routing_partition(&self) -> Option<u32> {
    self.metadata.partition
  }

  /// Attach the routing partition, leaving payload and headers untouched.
  #[must_use]
  pub fn with_routing_partition(mut self, partition: u32) -> Self {
    self.metadata.partition = Some(partition);
    self
  }

  /// Consume the message and return its components.
  #[must_use]
  pub fn into_parts(self) -> (T, MessageMetadata) {
    (self.payload, self.metadata)
  }

  /// Map the payload to a new type, keeping metadata.
  #[must_use]
  pub fn map<U, F>(self, f: F) -> Message<U>
  where
    F: FnOnce(T) -> U,
  {
    Message {
      payload: f(self.payload),
      metadata: self.metadata,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_message_has_timestamp_and_no_partition() {
    let msg = Message::new(1u8);
    assert!(msg.metadata().timestamp.is_some());
    assert_eq!(msg.routing_partition(), None);
  }

  #[test]
  fn test_later_header_shadows_earlier() {
    let msg = Message::new(()).header("id", "1").header("id", "2");
    assert_eq!(msg.metadata().get_header("id"), Some("2"));
    assert_eq!(msg.metadata().get_header("missing"), None);
  }

  #[test]
  fn test_routing_partition_keeps_payload_and_headers() {
    let msg = Message::new(vec![1, 2, 3]).header("tenant", "a");
    let before = msg.clone();
    let routed = msg.with_routing_partition(4);

    assert_eq!(routed.payload(), before.payload());
    assert_eq!(routed.metadata().headers, before.metadata().headers);
    assert_eq!(routed.routing_partition(), Some(4));
  }

  #[test]
  fn test_map_keeps_metadata() {
    let msg = Message::new(21).header("k", "v").with_routing_partition(1);
    let doubled = msg.map(|n| n * 2);
    assert_eq!(*doubled.payload(), 42);
    assert_eq!(doubled.routing_partition(), Some(1));
    assert_eq!(doubled.metadata().get_header("k"), Some("v"));
  }
}
