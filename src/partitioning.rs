//! # Partition Keys and Key Extraction
//!
//! A [`PartitionKey`] is derived from each outbound message by a
//! [`PartitionKeyExtractor`] and then mapped to a partition index by a
//! [`PartitionSelector`](crate::selector::PartitionSelector).
//!
//! Keys hash with [`PartitionKey::hash_code`], a value hash that is stable across
//! processes and releases: producers on different hosts must agree on where a
//! key goes.
//!
//! ## Usage
//!
//! ```rust
//! use streamweave_partition::message::Message;
//! use streamweave_partition::partitioning::{PartitionKey, partition_key_extractor};
//!
//! let extractor = partition_key_extractor(|msg: &Message<u64>| Ok(PartitionKey::from(*msg.payload() as i64)));
//! let key = extractor.extract_key(&Message::new(42)).unwrap();
//! assert_eq!(key.hash_code(), 42);
//! ```

use crate::error::KeyExtractionError;
use crate::expression::{EvaluationContext, Expression, json_type_name};
use crate::message::Message;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Value used to pick the partition of a message.
///
/// Lives for one send call; never persisted.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PartitionKey {
  /// 32-bit integer key. Hashes to itself.
  Int(i32),
  /// 64-bit integer key.
  Long(i64),
  /// String key, hashed over its UTF-16 code units.
  String(String),
  /// Raw bytes key.
  Bytes(Vec<u8>),
  /// Boolean key.
  Bool(bool),
}

impl PartitionKey {
  /// Stable 32-bit value hash.
  ///
  /// - `Int(v)`: `v`
  /// - `Long(v)`: `(v ^ (v >>> 32)) as i32`
  /// - `String(s)`: `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 code units, wrapping
  /// - `Bytes(b)`: `31*h + (b as i8)` folded from 1, wrapping
  /// - `Bool(b)`: 1231 for true, 1237 for false
  ///
  /// The result may be any `i32`, including `i32::MIN`.
  #[must_use]
  pub fn hash_code(&self) -> i32 {
    match self {
      PartitionKey::Int(v) => *v,
      PartitionKey::Long(v) => (*v ^ ((*v as u64) >> 32) as i64) as i32,
      PartitionKey::String(s) => s
        .encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c))),
      PartitionKey::Bytes(b) => b
        .iter()
        .fold(1i32, |h, &x| h.wrapping_mul(31).wrapping_add(i32::from(x as i8))),
      PartitionKey::Bool(true) => 1231,
      PartitionKey::Bool(false) => 1237,
    }
  }

  /// Converts an expression result into a key.
  ///
  /// Integers become `Int` when they fit in 32 bits and `Long` otherwise.
  /// Returns `None` for null, floats, integers above `i64::MAX`, arrays and
  /// objects.
  #[must_use]
  pub fn from_json(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(b) => Some(PartitionKey::Bool(*b)),
      Value::String(s) => Some(PartitionKey::String(s.clone())),
      Value::Number(n) => {
        let v = n.as_i64()?;
        Some(match i32::try_from(v) {
          Ok(small) => PartitionKey::Int(small),
          Err(_) => PartitionKey::Long(v),
        })
      }
      Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
  }

  /// JSON view of the key, as seen by selector expressions under root `key`.
  #[must_use]
  pub fn to_json(&self) -> Value {
    match self {
      PartitionKey::Int(v) => Value::from(*v),
      PartitionKey::Long(v) => Value::from(*v),
      PartitionKey::String(s) => Value::String(s.clone()),
      PartitionKey::Bytes(b) => Value::from(b.clone()),
      PartitionKey::Bool(b) => Value::Bool(*b),
    }
  }
}

impl Display for PartitionKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      PartitionKey::Int(v) => write!(f, "{}", v),
      PartitionKey::Long(v) => write!(f, "{}", v),
      PartitionKey::String(s) => write!(f, "{}", s),
      PartitionKey::Bytes(b) => write!(f, "<{} bytes>", b.len()),
      PartitionKey::Bool(b) => write!(f, "{}", b),
    }
  }
}

impl From<i32> for PartitionKey {
  fn from(v: i32) -> Self {
    PartitionKey::Int(v)
  }
}

impl From<i64> for PartitionKey {
  fn from(v: i64) -> Self {
    PartitionKey::Long(v)
  }
}

impl From<String> for PartitionKey {
  fn from(s: String) -> Self {
    PartitionKey::String(s)
  }
}

impl From<&str> for PartitionKey {
  fn from(s: &str) -> Self {
    PartitionKey::String(s.to_string())
  }
}

impl From<Vec<u8>> for PartitionKey {
  fn from(bytes: Vec<u8>) -> Self {
    PartitionKey::Bytes(bytes)
  }
}

impl From<bool> for PartitionKey {
  fn from(b: bool) -> Self {
    PartitionKey::Bool(b)
  }
}

/// Derives the partition key of an outbound message.
///
/// Implementations must not mutate shared state: the output partitioner calls
/// them concurrently from every producer thread, and the same message must always
/// yield the same key.
pub trait PartitionKeyExtractor<T>: Send + Sync {
  /// Extracts the key. Any error fails the send of this message.
  fn extract_key(&self, message: &Message<T>) -> Result<PartitionKey, KeyExtractionError>;
}

/// Wrapper that implements `PartitionKeyExtractor` for closures.
struct FnKeyExtractor<F> {
  function: F,
}

impl<T, F> PartitionKeyExtractor<T> for FnKeyExtractor<F>
where
  F: Fn(&Message<T>) -> Result<PartitionKey, KeyExtractionError> + Send + Sync,
{
  fn extract_key(&self, message: &Message<T>) -> Result<PartitionKey, KeyExtractionError> {
    (self.function)(message)
  }
}

/// Creates a key extractor from a closure.
pub fn partition_key_extractor<T, F>(function: F) -> Arc<dyn PartitionKeyExtractor<T>>
where
  T: 'static,
  F: Fn(&Message<T>) -> Result<PartitionKey, KeyExtractionError> + Send + Sync + 'static,
{
  Arc::new(FnKeyExtractor { function })
}

/// Extracts the key by evaluating a compiled expression against the message.
///
/// The payload is viewed through `serde_json` only when the expression reads it.
#[derive(Clone, Debug)]
pub struct ExpressionKeyExtractor {
  expression: Arc<dyn Expression>,
}

impl ExpressionKeyExtractor {
  /// Creates an extractor over an already compiled expression.
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

impl<T: Serialize> PartitionKeyExtractor<T> for ExpressionKeyExtractor {
  fn extract_key(&self, message: &Message<T>) -> Result<PartitionKey, KeyExtractionError> {
    let payload = if self.expression.reads_payload() {
      Some(serde_json::to_value(message.payload()).map_err(KeyExtractionError::Payload)?)
    } else {
      None
    };
    let context = EvaluationContext::message(payload.as_ref(), &message.metadata().headers);
    let value = self
      .expression
      .evaluate(&context)
      .map_err(|source| KeyExtractionError::Expression {
        expression: self.source().to_string(),
        source,
      })?;
    PartitionKey::from_json(&value).ok_or_else(|| KeyExtractionError::IncompatibleType {
      expression: self.source().to_string(),
      found: json_type_name(&value),
    })
  }
}
