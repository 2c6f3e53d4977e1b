//! Configuration properties.
//!
//! Property structs mirror the binding configuration surface and deserialize
//! from camelCase keys (`partitionKeyExpression`, `instanceIndex`, ...).
//! Deserialization only checks shape; the rules (mutual exclusivity, ranges) are
//! enforced when a [`BindingPartitionConfig`](crate::binding_config) is built.
//!
//! ```rust
//! use streamweave_partition::config::ApplicationConfig;
//!
//! let config = ApplicationConfig::from_json_str(r#"{
//!   "instanceIndex": 1,
//!   "instanceCount": 3,
//!   "bindings": {
//!     "orders-out": { "producer": { "partitionKeyExpression": "headers.id", "partitionCount": 6 } },
//!     "orders-in": { "destination": "orders", "consumer": { "partitioned": true, "partitionCount": 6 } }
//!   }
//! }"#).unwrap();
//! assert_eq!(config.instance().instance_count, 3);
//! ```

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Property name of [`ProducerProperties::partition_key_expression`].
pub const PARTITION_KEY_EXPRESSION: &str = "partitionKeyExpression";
/// Property name of [`ProducerProperties::partition_key_extractor_name`].
pub const PARTITION_KEY_EXTRACTOR_NAME: &str = "partitionKeyExtractorName";
/// Property name of [`ProducerProperties::partition_selector_expression`].
pub const PARTITION_SELECTOR_EXPRESSION: &str = "partitionSelectorExpression";
/// Property name of [`ProducerProperties::partition_selector_name`].
pub const PARTITION_SELECTOR_NAME: &str = "partitionSelectorName";
/// Property name of the partition count, on either side.
pub const PARTITION_COUNT: &str = "partitionCount";
/// Property name of the instance count.
pub const INSTANCE_COUNT: &str = "instanceCount";

/// Outbound (producer) partitioning properties of one binding.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ProducerProperties {
  /// Expression deriving the partition key from the message.
  pub partition_key_expression: Option<String>,
  /// Name of a registered key extractor.
  pub partition_key_extractor_name: Option<String>,
  /// Number of partitions of the destination.
  pub partition_count: Option<u32>,
  /// Expression mapping the raw key to a partition index.
  pub partition_selector_expression: Option<String>,
  /// Name of a registered partition selector.
  pub partition_selector_name: Option<String>,
}

impl ProducerProperties {
  /// Whether any partitioning strategy property is set.
  #[must_use]
  pub fn is_partitioned(&self) -> bool {
    self.partition_key_expression.is_some()
      || self.partition_key_extractor_name.is_some()
      || self.partition_selector_expression.is_some()
      || self.partition_selector_name.is_some()
  }
}

/// Inbound (consumer) partitioning properties of one binding.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ConsumerProperties {
  /// Whether this binding receives a partitioned subset of the stream.
  pub partitioned: bool,
  /// Overrides the process-wide instance index for this binding.
  pub instance_index: Option<u32>,
  /// Overrides the process-wide instance count for this binding.
  pub instance_count: Option<u32>,
  /// Instance slots owned by this process; replaces `instance_index` when set.
  pub instance_index_list: Option<Vec<u32>>,
  /// Partitions of the destination. Defaults to the effective instance count.
  pub partition_count: Option<u32>,
  /// Let a transport with native partitioning distribute partitions itself.
  pub auto_rebalance_enabled: bool,
}

impl Default for ConsumerProperties {
  fn default() -> Self {
    Self {
      partitioned: false,
      instance_index: None,
      instance_count: None,
      instance_index_list: None,
      partition_count: None,
      auto_rebalance_enabled: true,
    }
  }
}

/// Process-wide position of this application instance in its group.
///
/// Passed explicitly to every binding; there is no ambient global.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
  /// Zero-based index of this instance.
  pub instance_index: u32,
  /// Number of cooperating instances.
  pub instance_count: u32,
}

impl Default for InstanceConfig {
  fn default() -> Self {
    Self {
      instance_index: 0,
      instance_count: 1,
    }
  }
}

impl InstanceConfig {
  /// Creates an instance config. Validated when a binding uses it.
  #[must_use]
  pub fn new(instance_index: u32, instance_count: u32) -> Self {
    Self {
      instance_index,
      instance_count,
    }
  }

  /// Checks `instance_count >= 1` and `instance_index < instance_count`.
  ///
  /// # Errors
  ///
  /// [`ConfigurationError::ZeroCount`] or
  /// [`ConfigurationError::InstanceIndexOutOfRange`], naming `binding`.
  pub fn validate(&self, binding: &str) -> Result<(), ConfigurationError> {
    if self.instance_count == 0 {
      return Err(ConfigurationError::ZeroCount {
        binding: binding.to_string(),
        property: INSTANCE_COUNT,
      });
    }
    if self.instance_index >= self.instance_count {
      return Err(ConfigurationError::InstanceIndexOutOfRange {
        binding: binding.to_string(),
        index: self.instance_index,
        count: self.instance_count,
      });
    }
    Ok(())
  }
}

/// What the underlying transport can do on its own.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransportCapabilities {
  /// The transport assigns partitions to consumers itself (consumer-group
  /// rebalancing). When set and `autoRebalanceEnabled` is true, inbound
  /// assignment is left to the transport.
  pub native_partitioning: bool,
}

impl TransportCapabilities {
  /// A transport without native partition distribution.
  #[must_use]
  pub fn basic() -> Self {
    Self::default()
  }

  /// A transport that distributes partitions itself.
  #[must_use]
  pub fn native() -> Self {
    Self {
      native_partitioning: true,
    }
  }
}

/// Properties of one named binding.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BindingProperties {
  /// Destination (topic, exchange, ...) the binding is attached to.
  pub destination: Option<String>,
  /// Outbound properties.
  pub producer: Option<ProducerProperties>,
  /// Inbound properties.
  pub consumer: Option<ConsumerProperties>,
}

/// Whole-application configuration document.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ApplicationConfig {
  /// Zero-based index of this instance.
  pub instance_index: u32,
  /// Number of cooperating instances.
  pub instance_count: u32,
  /// Bindings by name.
  pub bindings: BTreeMap<String, BindingProperties>,
}

impl Default for ApplicationConfig {
  fn default() -> Self {
    let instance = InstanceConfig::default();
    Self {
      instance_index: instance.instance_index,
      instance_count: instance.instance_count,
      bindings: BTreeMap::new(),
    }
  }
}

impl ApplicationConfig {
  /// Parses a JSON document.
  ///
  /// # Errors
  ///
  /// [`ConfigurationError::Malformed`] on invalid JSON, unknown keys or wrong types.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Reads and parses a JSON file.
  ///
  /// # Errors
  ///
  /// [`ConfigurationError::Io`] if the file cannot be read, otherwise as
  /// [`from_json_str`](Self::from_json_str).
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json_str(&json)
  }

  /// Process-wide instance position.
  #[must_use]
  pub fn instance(&self) -> InstanceConfig {
    InstanceConfig::new(self.instance_index, self.instance_count)
  }

  /// Properties of a binding by name.
  #[must_use]
  pub fn binding(&self, name: &str) -> Option<&BindingProperties> {
    self.bindings.get(name)
  }
}
