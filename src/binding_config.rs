//! Validated, immutable partitioning configuration of one binding.
//!
//! A [`BindingPartitionConfig`] is built once per binding from its
//! [`BindingProperties`], the process-wide [`InstanceConfig`] and the transport's
//! [`TransportCapabilities`]. Every rule is checked here, so a config that exists
//! is a config that is valid:
//!
//! - at most one key strategy and one selector strategy property
//! - `partitionCount` present and non-zero when outbound partitioning is configured
//! - `0 <= instanceIndex < instanceCount` for partitioned inputs
//! - `partitionCount >= instanceCount` when this process computes its own
//!   inbound assignment
//!
//! Reconfiguration means building a new config and recreating the binding; there
//! are no setters.

use crate::config::{
  BindingProperties, ConsumerProperties, InstanceConfig, PARTITION_COUNT,
  PARTITION_KEY_EXPRESSION, PARTITION_KEY_EXTRACTOR_NAME, PARTITION_SELECTOR_EXPRESSION,
  PARTITION_SELECTOR_NAME, ProducerProperties, TransportCapabilities,
};
use crate::error::ConfigurationError;
use tracing::debug;

/// How the partition key of an outbound message is derived.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyStrategy {
  /// Evaluate `partitionKeyExpression`.
  Expression(String),
  /// Use the registered extractor named by `partitionKeyExtractorName`.
  Named(String),
  /// No key property set: use the only registered extractor.
  Discovered,
}

/// How a partition key is mapped to a partition index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectorStrategy {
  /// No selector property set: the only registered selector if there is one,
  /// otherwise [`DefaultHashSelector`](crate::selector::DefaultHashSelector).
  Unspecified,
  /// Evaluate `partitionSelectorExpression` against the raw key.
  Expression(String),
  /// Use the registered selector named by `partitionSelectorName`.
  Named(String),
}

/// Outbound partitioning of a binding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputPartitionConfig {
  partition_count: u32,
  key_strategy: KeyStrategy,
  selector_strategy: SelectorStrategy,
}

impl OutputPartitionConfig {
  /// Validates producer properties. `None` when the binding does not partition.
  pub fn from_properties(
    binding: &str,
    props: &ProducerProperties,
  ) -> Result<Option<Self>, ConfigurationError> {
    let key_strategy = match (
      &props.partition_key_expression,
      &props.partition_key_extractor_name,
    ) {
      (Some(_), Some(_)) => {
        return Err(conflict(
          binding,
          PARTITION_KEY_EXPRESSION,
          PARTITION_KEY_EXTRACTOR_NAME,
        ));
      }
      (Some(expression), None) => KeyStrategy::Expression(expression.clone()),
      (None, Some(name)) => KeyStrategy::Named(name.clone()),
      (None, None) => KeyStrategy::Discovered,
    };
    let selector_strategy = match (
      &props.partition_selector_expression,
      &props.partition_selector_name,
    ) {
      (Some(_), Some(_)) => {
        return Err(conflict(
          binding,
          PARTITION_SELECTOR_EXPRESSION,
          PARTITION_SELECTOR_NAME,
        ));
      }
      (Some(expression), None) => SelectorStrategy::Expression(expression.clone()),
      (None, Some(name)) => SelectorStrategy::Named(name.clone()),
      (None, None) => SelectorStrategy::Unspecified,
    };

    if props.partition_count == Some(0) {
      return Err(ConfigurationError::ZeroCount {
        binding: binding.to_string(),
        property: PARTITION_COUNT,
      });
    }
    if !props.is_partitioned() {
      return Ok(None);
    }
    let partition_count =
      props
        .partition_count
        .ok_or_else(|| ConfigurationError::MissingPartitionCount {
          binding: binding.to_string(),
        })?;

    Ok(Some(Self {
      partition_count,
      key_strategy,
      selector_strategy,
    }))
  }

  /// Number of partitions of the destination, always >= 1.
  #[must_use]
  pub fn partition_count(&self) -> u32 {
    self.partition_count
  }

  /// The configured key strategy.
  #[must_use]
  pub fn key_strategy(&self) -> &KeyStrategy {
    &self.key_strategy
  }

  /// The configured selector strategy.
  #[must_use]
  pub fn selector_strategy(&self) -> &SelectorStrategy {
    &self.selector_strategy
  }
}

/// Who decides which partitions an input binding consumes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputPartitionMode {
  /// The binding consumes the whole destination.
  Unpartitioned,
  /// The transport distributes partitions natively; instance position is only a hint.
  ///
  /// `instanceIndexList` is validated but not passed on: the transport decides
  /// ownership, so only the primary index travels as the hint.
  TransportManaged {
    /// Effective instance index (`instanceIndex`, or the process-wide index).
    instance_index: u32,
    /// Effective instance count.
    instance_count: u32,
  },
  /// This process computes its own assignment.
  Computed {
    /// Instance slots owned by this process, sorted and distinct.
    instance_indexes: Vec<u32>,
    /// Effective instance count.
    instance_count: u32,
    /// Partitions of the destination, >= `instance_count`.
    partition_count: u32,
  },
}

/// Inbound partitioning of a binding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputPartitionConfig {
  mode: InputPartitionMode,
}

impl InputPartitionConfig {
  /// Validates consumer properties against the effective instance position.
  pub fn from_properties(
    binding: &str,
    props: &ConsumerProperties,
    instance: &InstanceConfig,
    transport: TransportCapabilities,
  ) -> Result<Self, ConfigurationError> {
    if !props.partitioned {
      return Ok(Self {
        mode: InputPartitionMode::Unpartitioned,
      });
    }

    let instance_count = props.instance_count.unwrap_or(instance.instance_count);
    let primary_index = props.instance_index.unwrap_or(instance.instance_index);
    let mut instance_indexes = match &props.instance_index_list {
      Some(list) if !list.is_empty() => list.clone(),
      _ => vec![primary_index],
    };
    instance_indexes.sort_unstable();
    instance_indexes.dedup();
    for index in &instance_indexes {
      InstanceConfig::new(*index, instance_count).validate(binding)?;
    }

    if transport.native_partitioning && props.auto_rebalance_enabled {
      return Ok(Self {
        mode: InputPartitionMode::TransportManaged {
          instance_index: primary_index,
          instance_count,
        },
      });
    }

    let partition_count = props.partition_count.unwrap_or(instance_count);
    if partition_count == 0 {
      return Err(ConfigurationError::ZeroCount {
        binding: binding.to_string(),
        property: PARTITION_COUNT,
      });
    }
    if partition_count < instance_count {
      return Err(ConfigurationError::InsufficientPartitions {
        binding: binding.to_string(),
        partition_count,
        instance_count,
      });
    }

    Ok(Self {
      mode: InputPartitionMode::Computed {
        instance_indexes,
        instance_count,
        partition_count,
      },
    })
  }

  /// The resolved mode.
  #[must_use]
  pub fn mode(&self) -> &InputPartitionMode {
    &self.mode
  }
}

/// Partitioning configuration of one binding, outbound and inbound.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindingPartitionConfig {
  binding: String,
  destination: String,
  output: Option<OutputPartitionConfig>,
  input: Option<InputPartitionConfig>,
}

impl BindingPartitionConfig {
  /// Validates the properties of binding `binding`.
  ///
  /// The destination defaults to the binding name.
  ///
  /// # Errors
  ///
  /// A [`ConfigurationError`] naming the binding and the offending property.
  pub fn from_properties(
    binding: &str,
    props: &BindingProperties,
    instance: &InstanceConfig,
    transport: TransportCapabilities,
  ) -> Result<Self, ConfigurationError> {
    let output = match &props.producer {
      Some(producer) => OutputPartitionConfig::from_properties(binding, producer)?,
      None => None,
    };
    let input = props
      .consumer
      .as_ref()
      .map(|consumer| InputPartitionConfig::from_properties(binding, consumer, instance, transport))
      .transpose()?;

    let config = Self {
      binding: binding.to_string(),
      destination: props
        .destination
        .clone()
        .unwrap_or_else(|| binding.to_string()),
      output,
      input,
    };
    debug!(
      binding = %config.binding,
      destination = %config.destination,
      output = ?config.output,
      input = ?config.input.as_ref().map(InputPartitionConfig::mode),
      "resolved partition config"
    );
    Ok(config)
  }

  /// Binding name.
  #[must_use]
  pub fn binding(&self) -> &str {
    &self.binding
  }

  /// Destination name.
  #[must_use]
  pub fn destination(&self) -> &str {
    &self.destination
  }

  /// Outbound partitioning, if the binding partitions.
  #[must_use]
  pub fn output(&self) -> Option<&OutputPartitionConfig> {
    self.output.as_ref()
  }

  /// Inbound partitioning, if the binding has consumer properties.
  #[must_use]
  pub fn input(&self) -> Option<&InputPartitionConfig> {
    self.input.as_ref()
  }
}

fn conflict(binding: &str, first: &'static str, second: &'static str) -> ConfigurationError {
  ConfigurationError::ConflictingProperties {
    binding: binding.to_string(),
    first,
    second,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn producer(f: impl FnOnce(&mut ProducerProperties)) -> ProducerProperties {
    let mut props = ProducerProperties::default();
    f(&mut props);
    props
  }

  fn consumer(f: impl FnOnce(&mut ConsumerProperties)) -> ConsumerProperties {
    let mut props = ConsumerProperties {
      partitioned: true,
      auto_rebalance_enabled: false,
      ..Default::default()
    };
    f(&mut props);
    props
  }

  #[test]
  fn test_key_expression_and_extractor_name_conflict() {
    let props = producer(|p| {
      p.partition_key_expression = Some("headers.id".to_string());
      p.partition_key_extractor_name = Some("custom".to_string());
      p.partition_count = Some(3);
    });
    let err = OutputPartitionConfig::from_properties("orders-out", &props).unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::ConflictingProperties {
        first: PARTITION_KEY_EXPRESSION,
        second: PARTITION_KEY_EXTRACTOR_NAME,
        ..
      }
    ));
    assert!(err.to_string().contains("orders-out"));
  }

  #[test]
  fn test_selector_expression_and_name_conflict() {
    let props = producer(|p| {
      p.partition_key_expression = Some("headers.id".to_string());
      p.partition_selector_expression = Some("key".to_string());
      p.partition_selector_name = Some("custom".to_string());
      p.partition_count = Some(3);
    });
    assert!(matches!(
      OutputPartitionConfig::from_properties("out", &props),
      Err(ConfigurationError::ConflictingProperties {
        first: PARTITION_SELECTOR_EXPRESSION,
        second: PARTITION_SELECTOR_NAME,
        ..
      })
    ));
  }

  #[test]
  fn test_missing_partition_count() {
    let props = producer(|p| p.partition_key_expression = Some("headers.id".to_string()));
    assert!(matches!(
      OutputPartitionConfig::from_properties("out", &props),
      Err(ConfigurationError::MissingPartitionCount { .. })
    ));
  }

  #[test]
  fn test_zero_partition_count() {
    let props = producer(|p| {
      p.partition_key_extractor_name = Some("custom".to_string());
      p.partition_count = Some(0);
    });
    assert!(matches!(
      OutputPartitionConfig::from_properties("out", &props),
      Err(ConfigurationError::ZeroCount {
        property: PARTITION_COUNT,
        ..
      })
    ));
  }

  #[test]
  fn test_unpartitioned_output() {
    let props = producer(|p| p.partition_count = Some(4));
    assert_eq!(OutputPartitionConfig::from_properties("out", &props).unwrap(), None);
  }

  #[test]
  fn test_output_strategies() {
    let props = producer(|p| {
      p.partition_key_expression = Some("payload.id".to_string());
      p.partition_count = Some(5);
    });
    let config = OutputPartitionConfig::from_properties("out", &props)
      .unwrap()
      .unwrap();
    assert_eq!(config.partition_count(), 5);
    assert_eq!(
      config.key_strategy(),
      &KeyStrategy::Expression("payload.id".to_string())
    );
    assert_eq!(config.selector_strategy(), &SelectorStrategy::Unspecified);

    let props = producer(|p| {
      p.partition_selector_name = Some("mod".to_string());
      p.partition_count = Some(2);
    });
    let config = OutputPartitionConfig::from_properties("out", &props)
      .unwrap()
      .unwrap();
    assert_eq!(config.key_strategy(), &KeyStrategy::Discovered);
    assert_eq!(
      config.selector_strategy(),
      &SelectorStrategy::Named("mod".to_string())
    );
  }

  #[test]
  fn test_unpartitioned_input_skips_validation() {
    let props = ConsumerProperties::default();
    let config = InputPartitionConfig::from_properties(
      "in",
      &props,
      &InstanceConfig::new(9, 0),
      TransportCapabilities::basic(),
    )
    .unwrap();
    assert_eq!(config.mode(), &InputPartitionMode::Unpartitioned);
  }

  #[test]
  fn test_computed_input_defaults_partition_count_to_instance_count() {
    let config = InputPartitionConfig::from_properties(
      "in",
      &consumer(|_| {}),
      &InstanceConfig::new(3, 5),
      TransportCapabilities::basic(),
    )
    .unwrap();
    assert_eq!(
      config.mode(),
      &InputPartitionMode::Computed {
        instance_indexes: vec![3],
        instance_count: 5,
        partition_count: 5,
      }
    );
  }

  #[test]
  fn test_instance_index_out_of_range() {
    let err = InputPartitionConfig::from_properties(
      "in",
      &consumer(|_| {}),
      &InstanceConfig::new(5, 5),
      TransportCapabilities::basic(),
    )
    .unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::InstanceIndexOutOfRange {
        index: 5,
        count: 5,
        ..
      }
    ));
  }

  #[test]
  fn test_binding_overrides_process_instance() {
    let props = consumer(|c| {
      c.instance_index = Some(1);
      c.instance_count = Some(2);
      c.partition_count = Some(4);
    });
    let config = InputPartitionConfig::from_properties(
      "in",
      &props,
      &InstanceConfig::new(7, 10),
      TransportCapabilities::basic(),
    )
    .unwrap();
    assert_eq!(
      config.mode(),
      &InputPartitionMode::Computed {
        instance_indexes: vec![1],
        instance_count: 2,
        partition_count: 4,
      }
    );
  }

  #[test]
  fn test_instance_index_list_sorted_and_validated() {
    let props = consumer(|c| {
      c.instance_index_list = Some(vec![2, 0, 2]);
      c.partition_count = Some(6);
    });
    let config = InputPartitionConfig::from_properties(
      "in",
      &props,
      &InstanceConfig::new(1, 3),
      TransportCapabilities::basic(),
    )
    .unwrap();
    assert_eq!(
      config.mode(),
      &InputPartitionMode::Computed {
        instance_indexes: vec![0, 2],
        instance_count: 3,
        partition_count: 6,
      }
    );

    let props = consumer(|c| c.instance_index_list = Some(vec![0, 3]));
    assert!(matches!(
      InputPartitionConfig::from_properties(
        "in",
        &props,
        &InstanceConfig::new(0, 3),
        TransportCapabilities::basic()
      ),
      Err(ConfigurationError::InstanceIndexOutOfRange { index: 3, .. })
    ));
  }

  #[test]
  fn test_fewer_partitions_than_instances_rejected() {
    let props = consumer(|c| c.partition_count = Some(3));
    assert!(matches!(
      InputPartitionConfig::from_properties(
        "in",
        &props,
        &InstanceConfig::new(0, 5),
        TransportCapabilities::basic()
      ),
      Err(ConfigurationError::InsufficientPartitions {
        partition_count: 3,
        instance_count: 5,
        ..
      })
    ));
  }

  #[test]
  fn test_native_transport_with_auto_rebalance_is_transport_managed() {
    let props = consumer(|c| {
      c.auto_rebalance_enabled = true;
      c.partition_count = Some(1);
    });
    let config = InputPartitionConfig::from_properties(
      "in",
      &props,
      &InstanceConfig::new(2, 4),
      TransportCapabilities::native(),
    )
    .unwrap();
    assert_eq!(
      config.mode(),
      &InputPartitionMode::TransportManaged {
        instance_index: 2,
        instance_count: 4,
      }
    );
  }

  #[test]
  fn test_transport_managed_hint_ignores_index_list() {
    let props = consumer(|c| {
      c.auto_rebalance_enabled = true;
      c.instance_index_list = Some(vec![0, 2]);
    });
    let config = InputPartitionConfig::from_properties(
      "in",
      &props,
      &InstanceConfig::new(1, 3),
      TransportCapabilities::native(),
    )
    .unwrap();
    assert_eq!(
      config.mode(),
      &InputPartitionMode::TransportManaged {
        instance_index: 1,
        instance_count: 3,
      }
    );

    // the list is still validated
    let props = consumer(|c| {
      c.auto_rebalance_enabled = true;
      c.instance_index_list = Some(vec![0, 3]);
    });
    assert!(matches!(
      InputPartitionConfig::from_properties(
        "in",
        &props,
        &InstanceConfig::new(1, 3),
        TransportCapabilities::native()
      ),
      Err(ConfigurationError::InstanceIndexOutOfRange { index: 3, .. })
    ));
  }

  #[test]
  fn test_native_transport_without_auto_rebalance_is_computed() {
    let config = InputPartitionConfig::from_properties(
      "in",
      &consumer(|_| {}),
      &InstanceConfig::new(0, 2),
      TransportCapabilities::native(),
    )
    .unwrap();
    assert!(matches!(config.mode(), InputPartitionMode::Computed { .. }));
  }

  #[test]
  fn test_auto_rebalance_on_basic_transport_is_computed() {
    let props = consumer(|c| c.auto_rebalance_enabled = true);
    let config = InputPartitionConfig::from_properties(
      "in",
      &props,
      &InstanceConfig::new(0, 2),
      TransportCapabilities::basic(),
    )
    .unwrap();
    assert!(matches!(config.mode(), InputPartitionMode::Computed { .. }));
  }

  #[test]
  fn test_binding_config_destination_defaults_to_binding_name() {
    let props = BindingProperties {
      producer: Some(producer(|p| {
        p.partition_key_expression = Some("headers.id".to_string());
        p.partition_count = Some(2);
      })),
      ..Default::default()
    };
    let config = BindingPartitionConfig::from_properties(
      "orders",
      &props,
      &InstanceConfig::default(),
      TransportCapabilities::basic(),
    )
    .unwrap();
    assert_eq!(config.binding(), "orders");
    assert_eq!(config.destination(), "orders");
    assert!(config.output().is_some());
    assert!(config.input().is_none());
  }
}
