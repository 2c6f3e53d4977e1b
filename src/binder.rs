//! Binding creation.
//!
//! The [`Binder`] turns binding properties into ready-to-use partitioning state:
//! an [`OutputPartitioner`] for outbound bindings and a [`PartitionOwnership`]
//! for inbound ones. All validation, expression compilation and strategy lookup
//! happens here, once per binding; the message path only sees resolved
//! strategies.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use streamweave_partition::binder::Binder;
//! use streamweave_partition::config::{ApplicationConfig, TransportCapabilities};
//! use streamweave_partition::message::Message;
//! use streamweave_partition::registry::StrategyRegistry;
//!
//! let config = ApplicationConfig::from_json_str(r#"{
//!   "bindings": {
//!     "orders-out": { "producer": { "partitionKeyExpression": "headers.id", "partitionCount": 5 } }
//!   }
//! }"#).unwrap();
//! let binder = Binder::<serde_json::Value>::new(
//!   config.instance(),
//!   TransportCapabilities::basic(),
//!   Arc::new(StrategyRegistry::new()),
//! );
//! let bindings = binder.bind_all(&config).unwrap();
//! let partitioner = bindings["orders-out"].output().unwrap();
//!
//! let message = Message::new(serde_json::json!({})).header("id", "42");
//! let (routed, partition) = partitioner.partition(message).unwrap();
//! assert_eq!(partition, 2);
//! assert_eq!(routed.routing_partition(), Some(2));
//! ```

use crate::assignment::PartitionOwnership;
use crate::binding_config::{BindingPartitionConfig, KeyStrategy, SelectorStrategy};
use crate::config::{
  ApplicationConfig, BindingProperties, InstanceConfig, PARTITION_KEY_EXPRESSION,
  PARTITION_SELECTOR_EXPRESSION, TransportCapabilities,
};
use crate::error::{ConfigurationError, RegistryError};
use crate::expression::{ExpressionParser, PathExpressionParser};
use crate::output::OutputPartitioner;
use crate::partitioning::{ExpressionKeyExtractor, PartitionKeyExtractor};
use crate::registry::StrategyRegistry;
use crate::selector::{DefaultHashSelector, ExpressionSelector, PartitionSelector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Creates bindings for one application instance.
pub struct Binder<T> {
  instance: InstanceConfig,
  transport: TransportCapabilities,
  registry: Arc<StrategyRegistry<T>>,
  parser: Arc<dyn ExpressionParser>,
}

impl<T> fmt::Debug for Binder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Binder")
      .field("instance", &self.instance)
      .field("transport", &self.transport)
      .field("registry", &self.registry)
      .finish_non_exhaustive()
  }
}

impl<T: Serialize + 'static> Binder<T> {
  /// Creates a binder using the built-in [`PathExpressionParser`].
  #[must_use]
  pub fn new(
    instance: InstanceConfig,
    transport: TransportCapabilities,
    registry: Arc<StrategyRegistry<T>>,
  ) -> Self {
    Self {
      instance,
      transport,
      registry,
      parser: Arc::new(PathExpressionParser::new()),
    }
  }

  /// Replaces the expression language.
  #[must_use]
  pub fn with_expression_parser(mut self, parser: Arc<dyn ExpressionParser>) -> Self {
    self.parser = parser;
    self
  }

  /// Process-wide instance position used by this binder.
  #[must_use]
  pub fn instance(&self) -> InstanceConfig {
    self.instance
  }

  /// Creates the binding `name`.
  ///
  /// # Errors
  ///
  /// Any [`ConfigurationError`]: invalid properties, an expression that does not
  /// compile, or a strategy the registry cannot resolve.
  pub fn bind(&self, name: &str, props: &BindingProperties) -> Result<Binding<T>, ConfigurationError> {
    let config = BindingPartitionConfig::from_properties(name, props, &self.instance, self.transport)?;

    let output = match config.output() {
      Some(output) => {
        let key_extractor = self.key_extractor(name, output.key_strategy())?;
        let selector = self.selector(name, output.selector_strategy())?;
        Some(OutputPartitioner::new(
          name,
          output.partition_count(),
          key_extractor,
          selector,
        ))
      }
      None => None,
    };
    let ownership = config
      .input()
      .map(|input| PartitionOwnership::resolve(name, input));

    Ok(Binding {
      config,
      output,
      ownership,
    })
  }

  /// Creates every binding of `config`, in name order. Stops at the first error.
  ///
  /// # Errors
  ///
  /// As [`bind`](Self::bind).
  pub fn bind_all(
    &self,
    config: &ApplicationConfig,
  ) -> Result<BTreeMap<String, Binding<T>>, ConfigurationError> {
    config
      .bindings
      .iter()
      .map(|(name, props)| self.bind(name, props).map(|binding| (name.clone(), binding)))
      .collect()
  }

  fn key_extractor(
    &self,
    binding: &str,
    strategy: &KeyStrategy,
  ) -> Result<Arc<dyn PartitionKeyExtractor<T>>, ConfigurationError> {
    match strategy {
      KeyStrategy::Expression(source) => {
        let expression =
          self
            .parser
            .parse(source)
            .map_err(|source| ConfigurationError::InvalidExpression {
              binding: binding.to_string(),
              property: PARTITION_KEY_EXPRESSION,
              source,
            })?;
        Ok(Arc::new(ExpressionKeyExtractor::new(expression)))
      }
      KeyStrategy::Named(name) => self
        .registry
        .key_extractor(Some(name))
        .map_err(|source| strategy_error(binding, source)),
      KeyStrategy::Discovered => self
        .registry
        .key_extractor(None)
        .map_err(|source| strategy_error(binding, source)),
    }
  }

  fn selector(
    &self,
    binding: &str,
    strategy: &SelectorStrategy,
  ) -> Result<Arc<dyn PartitionSelector>, ConfigurationError> {
    match strategy {
      SelectorStrategy::Unspecified => match self.registry.partition_selector(None) {
        Ok(selector) => Ok(selector),
        Err(RegistryError::NoCandidate { .. }) => Ok(Arc::new(DefaultHashSelector::new())),
        Err(source) => Err(strategy_error(binding, source)),
      },
      SelectorStrategy::Expression(source) => {
        let expression =
          self
            .parser
            .parse(source)
            .map_err(|source| ConfigurationError::InvalidExpression {
              binding: binding.to_string(),
              property: PARTITION_SELECTOR_EXPRESSION,
              source,
            })?;
        Ok(Arc::new(ExpressionSelector::new(expression)))
      }
      SelectorStrategy::Named(name) => self
        .registry
        .partition_selector(Some(name))
        .map_err(|source| strategy_error(binding, source)),
    }
  }
}

fn strategy_error(binding: &str, source: RegistryError) -> ConfigurationError {
  ConfigurationError::Strategy {
    binding: binding.to_string(),
    source,
  }
}

/// A created binding: its validated config and resolved partitioning state.
pub struct Binding<T> {
  config: BindingPartitionConfig,
  output: Option<OutputPartitioner<T>>,
  ownership: Option<PartitionOwnership>,
}

impl<T> fmt::Debug for Binding<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Binding")
      .field("config", &self.config)
      .field("output", &self.output)
      .field("ownership", &self.ownership)
      .finish()
  }
}

impl<T> Binding<T> {
  /// The validated partitioning config.
  #[must_use]
  pub fn config(&self) -> &BindingPartitionConfig {
    &self.config
  }

  /// Outbound partitioner, if the binding partitions outbound messages.
  #[must_use]
  pub fn output(&self) -> Option<&OutputPartitioner<T>> {
    self.output.as_ref()
  }

  /// Inbound ownership, if the binding has consumer properties.
  #[must_use]
  pub fn ownership(&self) -> Option<&PartitionOwnership> {
    self.ownership.as_ref()
  }

  /// Per-partition sub-resources to subscribe to.
  ///
  /// Empty unless this process computed its own assignment.
  #[must_use]
  pub fn subscriptions(&self) -> Vec<String> {
    self
      .ownership
      .as_ref()
      .and_then(PartitionOwnership::assignment)
      .map(|assignment| assignment.subscription_names(self.config.destination()))
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assignment::compute_assignment;
  use crate::config::{ConsumerProperties, ProducerProperties};
  use crate::error::Capability;
  use crate::message::Message;
  use crate::partitioning::{PartitionKey, partition_key_extractor};
  use crate::selector::partition_selector;
  use serde_json::{Value, json};

  fn binder(registry: StrategyRegistry<Value>) -> Binder<Value> {
    Binder::new(
      InstanceConfig::new(1, 3),
      TransportCapabilities::basic(),
      Arc::new(registry),
    )
  }

  fn producer_binding(f: impl FnOnce(&mut ProducerProperties)) -> BindingProperties {
    let mut producer = ProducerProperties {
      partition_count: Some(4),
      ..Default::default()
    };
    f(&mut producer);
    BindingProperties {
      producer: Some(producer),
      ..Default::default()
    }
  }

  #[test]
  fn test_invalid_key_expression() {
    let props = producer_binding(|p| p.partition_key_expression = Some("payload.".to_string()));
    let err = binder(StrategyRegistry::new()).bind("out", &props).unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::InvalidExpression {
        property: PARTITION_KEY_EXPRESSION,
        ..
      }
    ));
  }

  #[test]
  fn test_invalid_selector_expression() {
    let props = producer_binding(|p| {
      p.partition_key_expression = Some("headers.id".to_string());
      p.partition_selector_expression = Some("key[".to_string());
    });
    let err = binder(StrategyRegistry::new()).bind("out", &props).unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::InvalidExpression {
        property: PARTITION_SELECTOR_EXPRESSION,
        ..
      }
    ));
  }

  #[test]
  fn test_missing_named_extractor() {
    let props = producer_binding(|p| p.partition_key_extractor_name = Some("absent".to_string()));
    let err = binder(StrategyRegistry::new()).bind("out", &props).unwrap_err();
    match err {
      ConfigurationError::Strategy { binding, source } => {
        assert_eq!(binding, "out");
        assert_eq!(
          source,
          RegistryError::NotFound {
            capability: Capability::KeyExtractor,
            name: "absent".to_string(),
          }
        );
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_discovered_extractor_requires_registration() {
    let props = producer_binding(|p| p.partition_selector_name = Some("mod".to_string()));
    let err = binder(StrategyRegistry::new()).bind("out", &props).unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::Strategy {
        source: RegistryError::NoCandidate {
          capability: Capability::KeyExtractor
        },
        ..
      }
    ));
  }

  #[test]
  fn test_unspecified_selector_falls_back_to_hash() {
    let props = producer_binding(|p| p.partition_key_expression = Some("payload.id".to_string()));
    let binding = binder(StrategyRegistry::new()).bind("out", &props).unwrap();
    let partitioner = binding.output().unwrap();

    // "42".hashCode() == 1662
    let partition = partitioner
      .partition_of(&Message::new(json!({ "id": "42" })))
      .unwrap();
    assert_eq!(partition, 1662 % 4);
  }

  #[test]
  fn test_unspecified_selector_uses_single_registered() {
    let mut registry = StrategyRegistry::new();
    registry
      .register_partition_selector("last", partition_selector(|_, count| Ok(count - 1)))
      .unwrap();
    let props = producer_binding(|p| p.partition_key_expression = Some("payload.id".to_string()));
    let binding = binder(registry).bind("out", &props).unwrap();

    let partition = binding
      .output()
      .unwrap()
      .partition_of(&Message::new(json!({ "id": 7 })))
      .unwrap();
    assert_eq!(partition, 3);
  }

  #[test]
  fn test_unspecified_selector_ambiguous() {
    let mut registry = StrategyRegistry::new();
    registry
      .register_partition_selector("a", partition_selector(|_, _| Ok(0)))
      .unwrap();
    registry
      .register_partition_selector("b", partition_selector(|_, _| Ok(1)))
      .unwrap();
    let props = producer_binding(|p| p.partition_key_expression = Some("payload.id".to_string()));

    let err = binder(registry).bind("out", &props).unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::Strategy {
        source: RegistryError::Ambiguous { .. },
        ..
      }
    ));
  }

  #[test]
  fn test_named_strategies() {
    let mut registry = StrategyRegistry::new();
    registry
      .register_key_extractor(
        "tenant",
        partition_key_extractor(|m: &Message<Value>| {
          Ok(PartitionKey::from(m.payload()["tenant"].as_i64().unwrap_or(0)))
        }),
      )
      .unwrap();
    // an explicit selector expression wins over the registered selector
    registry
      .register_partition_selector("first", partition_selector(|_, _| Ok(0)))
      .unwrap();
    let props = producer_binding(|p| {
      p.partition_key_extractor_name = Some("tenant".to_string());
      p.partition_selector_expression = Some("key".to_string());
    });
    let binding = binder(registry).bind("out", &props).unwrap();

    let partition = binding
      .output()
      .unwrap()
      .partition_of(&Message::new(json!({ "tenant": 3 })))
      .unwrap();
    assert_eq!(partition, 3);
  }

  #[test]
  fn test_input_binding_subscriptions() {
    let props = BindingProperties {
      destination: Some("orders".to_string()),
      consumer: Some(ConsumerProperties {
        partitioned: true,
        partition_count: Some(7),
        ..Default::default()
      }),
      ..Default::default()
    };
    let binding = binder(StrategyRegistry::new()).bind("orders-in", &props).unwrap();

    assert!(binding.output().is_none());
    assert_eq!(
      binding.ownership(),
      Some(&PartitionOwnership::Assigned(compute_assignment(1, 3, 7)))
    );
    assert_eq!(binding.subscriptions(), vec!["orders-1", "orders-4"]);
  }

  #[test]
  fn test_transport_managed_input_has_no_subscriptions() {
    let binder = Binder::<Value>::new(
      InstanceConfig::new(0, 2),
      TransportCapabilities::native(),
      Arc::new(StrategyRegistry::new()),
    );
    let props = BindingProperties {
      consumer: Some(ConsumerProperties {
        partitioned: true,
        ..Default::default()
      }),
      ..Default::default()
    };
    let binding = binder.bind("in", &props).unwrap();

    assert_eq!(
      binding.ownership(),
      Some(&PartitionOwnership::TransportManaged {
        instance_index: 0,
        instance_count: 2,
      })
    );
    assert!(binding.subscriptions().is_empty());
  }

  #[test]
  fn test_bind_all_stops_at_first_error() {
    let config = ApplicationConfig::from_json_str(
      r#"{
        "instanceIndex": 0,
        "instanceCount": 2,
        "bindings": {
          "a-out": { "producer": { "partitionKeyExpression": "headers.id", "partitionCount": 2 } },
          "b-out": { "producer": { "partitionKeyExpression": "headers.id" } }
        }
      }"#,
    )
    .unwrap();
    let binder = Binder::<Value>::new(
      config.instance(),
      TransportCapabilities::basic(),
      Arc::new(StrategyRegistry::new()),
    );
    let err = binder.bind_all(&config).unwrap_err();
    assert!(matches!(
      err,
      ConfigurationError::MissingPartitionCount { ref binding } if binding == "b-out"
    ));
  }
}
