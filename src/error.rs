//! # Error Types
//!
//! Errors raised by the partitioning layer fall into two families:
//!
//! - **Startup errors** ([`ConfigurationError`]): raised while a binding is being
//!   created. They abort binding creation and are never retried. Every variant
//!   names the binding and the offending property so the operator can fix the
//!   configuration.
//! - **Per-message errors** ([`KeyExtractionError`], [`PartitionSelectionError`],
//!   wrapped by [`PartitionError`]): raised while partitioning one outbound
//!   message. They fail that send only. No fallback partition is ever
//!   substituted, since misrouting breaks consumer-side ownership.
//!
//! [`ExpressionError`] and [`RegistryError`] come from the expression and
//! named-strategy collaborators and are wrapped into the families above.

use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// The kind of pluggable strategy a registry name resolves to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Capability {
  /// A [`PartitionKeyExtractor`](crate::partitioning::PartitionKeyExtractor).
  KeyExtractor,
  /// A [`PartitionSelector`](crate::selector::PartitionSelector).
  PartitionSelector,
}

impl Display for Capability {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Capability::KeyExtractor => write!(f, "partition key extractor"),
      Capability::PartitionSelector => write!(f, "partition selector"),
    }
  }
}

/// Error raised while compiling or evaluating an expression.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExpressionError {
  /// The expression text could not be parsed.
  #[error("syntax error in `{expression}` at offset {offset}: {reason}")]
  Syntax {
    /// The expression source.
    expression: String,
    /// Byte offset where parsing stopped.
    offset: usize,
    /// What the parser expected.
    reason: String,
  },
  /// The expression parsed but could not be evaluated against its context.
  #[error("cannot evaluate `{expression}`: {reason}")]
  Evaluation {
    /// The expression source.
    expression: String,
    /// Why evaluation failed.
    reason: String,
  },
}

/// Error raised by the named-strategy registry.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RegistryError {
  /// A strategy was requested by name and no such name is registered.
  #[error("no {capability} named `{name}` is registered")]
  NotFound {
    /// The requested capability.
    capability: Capability,
    /// The requested name.
    name: String,
  },
  /// No name was given and several strategies are registered.
  #[error("{capability} is ambiguous, candidates: {}", candidates.join(", "))]
  Ambiguous {
    /// The requested capability.
    capability: Capability,
    /// Registered names, sorted.
    candidates: Vec<String>,
  },
  /// No name was given and no strategy is registered.
  #[error("no {capability} is registered")]
  NoCandidate {
    /// The requested capability.
    capability: Capability,
  },
  /// A name was registered twice for the same capability.
  #[error("{capability} `{name}` is already registered")]
  Duplicate {
    /// The capability being registered.
    capability: Capability,
    /// The duplicated name.
    name: String,
  },
}

/// Startup-time error. Fatal to the binding being created.
#[derive(Debug, Error)]
pub enum ConfigurationError {
  /// Two mutually exclusive properties are both set.
  #[error("binding `{binding}`: `{first}` and `{second}` are mutually exclusive")]
  ConflictingProperties {
    /// Binding name.
    binding: String,
    /// First property of the pair.
    first: &'static str,
    /// Second property of the pair.
    second: &'static str,
  },
  /// Partitioning is configured but `partitionCount` is absent.
  #[error("binding `{binding}`: `partitionCount` must be set when partitioning is configured")]
  MissingPartitionCount {
    /// Binding name.
    binding: String,
  },
  /// A count property is zero.
  #[error("binding `{binding}`: `{property}` must be >= 1")]
  ZeroCount {
    /// Binding name.
    binding: String,
    /// The offending property.
    property: &'static str,
  },
  /// The instance index is outside `[0, instanceCount)`.
  #[error("binding `{binding}`: instance index {index} is outside [0, {count})")]
  InstanceIndexOutOfRange {
    /// Binding name.
    binding: String,
    /// The offending index.
    index: u32,
    /// The effective instance count.
    count: u32,
  },
  /// Fewer partitions than instances on a partitioned input binding.
  #[error(
    "binding `{binding}`: partitionCount {partition_count} is smaller than instanceCount {instance_count}"
  )]
  InsufficientPartitions {
    /// Binding name.
    binding: String,
    /// The configured partition count.
    partition_count: u32,
    /// The effective instance count.
    instance_count: u32,
  },
  /// An expression property did not compile.
  #[error("binding `{binding}`: invalid `{property}`: {source}")]
  InvalidExpression {
    /// Binding name.
    binding: String,
    /// The offending property.
    property: &'static str,
    /// The compile error.
    #[source]
    source: ExpressionError,
  },
  /// A named strategy could not be resolved.
  #[error("binding `{binding}`: {source}")]
  Strategy {
    /// Binding name.
    binding: String,
    /// The registry failure.
    #[source]
    source: RegistryError,
  },
  /// The configuration document is not valid JSON for the expected shape.
  #[error("malformed configuration: {0}")]
  Malformed(#[from] serde_json::Error),
  /// The configuration file could not be read.
  #[error("cannot read configuration file `{path}`: {source}")]
  Io {
    /// The file path.
    path: String,
    /// The underlying I/O error.
    #[source]
    source: std::io::Error,
  },
}

/// Per-message error raised while deriving a partition key.
#[derive(Debug, Error)]
pub enum KeyExtractionError {
  /// The key expression failed to evaluate.
  #[error("key expression `{expression}` failed: {source}")]
  Expression {
    /// The expression source.
    expression: String,
    /// The evaluation error.
    #[source]
    source: ExpressionError,
  },
  /// The key expression produced a value that cannot be a partition key.
  #[error("key expression `{expression}` produced {found}, which cannot be used as a partition key")]
  IncompatibleType {
    /// The expression source.
    expression: String,
    /// JSON type name of the produced value.
    found: &'static str,
  },
  /// The payload could not be viewed as JSON for expression evaluation.
  #[error("payload is not visible to the key expression: {0}")]
  Payload(#[source] serde_json::Error),
  /// A user-supplied extractor failed.
  #[error("{0}")]
  Strategy(String),
}

/// Per-message error raised while mapping a key to a partition index.
#[derive(Debug, Error)]
pub enum PartitionSelectionError {
  /// The selector produced an index outside `[0, partition_count)`.
  #[error("selector returned partition {index}, outside [0, {partition_count})")]
  OutOfRange {
    /// The rejected index.
    index: i64,
    /// The binding's partition count.
    partition_count: u32,
  },
  /// The selector expression failed to evaluate.
  #[error("selector expression `{expression}` failed: {source}")]
  Expression {
    /// The expression source.
    expression: String,
    /// The evaluation error.
    #[source]
    source: ExpressionError,
  },
  /// The selector expression produced a non-integer value.
  #[error("selector expression `{expression}` produced {found}, expected an integer partition index")]
  IncompatibleType {
    /// The expression source.
    expression: String,
    /// JSON type name of the produced value.
    found: &'static str,
  },
  /// A user-supplied selector failed.
  #[error("{0}")]
  Strategy(String),
}

/// Error returned to the sender when one outbound message cannot be partitioned.
#[derive(Debug, Error)]
pub enum PartitionError {
  /// The key could not be extracted.
  #[error("binding `{binding}`: partition key extraction failed: {source}")]
  KeyExtraction {
    /// Binding name.
    binding: String,
    /// The extraction error.
    #[source]
    source: KeyExtractionError,
  },
  /// The key could not be mapped to a partition.
  #[error("binding `{binding}`: partition selection failed: {source}")]
  Selection {
    /// Binding name.
    binding: String,
    /// The selection error.
    #[source]
    source: PartitionSelectionError,
  },
}
