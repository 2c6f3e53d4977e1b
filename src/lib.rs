//! # StreamWeave Partition
//!
//! Deterministic message partitioning and partition assignment for streamweave
//! bindings.
//!
//! Outbound, every message of a partitioned binding gets a partition index in
//! `[0, partitionCount)`: a key is extracted from the message, a selector maps
//! the key to an index, and the index travels with the message as routing
//! metadata. Messages with equal keys always land on the same partition, across
//! threads, processes and restarts.
//!
//! Inbound, each application instance works out which partitions it consumes
//! from nothing but its own instance index and count. Together the instances
//! cover every partition exactly once.
//!
//! ## Key Features
//!
//! - **Stable hashing**: key hashes are process-independent, so producers on
//!   different hosts agree on routing
//! - **Pluggable strategies**: expressions, named registered strategies or plain closures
//! - **Validated configuration**: bindings are checked once, at creation
//! - **Coordination-free assignment**: `partition % instanceCount`
//!
//! ## Quick Start
//!
//! ```rust
//! use streamweave_partition::assignment::compute_assignment;
//!
//! let mine = compute_assignment(1, 3, 7);
//! assert_eq!(mine.subscription_names("orders"), vec!["orders-1", "orders-4"]);
//! ```
//!
//! See [`binder`] for wiring whole bindings from configuration.

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Error types for configuration, key extraction and partition selection.
pub mod error;
/// Message envelope carrying payload, headers and routing metadata.
pub mod message;
/// Partition keys and key extractors.
pub mod partitioning;
/// Expression language used by key and selector expressions.
pub mod expression;
/// Partition selectors mapping keys to partition indices.
pub mod selector;
/// Registry of named key extractors and selectors.
pub mod registry;
/// Configuration properties of bindings and the application instance.
pub mod config;
/// Validated partitioning configuration of one binding.
pub mod binding_config;
/// Outbound partitioner.
pub mod output;
/// Inbound partition assignment.
pub mod assignment;
/// Creates bindings from configuration.
pub mod binder;
