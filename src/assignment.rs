//! Inbound partition assignment.
//!
//! When the transport cannot distribute partitions among consumers itself, each
//! instance works out its own share with [`compute_assignment`]: partition `p`
//! belongs to instance `p % instance_count`. Instances never talk to each other,
//! yet for `partition_count >= instance_count >= 1`:
//!
//! - every partition is owned by some instance (coverage)
//! - no partition is owned by two instances (exclusivity)
//!
//! [`PartitionOwnership`] is what an input binding hands to its transport
//! adapter: no partitioning, a transport-managed hint, or a computed assignment.

use crate::binding_config::{InputPartitionConfig, InputPartitionMode};
use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fmt::{self, Display, Formatter};
use tracing::{info, warn};

/// Partitions owned by `instance_index` out of `instance_count` instances.
///
/// Pure and total. With more instances than partitions some instances get an
/// empty assignment. The assignment is also empty when `instance_count == 0`
/// or `instance_index >= instance_count`, since no partition has that residue.
#[must_use]
pub fn compute_assignment(
  instance_index: u32,
  instance_count: u32,
  partition_count: u32,
) -> PartitionAssignment {
  if instance_count == 0 || instance_index >= instance_count {
    return PartitionAssignment::default();
  }
  (instance_index..partition_count)
    .step_by(instance_count as usize)
    .collect()
}

/// Immutable set of partition indices owned by one input binding.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PartitionAssignment {
  partitions: BTreeSet<u32>,
}

impl PartitionAssignment {
  /// The owned partitions, ascending.
  #[must_use]
  pub fn partitions(&self) -> &BTreeSet<u32> {
    &self.partitions
  }

  /// Whether `partition` is owned.
  #[must_use]
  pub fn owns(&self, partition: u32) -> bool {
    self.partitions.contains(&partition)
  }

  /// Number of owned partitions.
  #[must_use]
  pub fn len(&self) -> usize {
    self.partitions.len()
  }

  /// Whether nothing is owned.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.partitions.is_empty()
  }

  /// Iterates the owned partitions, ascending.
  pub fn iter(&self) -> btree_set::Iter<'_, u32> {
    self.partitions.iter()
  }

  /// Names of the per-partition sub-resources to subscribe to, as
  /// `{destination}-{partition}`.
  #[must_use]
  pub fn subscription_names(&self, destination: &str) -> Vec<String> {
    self
      .partitions
      .iter()
      .map(|p| format!("{}-{}", destination, p))
      .collect()
  }
}

impl FromIterator<u32> for PartitionAssignment {
  fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
    Self {
      partitions: iter.into_iter().collect(),
    }
  }
}

impl<'a> IntoIterator for &'a PartitionAssignment {
  type Item = &'a u32;
  type IntoIter = btree_set::Iter<'a, u32>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

impl Display for PartitionAssignment {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, p) in self.partitions.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", p)?;
    }
    write!(f, "}}")
  }
}

/// What an input binding consumes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PartitionOwnership {
  /// The whole destination.
  Unpartitioned,
  /// Whatever the transport assigns. The instance position is passed through
  /// as a hint and no assignment is computed.
  TransportManaged {
    /// Instance index hint.
    instance_index: u32,
    /// Instance count hint.
    instance_count: u32,
  },
  /// Exactly these partitions.
  Assigned(PartitionAssignment),
}

impl PartitionOwnership {
  /// Resolves ownership for a validated input config.
  ///
  /// For a computed mode this is the union of the assignments of every
  /// instance slot the binding owns.
  #[must_use]
  pub fn resolve(binding: &str, config: &InputPartitionConfig) -> Self {
    match config.mode() {
      InputPartitionMode::Unpartitioned => PartitionOwnership::Unpartitioned,
      InputPartitionMode::TransportManaged {
        instance_index,
        instance_count,
      } => {
        info!(
          binding,
          instance_index, instance_count, "partition assignment left to the transport"
        );
        PartitionOwnership::TransportManaged {
          instance_index: *instance_index,
          instance_count: *instance_count,
        }
      }
      InputPartitionMode::Computed {
        instance_indexes,
        instance_count,
        partition_count,
      } => {
        if instance_indexes.len() > 1 {
          warn!(
            binding,
            slots = ?instance_indexes,
            "binding owns several instance slots; other instances must not claim them"
          );
        }
        let assignment: PartitionAssignment = instance_indexes
          .iter()
          .flat_map(|index| {
            compute_assignment(*index, *instance_count, *partition_count).partitions
          })
          .collect();
        info!(
          binding,
          instance_count,
          partition_count,
          partitions = %assignment,
          "computed partition assignment"
        );
        PartitionOwnership::Assigned(assignment)
      }
    }
  }

  /// The computed assignment, if this process computed one.
  #[must_use]
  pub fn assignment(&self) -> Option<&PartitionAssignment> {
    match self {
      PartitionOwnership::Assigned(assignment) => Some(assignment),
      _ => None,
    }
  }
}
