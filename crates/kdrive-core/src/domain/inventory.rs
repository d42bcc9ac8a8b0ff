//! Inventories and the set differencer
//!
//! An [`Inventory`] is the set of filenames visible on one side at the
//! moment it was listed. Inventories are recomputed for every comparison
//! and never updated incrementally. [`diff`] is the only set operation the
//! engine needs; [`SyncDiff`] applies it in both directions.

use std::collections::HashSet;

use super::newtypes::Filename;

/// The set of filenames currently visible on one side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    names: HashSet<Filename>,
}

impl Inventory {
    /// Creates an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filename, returning false if it was already present
    pub fn insert(&mut self, name: Filename) -> bool {
        self.names.insert(name)
    }

    /// Returns true if the filename is present
    pub fn contains(&self, name: &Filename) -> bool {
        self.names.contains(name)
    }

    /// Number of filenames in the inventory
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no filenames are present
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates over the filenames in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Filename> {
        self.names.iter()
    }
}

impl FromIterator<Filename> for Inventory {
    fn from_iter<I: IntoIterator<Item = Filename>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Inventory {
    type Item = Filename;
    type IntoIter = std::collections::hash_set::IntoIter<Filename>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.into_iter()
    }
}

/// Asymmetric set difference: every name in `a` that is not in `b`
///
/// The result has no defined order. The function knows nothing about
/// which side each inventory describes.
pub fn diff(a: &Inventory, b: &Inventory) -> Vec<Filename> {
    a.names
        .iter()
        .filter(|name| !b.contains(name))
        .cloned()
        .collect()
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    /// Present in the bucket, absent from the working directory (download candidates)
    pub missing_locally: Vec<Filename>,
    /// Present in the working directory, absent from the bucket (upload candidates)
    pub missing_in_cloud: Vec<Filename>,
}

impl SyncDiff {
    /// Computes both directions of the difference
    pub fn between(local: &Inventory, remote: &Inventory) -> Self {
        Self {
            missing_locally: diff(remote, local),
            missing_in_cloud: diff(local, remote),
        }
    }

    /// Returns true when neither side is missing anything
    pub fn is_converged(&self) -> bool {
        self.missing_locally.is_empty() && self.missing_in_cloud.is_empty()
    }
}
