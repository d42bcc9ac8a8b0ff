//! Domain types and business rules
//!
//! - Newtypes for validated names (`Filename`, `BucketName`)
//! - Sync status records emitted by the engine (`SyncInfo`)
//! - Inventories and the set differencer (`Inventory`, `SyncDiff`)
//! - Domain-specific error types

pub mod errors;
pub mod inventory;
pub mod newtypes;
pub mod sync_info;

pub use errors::DomainError;
pub use inventory::{diff, Inventory, SyncDiff};
pub use newtypes::{BucketName, Filename};
pub use sync_info::{FileLocation, SyncInfo, SyncStatus};
