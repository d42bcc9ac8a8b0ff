//! KDrive Core - Domain types, configuration and ports
//!
//! This crate holds everything the reconciliation engine and its adapters
//! agree on:
//! - **Domain** - `Filename`, `BucketName`, `SyncInfo`, `Inventory`, `SyncDiff`
//! - **Configuration** - YAML-backed [`config::Config`] with validation and a builder
//! - **Ports** - the [`ports::IObjectStore`] capability trait implemented by
//!   the storage adapters in `kdrive-store`
//!
//! # Architecture
//!
//! The domain module is pure and synchronous. Ports define the trait
//! boundary that adapter crates implement; the engine in `kdrive-sync`
//! only ever talks to a store through that trait.

pub mod config;
pub mod domain;
pub mod ports;
