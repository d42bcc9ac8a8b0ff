//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the engine depends on and adapter crates implement.
//!
//! - [`IObjectStore`] - list/get/put against a remote bucket

pub mod object_store;

pub use object_store::{IObjectStore, RemoteObject, StoreError};
