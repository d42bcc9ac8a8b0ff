//! Integration tests for kdrive-sync
//!
//! Run the whole engine against an in-memory bucket and a temporary working
//! directory. Change notifications come either from a scripted notifier the
//! test feeds by hand or from the real `notify`-backed watcher.

mod common;

mod test_lifecycle;
mod test_sync_flow;
mod test_transfer_failures;
