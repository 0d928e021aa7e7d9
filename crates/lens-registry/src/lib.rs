//! # lens-registry
//!
//! The store registry: named, versioned state containers with bounded
//! history.
//!
//! - **Per-key serialization**: each store sits behind its own mutex, so
//!   changes to one key linearize while different keys never contend
//! - **Versioning**: every accepted change bumps the version by exactly one
//! - **History**: a bounded FIFO of past values for audit and revert
//! - **Events**: [`StoreEvent`]s on a broadcast channel, emitted under the
//!   key lock so per-key event order equals version order
//!
//! Writes are authorized against a [`Session`](lens_auth::Session): viewers
//! may read, editors may write.

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod types;

pub use errors::{RegistryError, Result};
pub use registry::{RegistryConfig, StoreRegistry};
pub use types::{ChangeReceipt, HistoryEntry, RegisterMode, StoreEvent, StoreSnapshot};
