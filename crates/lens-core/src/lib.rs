//! # lens-core
//!
//! Foundation types shared by every statelens crate:
//!
//! - **Branded IDs**: `SessionId`, `ConnectionId` as newtypes for type safety
//! - **Roles**: the `viewer < editor < admin` privilege ladder
//! - **Time**: RFC 3339 timestamp helpers
//! - **Logging**: `tracing` subscriber installation

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod role;
pub mod time;

pub use ids::{ConnectionId, SessionId};
pub use role::{ParseRoleError, Role};
