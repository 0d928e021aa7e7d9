//! # lens-auth
//!
//! Session lifecycle for statelens.
//!
//! - **Issuance**: [`SessionManager::create_session`] mints an opaque bearer
//!   token bound to a [`Role`](lens_core::Role) and an expiry
//! - **Validation**: tokens are looked up by SHA-256 digest; expired sessions
//!   are purged on lookup and by [`SessionManager::sweep_expired`]
//! - **Authorization**: `viewer < editor < admin`
//! - **Lifecycle hooks**: [`SessionManager::subscribe`] streams
//!   [`SessionLifecycle`] events
//!
//! The manager holds no I/O and no globals; construct one at startup and share
//! it behind an `Arc`.

#![deny(unsafe_code)]

pub mod errors;
pub mod manager;
pub mod session;
pub mod token;

pub use errors::{AuthError, Result};
pub use manager::{SessionConfig, SessionManager};
pub use session::{IssuedSession, Session, SessionLifecycle};
