//! Observer connections, key-pattern subscriptions, message dispatch, and
//! fan-out of store events.

pub mod connection;
pub mod event_bridge;
pub mod handler;
pub mod hub;
pub mod pattern;
pub mod session;
