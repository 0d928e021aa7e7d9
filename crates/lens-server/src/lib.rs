//! # lens-server
//!
//! Axum HTTP + `WebSocket` gateway for statelens.
//!
//! - `POST /rpc`: JSON RPC over HTTP, bearer token per request
//! - `GET /ws`: observer connections with key-pattern subscriptions
//! - Broadcast hub with bounded per-connection queues (drop-oldest, then
//!   `resync_required`)
//! - Event bridge from the store registry to the hub
//! - Background sweeps for session expiry and law compliance
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod compliance;
pub mod config;
pub mod health;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod tasks;
pub mod websocket;
