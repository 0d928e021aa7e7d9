//! JSON RPC: wire types, error codes, handler context, method registry, and
//! the method handlers themselves.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;
