//! Core data types for the gateway.
//!
//! These mirror what the remote object store exposes about stored files,
//! plus the transient usage statistics computed per listing request.

pub mod object;
pub mod usage;
