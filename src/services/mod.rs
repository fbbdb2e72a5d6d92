//! Service layer: the object-store seam, persisted bookkeeping, quota
//! accounting, size formatting, and the request orchestrator.

pub mod gateway;
pub mod object_store;
pub mod persist;
pub mod quota;
pub mod size_format;

#[cfg(test)]
pub mod mock_store;
