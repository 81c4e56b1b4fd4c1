//! Repository layer for parcel persistence.
//!
//! # Responsibility
//! - Define the parcel data access contract.
//! - Keep SQL details out of the service layer.
//!
//! # Invariants
//! - Status-gated writes are single statements.
//! - `get` reports a semantic `NotFound` distinct from storage failures.

pub mod parcel_repo;
