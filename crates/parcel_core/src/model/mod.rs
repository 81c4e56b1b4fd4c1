//! Parcel domain model.
//!
//! # Responsibility
//! - Define the canonical parcel record and its status values.
//!
//! # Invariants
//! - Every parcel is identified by a store-assigned `ParcelNumber`.
//! - Address edits and deletion are allowed only while `registered`.

pub mod parcel;
