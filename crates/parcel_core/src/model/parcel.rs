//! Parcel domain model.
//!
//! # Responsibility
//! - Define the shipment record persisted in the `parcel` table.
//! - Map status values to and from their stored text form.
//!
//! # Invariants
//! - `number` is assigned by the store and never reused.
//! - `client` and `created_at` do not change after creation.
//! - `address` may change, and the record may be deleted, only while
//!   `status == ParcelStatus::Registered`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Store-assigned parcel identifier.
pub type ParcelNumber = i64;

/// Identifier of the client owning a parcel.
pub type ClientId = i64;

/// Parcel lifecycle state.
///
/// Serialized and stored as lowercase text (`registered|sent|delivered`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    /// Initial state. The only state that allows address edits and deletion.
    Registered,
    /// Handed over for shipping.
    Sent,
    /// Received by the client.
    Delivered,
}

impl ParcelStatus {
    /// Stable text value used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
        }
    }

    /// Parses a stored status value. Returns `None` for unknown text.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registered" => Some(Self::Registered),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }

    /// Next state in the forward-only delivery flow.
    ///
    /// Returns `None` for `Delivered`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Registered => Some(Self::Sent),
            Self::Sent => Some(Self::Delivered),
            Self::Delivered => None,
        }
    }
}

impl Display for ParcelStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shipment record tracked through registration, dispatch and delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    /// Assigned by the store on insert; ignored by `add`.
    pub number: ParcelNumber,
    pub client: ClientId,
    pub status: ParcelStatus,
    /// Free-form delivery address.
    pub address: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl Parcel {
    /// Creates an unsaved parcel in `registered` state.
    ///
    /// `number` is left at `0` until the store assigns one.
    pub fn new(
        client: ClientId,
        address: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            number: 0,
            client,
            status: ParcelStatus::Registered,
            address: address.into(),
            created_at: created_at.into(),
        }
    }
}
