//! Parcel use-case service.
//!
//! # Responsibility
//! - Provide registration, listing and lifecycle entry points for callers.
//! - Enforce the forward-only delivery flow `registered -> sent -> delivered`.
//! - Report suppressed address edits and deletions as explicit errors.
//!
//! # Invariants
//! - Status transitions are compare-and-set statements guarded on the
//!   status the service observed.
//! - Address text is never written to logs.

use crate::model::parcel::{ClientId, Parcel, ParcelNumber, ParcelStatus};
use crate::repo::parcel_repo::{ParcelRepository, RepoError};
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ParcelServiceError>;

/// Service error for parcel use-cases.
#[derive(Debug)]
pub enum ParcelServiceError {
    /// Address is empty after trimming.
    InvalidAddress,
    /// Target parcel does not exist.
    ParcelNotFound(ParcelNumber),
    /// Address edit or deletion attempted outside `registered`.
    NotRegistered {
        number: ParcelNumber,
        status: ParcelStatus,
    },
    /// Parcel is already `delivered`.
    TerminalStatus {
        number: ParcelNumber,
        status: ParcelStatus,
    },
    /// Status changed concurrently; the parcel was no longer in `expected`.
    TransitionRejected {
        number: ParcelNumber,
        expected: ParcelStatus,
    },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ParcelServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress => write!(f, "address cannot be empty"),
            Self::ParcelNotFound(number) => write!(f, "parcel not found: {number}"),
            Self::NotRegistered { number, status } => {
                write!(f, "parcel {number} is `{status}`, expected `registered`")
            }
            Self::TerminalStatus { number, status } => {
                write!(f, "parcel {number} is `{status}` and cannot advance")
            }
            Self::TransitionRejected { number, expected } => write!(
                f,
                "parcel {number} is no longer `{expected}`; status changed concurrently"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ParcelServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ParcelServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(number) => Self::ParcelNotFound(number),
            RepoError::PreconditionFailed { number, status } => {
                Self::NotRegistered { number, status }
            }
            other => Self::Repo(other),
        }
    }
}

/// Use-case service wrapper over a parcel repository.
pub struct ParcelService<R: ParcelRepository> {
    repo: R,
}

impl<R: ParcelRepository> ParcelService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Registers a new parcel for `client`, stamped with the current UTC time.
    pub fn register(&self, client: ClientId, address: &str) -> ServiceResult<Parcel> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.register_at(client, address, created_at)
    }

    /// Registers a new parcel with a caller-provided RFC3339 timestamp.
    ///
    /// # Contract
    /// - Status starts as `registered`.
    /// - Returns the stored parcel with its assigned number.
    pub fn register_at(
        &self,
        client: ClientId,
        address: &str,
        created_at: impl Into<String>,
    ) -> ServiceResult<Parcel> {
        let address = normalize_address(address)?;
        let mut parcel = Parcel::new(client, address, created_at);
        parcel.number = self.repo.add(&parcel)?;

        info!(
            "event=parcel_register module=service status=ok number={} client={}",
            parcel.number, parcel.client
        );
        Ok(parcel)
    }

    /// Gets one parcel by number.
    pub fn get(&self, number: ParcelNumber) -> ServiceResult<Parcel> {
        Ok(self.repo.get(number)?)
    }

    /// Lists all parcels of `client`. Empty when the client has none.
    pub fn client_parcels(&self, client: ClientId) -> ServiceResult<Vec<Parcel>> {
        Ok(self.repo.get_by_client(client)?)
    }

    /// Advances the parcel one step along `registered -> sent -> delivered`.
    ///
    /// Returns the new status.
    pub fn next_status(&self, number: ParcelNumber) -> ServiceResult<ParcelStatus> {
        let current = self.repo.get(number)?.status;
        let Some(next) = current.next() else {
            return Err(ParcelServiceError::TerminalStatus {
                number,
                status: current,
            });
        };

        if !self.repo.advance_status(number, current, next)? {
            warn!(
                "event=parcel_status module=service status=rejected number={number} from={current} to={next}"
            );
            return Err(ParcelServiceError::TransitionRejected {
                number,
                expected: current,
            });
        }

        info!(
            "event=parcel_status module=service status=ok number={number} from={current} to={next}"
        );
        Ok(next)
    }

    /// Replaces the address of a `registered` parcel.
    pub fn change_address(&self, number: ParcelNumber, address: &str) -> ServiceResult<()> {
        let address = normalize_address(address)?;
        if let Err(err) = self.repo.set_address_checked(number, address) {
            warn!("event=parcel_address module=service status=error number={number} error={err}");
            return Err(err.into());
        }

        info!("event=parcel_address module=service status=ok number={number}");
        Ok(())
    }

    /// Deletes a `registered` parcel.
    pub fn delete(&self, number: ParcelNumber) -> ServiceResult<()> {
        if let Err(err) = self.repo.delete_checked(number) {
            warn!("event=parcel_delete module=service status=error number={number} error={err}");
            return Err(err.into());
        }

        info!("event=parcel_delete module=service status=ok number={number}");
        Ok(())
    }
}

fn normalize_address(address: &str) -> ServiceResult<&str> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ParcelServiceError::InvalidAddress);
    }
    Ok(trimmed)
}
