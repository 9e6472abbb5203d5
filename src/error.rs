//! Error types shared across the dispatcher.

use crate::model::{CompanyId, UnixtimeMs, VehicleId};

/// Failure of the routing collaborator. Always safe to retry.
#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("routing service answered with code {0}")]
    Rejected(String),
    #[error("routing service returned {got} durations for {expected} destinations")]
    Malformed { expected: usize, got: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unknown vehicle {0}")]
    UnknownVehicle(VehicleId),
    #[error("unknown company {0}")]
    UnknownCompany(CompanyId),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// The stage of a booking at which routing was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStage {
    /// Start to target.
    Direct,
    /// Depots to start and target to depots.
    Depot,
}

/// A booking that could not be evaluated. Business rejections are reported
/// through [`crate::booking::Rejection`] instead.
#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    #[error("routing failed during {stage:?} stage: {source}")]
    Routing {
        stage: RoutingStage,
        #[source]
        source: RoutingError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("booking invariant violated: {0}")]
    Invariant(String),
    #[error("time stamp {0} is out of range")]
    TimeOutOfRange(UnixtimeMs),
}

impl BookingError {
    /// Numeric status reported to API callers.
    pub fn status(&self) -> u8 {
        match self {
            BookingError::Routing { .. } => 8,
            BookingError::Store(_) | BookingError::Invariant(_) => 11,
            BookingError::TimeOutOfRange(_) => 12,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WhitelistError {
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
