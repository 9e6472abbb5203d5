//! Collaborator seams.
//!
//! The dispatcher reasons about time and capacity in-process. Travel times
//! and persistence come from outside through these traits; concrete apps
//! implement them for their routing engine and database.

use async_trait::async_trait;

use crate::capacities::Capacities;
use crate::error::{RoutingError, StoreError};
use crate::interval::Interval;
use crate::model::{
    Address, AddressId, Company, Coordinates, DurationMs, NewEvent, NewRequest, NewTour,
    RequestId, TourId, VehicleAvailability, VehicleId,
};

/// Which way a one-to-many query is travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the single origin to each destination.
    Forward,
    /// From each destination to the single origin.
    Backward,
}

/// Provides travel durations between a point and many others.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// One entry per destination, in input order. `None` marks a destination
    /// that cannot be reached.
    async fn one_to_many(
        &self,
        origin: Coordinates,
        destinations: &[Coordinates],
        direction: Direction,
    ) -> Result<Vec<Option<DurationMs>>, RoutingError>;
}

/// Read access to the fleet plus the exclusive commit section.
#[async_trait]
pub trait FleetRepository: Send + Sync {
    /// Vehicles of companies whose mandatory-service zone covers both points,
    /// whose capacities dominate `required`, with every stored availability
    /// touching `window`. Vehicles without such availability are omitted.
    async fn booking_candidates(
        &self,
        from: Coordinates,
        to: Coordinates,
        required: &Capacities,
        window: Interval,
    ) -> Result<Vec<VehicleAvailability>, StoreError>;

    /// Whether some mandatory-service zone covers both points.
    async fn zone_covers(&self, from: Coordinates, to: Coordinates) -> Result<bool, StoreError>;

    /// Companies whose zone covers every point in `points`, with the vehicles
    /// that can carry `required`. Availabilities and tours are restricted to
    /// those touching `window`.
    async fn companies_covering(
        &self,
        points: &[Coordinates],
        required: &Capacities,
        window: Interval,
    ) -> Result<Vec<Company>, StoreError>;

    /// Opens the commit section. Only one transaction is open at a time; it
    /// is rolled back when dropped without [`FleetTransaction::commit`].
    async fn begin_exclusive<'a>(&'a self) -> Result<Box<dyn FleetTransaction + 'a>, StoreError>;
}

/// Writes performed while holding the exclusive commit lock.
#[async_trait]
pub trait FleetTransaction: Send {
    /// The subset of `candidates` whose vehicle has no tour overlapping the
    /// paired interval.
    async fn vehicles_without_overlap(
        &mut self,
        candidates: &[(VehicleId, Interval)],
    ) -> Result<Vec<VehicleId>, StoreError>;

    /// Returns the id of an identical stored address, inserting it if absent.
    async fn upsert_address(&mut self, address: &Address) -> Result<AddressId, StoreError>;

    async fn insert_tour(&mut self, tour: NewTour) -> Result<TourId, StoreError>;

    async fn insert_request(&mut self, request: NewRequest) -> Result<RequestId, StoreError>;

    async fn insert_events(&mut self, events: Vec<NewEvent>) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
