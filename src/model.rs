//! Fleet and booking records.
//!
//! These are plain aggregates handed out by a [`FleetRepository`]; all
//! feasibility reasoning happens in-process against them.
//!
//! [`FleetRepository`]: crate::traits::FleetRepository

use serde::{Deserialize, Serialize};

use crate::capacities::Capacities;
use crate::interval::Interval;

/// Milliseconds since the unix epoch.
pub type UnixtimeMs = i64;
/// A span of time in milliseconds.
pub type DurationMs = i64;

pub const MINUTE: DurationMs = 60 * 1000;
pub const HOUR: DurationMs = 60 * MINUTE;
pub const DAY: DurationMs = 24 * HOUR;

pub type ZoneId = i64;
pub type CompanyId = i64;
pub type VehicleId = i64;
pub type TourId = i64;
pub type RequestId = i64;
pub type EventId = i64;
pub type AddressId = i64;
pub type CustomerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub house_number: String,
    pub postal_code: String,
    pub city: String,
}

/// A place as entered by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinates: Coordinates,
    #[serde(default)]
    pub address: Address,
}

/// The public face of a company, returned to customers on booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub id: CompanyId,
    pub name: String,
    /// The taxi central every tour starts from and returns to.
    pub depot: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tour {
    pub id: TourId,
    pub vehicle: VehicleId,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub company: CompanyId,
    pub capacities: Capacities,
    /// On-duty windows as stored, possibly overlapping.
    pub availabilities: Vec<Interval>,
    pub tours: Vec<Tour>,
}

impl Vehicle {
    pub fn merged_availabilities(&self) -> Vec<Interval> {
        Interval::merge(self.availabilities.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub summary: CompanySummary,
    pub vehicles: Vec<Vehicle>,
}

impl Company {
    pub fn id(&self) -> CompanyId {
        self.summary.id
    }

    pub fn depot(&self) -> Coordinates {
        self.summary.depot
    }
}

/// Raw result of the booking pre-filter: one vehicle whose zone, capacity and
/// availability match, with its availabilities as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleAvailability {
    pub vehicle: VehicleId,
    pub company: CompanySummary,
    pub availabilities: Vec<Interval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusStop {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub times: Vec<UnixtimeMs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTour {
    pub vehicle: VehicleId,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub tour: TourId,
    pub customer: Option<CustomerId>,
    pub capacities: Capacities,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub tour: TourId,
    pub request: RequestId,
    pub is_pickup: bool,
    pub coordinates: Coordinates,
    pub scheduled_time: UnixtimeMs,
    pub address: AddressId,
    pub customer: Option<CustomerId>,
}
