//! Test fixtures for odm-dispatch.
//!
//! Provides:
//! - A deterministic grid routing provider (0.01° of lat + lng = 1 minute)
//! - A fleet seed builder around a single square service zone
//! - Request builders

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use odm_dispatch::booking::BookingRequest;
use odm_dispatch::capacities::Capacities;
use odm_dispatch::error::RoutingError;
use odm_dispatch::model::{
    Address, CompanyId, Coordinates, DurationMs, HOUR, Location, MINUTE, UnixtimeMs, VehicleId,
};
use odm_dispatch::store::{
    AvailabilitySeed, CompanySeed, FleetSeed, TourSeed, VehicleSeed, ZoneSeed,
};
use odm_dispatch::traits::{Direction, RoutingProvider};

/// 2026-06-01T00:00:00Z
pub const DAY_START: UnixtimeMs = 1_780_272_000_000;

pub fn at(hours: i64, minutes: i64) -> UnixtimeMs {
    DAY_START + hours * HOUR + minutes * MINUTE
}

// ============================================================================
// Places (all inside the service zone unless noted)
// ============================================================================

pub const DEPOT: Coordinates = Coordinates { lat: 51.20, lng: 14.20 };
/// 10 minutes from the depot.
pub const START: Coordinates = Coordinates { lat: 51.25, lng: 14.25 };
/// 10 minutes from the start, 20 minutes from the depot.
pub const TARGET: Coordinates = Coordinates { lat: 51.30, lng: 14.30 };
/// 80 minutes from the start.
pub const FAR_TARGET: Coordinates = Coordinates { lat: 51.45, lng: 14.85 };
/// Just north of the zone, 27 minutes from the start.
pub const OUTSIDE: Coordinates = Coordinates { lat: 51.52, lng: 14.25 };

// ============================================================================
// Routing
// ============================================================================

/// Manhattan distance on raw degrees (simple, predictable).
///
/// Destinations listed in `unreachable` report `None`. Once `fail_from_call`
/// calls have been made every further call fails; once `truncate_from_call`
/// calls have been made every further answer is one duration short.
#[derive(Debug, Default)]
pub struct GridRouting {
    pub unreachable: Vec<Coordinates>,
    pub fail_from_call: Option<usize>,
    pub truncate_from_call: Option<usize>,
    calls: AtomicUsize,
}

impl GridRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreachable(mut self, point: Coordinates) -> Self {
        self.unreachable.push(point);
        self
    }

    pub fn failing_from_call(mut self, call: usize) -> Self {
        self.fail_from_call = Some(call);
        self
    }

    pub fn truncating_from_call(mut self, call: usize) -> Self {
        self.truncate_from_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn duration(from: Coordinates, to: Coordinates) -> DurationMs {
        let degrees = (from.lat - to.lat).abs() + (from.lng - to.lng).abs();
        (degrees * 100.0).round() as DurationMs * MINUTE
    }
}

#[async_trait]
impl RoutingProvider for GridRouting {
    async fn one_to_many(
        &self,
        origin: Coordinates,
        destinations: &[Coordinates],
        _direction: Direction,
    ) -> Result<Vec<Option<DurationMs>>, RoutingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_from_call.is_some_and(|n| call >= n) {
            return Err(RoutingError::Rejected("NoSegment".to_string()));
        }
        let mut durations: Vec<Option<DurationMs>> = destinations
            .iter()
            .map(|d| {
                if self.unreachable.contains(d) || self.unreachable.contains(&origin) {
                    None
                } else {
                    Some(Self::duration(origin, *d))
                }
            })
            .collect();
        if self.truncate_from_call.is_some_and(|n| call >= n) {
            durations.pop();
        }
        Ok(durations)
    }
}

// ============================================================================
// Fleet
// ============================================================================

/// Builder for a fleet inside one mandatory-service zone spanning
/// lat 51.0..51.5, lng 14.0..14.5.
#[derive(Debug, Clone)]
pub struct FleetBuilder {
    seed: FleetSeed,
}

impl Default for FleetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetBuilder {
    pub fn new() -> Self {
        Self {
            seed: FleetSeed {
                zones: vec![ZoneSeed {
                    id: 1,
                    name: "Test zone".to_string(),
                    community: false,
                    area: vec![
                        Coordinates::new(51.0, 14.0),
                        Coordinates::new(51.5, 14.0),
                        Coordinates::new(51.5, 14.5),
                        Coordinates::new(51.0, 14.5),
                    ],
                }],
                ..FleetSeed::default()
            },
        }
    }

    pub fn company(mut self, id: CompanyId, depot: Coordinates) -> Self {
        self.seed.companies.push(CompanySeed {
            id,
            name: format!("Taxi {id}"),
            zone: 1,
            depot,
        });
        self
    }

    /// A vehicle with four seats and nothing else.
    pub fn vehicle(self, id: VehicleId, company: CompanyId) -> Self {
        self.vehicle_with(id, company, Capacities::new(4, 0, 0, 0))
    }

    pub fn vehicle_with(mut self, id: VehicleId, company: CompanyId, capacities: Capacities) -> Self {
        self.seed.vehicles.push(VehicleSeed {
            id,
            company,
            capacities,
        });
        self
    }

    pub fn available(mut self, vehicle: VehicleId, start: UnixtimeMs, end: UnixtimeMs) -> Self {
        self.seed
            .availabilities
            .push(AvailabilitySeed { vehicle, start, end });
        self
    }

    pub fn tour(mut self, vehicle: VehicleId, departure: UnixtimeMs, arrival: UnixtimeMs) -> Self {
        self.seed.tours.push(TourSeed {
            vehicle,
            departure,
            arrival,
        });
        self
    }

    pub fn build(self) -> FleetSeed {
        self.seed
    }
}

/// One company at [`DEPOT`] with one four-seat vehicle available all day.
pub fn single_vehicle_fleet() -> FleetBuilder {
    FleetBuilder::new()
        .company(1, DEPOT)
        .vehicle(1, 1)
        .available(1, DAY_START, DAY_START + 24 * HOUR)
}

// ============================================================================
// Requests
// ============================================================================

pub fn address(street: &str) -> Address {
    Address {
        street: street.to_string(),
        house_number: "1".to_string(),
        postal_code: "02906".to_string(),
        city: "Niesky".to_string(),
    }
}

pub fn location(coordinates: Coordinates, street: &str) -> Location {
    Location {
        coordinates,
        address: address(street),
    }
}

/// One passenger leaving [`START`] for [`TARGET`] at 10:00.
pub fn booking_request() -> BookingRequest {
    BookingRequest {
        from: location(START, "Bahnhofstraße"),
        to: location(TARGET, "Marktplatz"),
        start_fixed: true,
        time_stamp: at(10, 0),
        num_passengers: 1,
        num_wheelchairs: 0,
        num_bikes: 0,
        luggage: 0,
        customer: Some(7),
    }
}
