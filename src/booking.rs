//! Direct-ride booking.
//!
//! A booking passes a series of gates. Everything up to the commit section
//! works on unlocked reads; the commit section re-checks tour overlaps under
//! the store's exclusive lock before writing the tour, its request and both
//! events in one transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::capacities::Capacities;
use crate::config::DispatchConfig;
use crate::error::{BookingError, RoutingError, RoutingStage};
use crate::interval::Interval;
use crate::model::{
    CompanyId, CompanySummary, Coordinates, CustomerId, DurationMs, Location, NewEvent, NewRequest,
    NewTour, RequestId, TourId, UnixtimeMs, VehicleId,
};
use crate::traits::{Direction, FleetRepository, RoutingProvider};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub from: Location,
    pub to: Location,
    /// `time_stamp` is the departure when set, the arrival otherwise.
    pub start_fixed: bool,
    pub time_stamp: UnixtimeMs,
    pub num_passengers: u32,
    #[serde(default)]
    pub num_wheelchairs: u32,
    #[serde(default)]
    pub num_bikes: u32,
    #[serde(default)]
    pub luggage: u32,
    #[serde(default)]
    pub customer: Option<CustomerId>,
}

impl BookingRequest {
    pub fn capacities(&self) -> Capacities {
        Capacities::new(
            self.num_passengers,
            self.num_wheelchairs,
            self.num_bikes,
            self.luggage,
        )
    }
}

/// A committed booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub company: CompanySummary,
    pub vehicle: VehicleId,
    pub tour: TourId,
    pub request: RequestId,
    pub pickup_time: UnixtimeMs,
    pub dropoff_time: UnixtimeMs,
    /// When the vehicle leaves its depot.
    pub departure: UnixtimeMs,
    /// When the vehicle is back at its depot.
    pub arrival: UnixtimeMs,
}

/// Why a booking was turned down. The numeric status is part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoRoute,
    SameLocation,
    TooFar,
    TooSoon,
    OutsideZone,
    NoVehicleInZone,
    NoVehicleForTravel,
    NoVehicleForTour,
    AllVehiclesBusy,
}

impl Rejection {
    pub fn status(self) -> u8 {
        match self {
            Rejection::NoRoute => 1,
            Rejection::SameLocation => 2,
            Rejection::TooFar => 3,
            Rejection::TooSoon => 4,
            Rejection::OutsideZone => 5,
            Rejection::NoVehicleInZone => 6,
            Rejection::NoVehicleForTravel => 7,
            Rejection::NoVehicleForTour => 9,
            Rejection::AllVehiclesBusy => 10,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Rejection::NoRoute => "No route was found from start to target.",
            Rejection::SameLocation => "Start and target are identical.",
            Rejection::TooFar => "The maximum travel time is exceeded.",
            Rejection::TooSoon => "The request violates the minimum lead time.",
            Rejection::OutsideZone => "Start and target are not in the same mandatory service zone.",
            Rejection::NoVehicleInZone | Rejection::NoVehicleForTravel => {
                "No company in the service zone has a vehicle available between start and end of the request."
            }
            Rejection::NoVehicleForTour => {
                "No company in the service zone has a vehicle available for the whole tour including approach and return."
            }
            Rejection::AllVehiclesBusy => {
                "No vehicle is available for the whole travel time without being busy with other tours."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Booked(Assignment),
    Rejected(Rejection),
}

impl BookingOutcome {
    pub fn status(&self) -> u8 {
        match self {
            BookingOutcome::Booked(_) => 0,
            BookingOutcome::Rejected(rejection) => rejection.status(),
        }
    }
}

/// A vehicle that survived every gate before the commit section.
#[derive(Debug, Clone)]
struct Candidate {
    company: CompanySummary,
    vehicle: VehicleId,
    full: Interval,
    detour: DurationMs,
}

pub struct BookingCoordinator<R: ?Sized, F: ?Sized> {
    routing: Arc<R>,
    fleet: Arc<F>,
    dispatch: DispatchConfig,
}

impl<R, F> BookingCoordinator<R, F>
where
    R: RoutingProvider + ?Sized,
    F: FleetRepository + ?Sized,
{
    pub fn new(routing: Arc<R>, fleet: Arc<F>, dispatch: DispatchConfig) -> Self {
        Self {
            routing,
            fleet,
            dispatch,
        }
    }

    pub async fn book(
        &self,
        request: &BookingRequest,
        now: UnixtimeMs,
    ) -> Result<BookingOutcome, BookingError> {
        let from = request.from.coordinates;
        let to = request.to.coordinates;

        let duration = self
            .routing
            .one_to_many(from, &[to], Direction::Forward)
            .await
            .map_err(|source| routing_failed(RoutingStage::Direct, source))?
            .first()
            .copied()
            .flatten();
        let Some(duration) = duration else {
            return Ok(reject(Rejection::NoRoute));
        };
        if duration == 0 {
            return Ok(reject(Rejection::SameLocation));
        }
        if duration > self.dispatch.max_travel_ms() {
            return Ok(reject(Rejection::TooFar));
        }

        let t = request.time_stamp;
        let travel = if request.start_fixed {
            t.checked_add(duration).map(|end| Interval::new(t, end))
        } else {
            t.checked_sub(duration).map(|start| Interval::new(start, t))
        };
        let Some(travel) = travel else {
            return Err(BookingError::TimeOutOfRange(t));
        };
        if now + self.dispatch.min_prep_ms() > travel.start() {
            return Ok(reject(Rejection::TooSoon));
        }

        let required = request.capacities();
        let padding = self.dispatch.search_padding_ms();
        let found = self
            .fleet
            .booking_candidates(from, to, &required, travel.expand(padding, padding))
            .await?;
        if found.is_empty() {
            return Ok(if self.fleet.zone_covers(from, to).await? {
                reject(Rejection::NoVehicleInZone)
            } else {
                reject(Rejection::OutsideZone)
            });
        }

        // one merged availability per vehicle at most can contain the travel interval
        let mut by_company: BTreeMap<CompanyId, (CompanySummary, Vec<(VehicleId, Interval)>)> =
            BTreeMap::new();
        for candidate in found {
            let containing: Vec<Interval> = Interval::merge(candidate.availabilities)
                .into_iter()
                .filter(|a| a.contains(&travel))
                .collect();
            let availability = match containing.as_slice() {
                [] => continue,
                [availability] => *availability,
                _ => {
                    error!(
                        vehicle = candidate.vehicle,
                        count = containing.len(),
                        "merged_availabilities_overlap"
                    );
                    return Err(BookingError::Invariant(format!(
                        "vehicle {} has {} merged availabilities containing {}",
                        candidate.vehicle,
                        containing.len(),
                        travel
                    )));
                }
            };
            by_company
                .entry(candidate.company.id)
                .or_insert_with(|| (candidate.company, Vec::new()))
                .1
                .push((candidate.vehicle, availability));
        }
        if by_company.is_empty() {
            return Ok(reject(Rejection::NoVehicleForTravel));
        }

        let candidates = self.routed_candidates(from, to, travel, by_company).await?;
        if candidates.is_empty() {
            return Ok(reject(Rejection::NoVehicleForTour));
        }
        debug!(count = candidates.len(), %travel, "booking_candidates_routed");

        self.commit(request, travel, candidates).await
    }

    /// Adds the depot legs and keeps vehicles available for the whole tour.
    async fn routed_candidates(
        &self,
        from: Coordinates,
        to: Coordinates,
        travel: Interval,
        by_company: BTreeMap<CompanyId, (CompanySummary, Vec<(VehicleId, Interval)>)>,
    ) -> Result<Vec<Candidate>, BookingError> {
        let depots: Vec<Coordinates> = by_company.values().map(|(c, _)| c.depot).collect();
        let (approach, back) = futures::try_join!(
            self.routing.one_to_many(from, &depots, Direction::Backward),
            self.routing.one_to_many(to, &depots, Direction::Forward),
        )
        .map_err(|source| routing_failed(RoutingStage::Depot, source))?;
        if approach.len() != depots.len() || back.len() != depots.len() {
            error!(
                companies = depots.len(),
                approach = approach.len(),
                back = back.len(),
                "depot_durations_mismatch"
            );
            return Err(BookingError::Invariant(format!(
                "depot routing returned {} and {} durations for {} companies",
                approach.len(),
                back.len(),
                depots.len()
            )));
        }

        let max_full_tour = self.dispatch.max_full_tour_ms();
        let mut candidates = Vec::new();
        for (i, (company, vehicles)) in by_company.into_values().enumerate() {
            let (Some(a), Some(b)) = (approach[i], back[i]) else {
                debug!(company = company.id, "depot_unreachable");
                continue;
            };
            let full = travel.expand(a, b);
            if full.duration_ms() > max_full_tour {
                continue;
            }
            for (vehicle, availability) in vehicles {
                if availability.contains(&full) {
                    candidates.push(Candidate {
                        company: company.clone(),
                        vehicle,
                        full,
                        detour: a + b,
                    });
                }
            }
        }
        Ok(candidates)
    }

    async fn commit(
        &self,
        request: &BookingRequest,
        travel: Interval,
        candidates: Vec<Candidate>,
    ) -> Result<BookingOutcome, BookingError> {
        let mut tx = self.fleet.begin_exclusive().await?;

        let checks: Vec<(VehicleId, Interval)> =
            candidates.iter().map(|c| (c.vehicle, c.full)).collect();
        let free = tx.vehicles_without_overlap(&checks).await?;
        let Some(best) = candidates
            .into_iter()
            .filter(|c| free.contains(&c.vehicle))
            .min_by_key(|c| (c.detour, c.vehicle))
        else {
            // dropping the transaction rolls it back
            return Ok(reject(Rejection::AllVehiclesBusy));
        };

        let start_address = tx.upsert_address(&request.from.address).await?;
        let target_address = tx.upsert_address(&request.to.address).await?;
        let tour = tx
            .insert_tour(NewTour {
                vehicle: best.vehicle,
                interval: best.full,
            })
            .await?;
        let request_id = tx
            .insert_request(NewRequest {
                tour,
                customer: request.customer,
                capacities: request.capacities(),
            })
            .await?;
        tx.insert_events(vec![
            NewEvent {
                tour,
                request: request_id,
                is_pickup: true,
                coordinates: request.from.coordinates,
                scheduled_time: travel.start(),
                address: start_address,
                customer: request.customer,
            },
            NewEvent {
                tour,
                request: request_id,
                is_pickup: false,
                coordinates: request.to.coordinates,
                scheduled_time: travel.end(),
                address: target_address,
                customer: request.customer,
            },
        ])
        .await?;
        tx.commit().await?;

        info!(
            tour,
            request = request_id,
            vehicle = best.vehicle,
            company = best.company.id,
            pickup = travel.start(),
            dropoff = travel.end(),
            "booking_committed"
        );
        Ok(BookingOutcome::Booked(Assignment {
            company: best.company,
            vehicle: best.vehicle,
            tour,
            request: request_id,
            pickup_time: travel.start(),
            dropoff_time: travel.end(),
            departure: best.full.start(),
            arrival: best.full.end(),
        }))
    }
}

fn reject(rejection: Rejection) -> BookingOutcome {
    debug!(status = rejection.status(), "booking_rejected");
    BookingOutcome::Rejected(rejection)
}

fn routing_failed(stage: RoutingStage, source: RoutingError) -> BookingError {
    warn!(?stage, error = %source, "routing_failed");
    BookingError::Routing { stage, source }
}
