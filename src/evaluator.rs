//! Whitelist evaluation.
//!
//! For every bus stop and each of its candidate times, decide whether some
//! vehicle can serve the passenger leg between the user's own location and
//! the stop, and if so which vehicle does it with the least detour. A new
//! tour always runs depot → pickup → dropoff → depot and must fit into one
//! insertion range of the vehicle and one daily shift window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono_tz::Tz;
use futures::future::try_join_all;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::allowed_times::allowed_times;
use crate::capacities::Capacities;
use crate::config::{DispatchConfig, ShiftConfig};
use crate::error::{RoutingError, WhitelistError};
use crate::insertion::{InsertionRange, possible_insertions};
use crate::interval::Interval;
use crate::model::{
    BusStop, Company, CompanyId, Coordinates, DurationMs, UnixtimeMs, VehicleId,
};
use crate::traits::{Direction, FleetRepository, RoutingProvider};

/// Which end of the passenger leg is the bus stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegDirection {
    /// User location → bus stop.
    ToBusStop,
    /// Bus stop → user location.
    FromBusStop,
}

/// The best way found to serve one (stop, time) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insertion {
    pub company: CompanyId,
    pub vehicle: VehicleId,
    pub pickup_time: UnixtimeMs,
    pub dropoff_time: UnixtimeMs,
    /// When the vehicle leaves its depot.
    pub departure: UnixtimeMs,
    /// When the vehicle is back at its depot.
    pub arrival: UnixtimeMs,
    /// Depot → pickup plus dropoff → depot.
    pub detour: DurationMs,
}

/// Time limits applied while evaluating one request.
#[derive(Debug, Clone)]
pub struct EvaluationLimits {
    pub max_leg_ms: DurationMs,
    pub leg_padding_ms: DurationMs,
    pub max_wait_pickup_ms: DurationMs,
    pub max_wait_dropoff_ms: DurationMs,
    pub start_on_day_ms: DurationMs,
    pub end_on_day_ms: DurationMs,
    pub timezone: Tz,
    /// Earliest acceptable pickup.
    pub not_before: UnixtimeMs,
}

impl EvaluationLimits {
    pub fn new(dispatch: &DispatchConfig, shift: &ShiftConfig, now: UnixtimeMs) -> Self {
        Self {
            max_leg_ms: dispatch.max_travel_ms(),
            leg_padding_ms: dispatch.leg_padding_ms(),
            max_wait_pickup_ms: dispatch.max_wait_pickup_ms(),
            max_wait_dropoff_ms: dispatch.max_wait_dropoff_ms(),
            start_on_day_ms: shift.start_on_day_ms(),
            end_on_day_ms: shift.end_on_day_ms(),
            timezone: shift.timezone,
            not_before: now + dispatch.min_prep_ms(),
        }
    }
}

fn no_slots(bus_stops: &[BusStop]) -> Vec<Vec<Option<Insertion>>> {
    bus_stops.iter().map(|bs| vec![None; bs.times.len()]).collect()
}

fn checked_len<T>(values: Vec<T>, expected: usize) -> Result<Vec<T>, RoutingError> {
    if values.len() == expected {
        Ok(values)
    } else {
        Err(RoutingError::Malformed {
            expected,
            got: values.len(),
        })
    }
}

/// Evaluates every (bus stop, time) pair against the given companies.
///
/// The result has one entry per bus stop, aligned with that stop's `times`;
/// `None` marks an infeasible slot.
#[allow(clippy::too_many_arguments)]
pub async fn evaluate_request<R>(
    routing: &R,
    companies: &[Company],
    anchor: Coordinates,
    bus_stops: &[BusStop],
    direction: LegDirection,
    required: &Capacities,
    start_fixed: bool,
    limits: &EvaluationLimits,
) -> Result<Vec<Vec<Option<Insertion>>>, RoutingError>
where
    R: RoutingProvider + ?Sized,
{
    if companies.is_empty() || bus_stops.is_empty() {
        return Ok(no_slots(bus_stops));
    }

    let stop_coordinates: Vec<Coordinates> = bus_stops.iter().map(|bs| bs.coordinates).collect();
    let leg_direction = match direction {
        LegDirection::ToBusStop => Direction::Forward,
        LegDirection::FromBusStop => Direction::Backward,
    };
    let direct: Vec<Option<DurationMs>> = checked_len(
        routing
            .one_to_many(anchor, &stop_coordinates, leg_direction)
            .await?,
        bus_stops.len(),
    )?
    .into_iter()
    .map(|duration| {
        duration
            .filter(|d| *d <= limits.max_leg_ms)
            .map(|d| d + limits.leg_padding_ms)
    })
    .collect();

    let insertions: HashMap<VehicleId, Vec<InsertionRange>> = companies
        .par_iter()
        .flat_map(|company| company.vehicles.par_iter())
        .map(|vehicle| (vehicle.id, possible_insertions(vehicle, required)))
        .collect();

    let active: Vec<&Company> = companies
        .iter()
        .filter(|c| {
            c.vehicles
                .iter()
                .any(|v| insertions.get(&v.id).is_some_and(|r| !r.is_empty()))
        })
        .collect();
    if active.is_empty() || direct.iter().all(Option::is_none) {
        return Ok(no_slots(bus_stops));
    }

    let Some(span) = fleet_span(companies) else {
        return Ok(no_slots(bus_stops));
    };
    let allowed = allowed_times(
        span.start(),
        span.end(),
        limits.start_on_day_ms,
        limits.end_on_day_ms,
        limits.timezone,
    );
    debug!(
        windows = ?allowed.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "whitelist_allowed_times"
    );

    let depots: Vec<Coordinates> = active.iter().map(|c| c.depot()).collect();
    let (approach, back) = depot_legs(routing, anchor, bus_stops, &direct, &depots, direction).await?;

    let slots = SlotSearch {
        companies: &active,
        insertions: &insertions,
        allowed: &allowed,
        start_fixed,
        limits,
    };
    let result: Vec<Vec<Option<Insertion>>> = bus_stops
        .par_iter()
        .enumerate()
        .map(|(i, stop)| match direct[i] {
            Some(leg) => stop
                .times
                .iter()
                .map(|&t| slots.best(t, leg, &approach[i], &back[i]))
                .collect::<Vec<_>>(),
            None => vec![None; stop.times.len()],
        })
        .collect();
    Ok(result)
}

/// Smallest interval containing every availability and tour of the fleet.
fn fleet_span(companies: &[Company]) -> Option<Interval> {
    let intervals = companies
        .iter()
        .flat_map(|c| c.vehicles.iter())
        .flat_map(|v| {
            v.availabilities
                .iter()
                .copied()
                .chain(v.tours.iter().map(|t| t.interval))
        });
    let (earliest, latest) = intervals.fold((UnixtimeMs::MAX, UnixtimeMs::MIN), |(lo, hi), i| {
        (lo.min(i.start()), hi.max(i.end()))
    });
    (earliest < latest).then(|| Interval::new(earliest, latest))
}

type DurationTable = Vec<Vec<Option<DurationMs>>>;

/// Depot → pickup and dropoff → depot durations, indexed `[stop][company]`.
async fn depot_legs<R>(
    routing: &R,
    anchor: Coordinates,
    bus_stops: &[BusStop],
    direct: &[Option<DurationMs>],
    depots: &[Coordinates],
    direction: LegDirection,
) -> Result<(DurationTable, DurationTable), RoutingError>
where
    R: RoutingProvider + ?Sized,
{
    // depot → anchor when the user is picked up, anchor → depot when dropped off
    let (anchor_direction, stop_direction) = match direction {
        LegDirection::ToBusStop => (Direction::Backward, Direction::Forward),
        LegDirection::FromBusStop => (Direction::Forward, Direction::Backward),
    };
    let needed: Vec<usize> = (0..bus_stops.len()).filter(|&i| direct[i].is_some()).collect();

    let anchor_leg = async {
        checked_len(
            routing.one_to_many(anchor, depots, anchor_direction).await?,
            depots.len(),
        )
    };
    let stop_legs = try_join_all(needed.iter().map(|&i| async move {
        checked_len(
            routing
                .one_to_many(bus_stops[i].coordinates, depots, stop_direction)
                .await?,
            depots.len(),
        )
    }));
    let (anchor_leg, stop_legs) = futures::try_join!(anchor_leg, stop_legs)?;

    let mut per_stop: DurationTable = vec![vec![None; depots.len()]; bus_stops.len()];
    for (i, durations) in needed.into_iter().zip(stop_legs) {
        per_stop[i] = durations;
    }
    let per_anchor: DurationTable = vec![anchor_leg; bus_stops.len()];

    Ok(match direction {
        LegDirection::ToBusStop => (per_anchor, per_stop),
        LegDirection::FromBusStop => (per_stop, per_anchor),
    })
}

struct SlotSearch<'a> {
    companies: &'a [&'a Company],
    insertions: &'a HashMap<VehicleId, Vec<InsertionRange>>,
    allowed: &'a [Interval],
    start_fixed: bool,
    limits: &'a EvaluationLimits,
}

impl SlotSearch<'_> {
    /// Cheapest insertion for a slot at time `t` whose passenger leg lasts `leg`.
    ///
    /// With a fixed start the pickup may slip to at most `max_wait_dropoff`
    /// after `t`; otherwise the dropoff may happen up to `max_wait_pickup`
    /// before `t`. Equal detours go to the range with the tighter residual
    /// capacity. Times too close to the ends of the clock have no slot.
    fn best(
        &self,
        t: UnixtimeMs,
        leg: DurationMs,
        approach: &[Option<DurationMs>],
        back: &[Option<DurationMs>],
    ) -> Option<Insertion> {
        let (earliest_pickup, latest_pickup) = if self.start_fixed {
            (t, t.checked_add(self.limits.max_wait_dropoff_ms)?)
        } else {
            let latest = t.checked_sub(leg)?;
            (latest.checked_sub(self.limits.max_wait_pickup_ms)?, latest)
        };
        let earliest_pickup = earliest_pickup.max(self.limits.not_before);
        if earliest_pickup > latest_pickup {
            return None;
        }

        let mut best: Option<(Insertion, Capacities)> = None;
        for (c, company) in self.companies.iter().enumerate() {
            let (Some(a), Some(b)) = (approach[c], back[c]) else {
                continue;
            };
            for vehicle in &company.vehicles {
                let Some(ranges) = self.insertions.get(&vehicle.id) else {
                    continue;
                };
                for range in ranges {
                    for shift in self.allowed.iter().filter(|s| s.overlaps(&range.interval)) {
                        let Some(slot) = range.interval.intersection(shift) else {
                            continue;
                        };
                        let lo = earliest_pickup.max(slot.start() + a);
                        let hi = latest_pickup.min(slot.end() - leg - b);
                        if lo > hi {
                            continue;
                        }
                        let pickup = if self.start_fixed { lo } else { hi };
                        let candidate = Insertion {
                            company: company.id(),
                            vehicle: vehicle.id,
                            pickup_time: pickup,
                            dropoff_time: pickup + leg,
                            departure: pickup - a,
                            arrival: pickup + leg + b,
                            detour: a + b,
                        };
                        if best.is_none_or(|(current, spare)| {
                            candidate.detour < current.detour
                                || (candidate.detour == current.detour
                                    && range.residual != spare
                                    && range.residual.fits_within(&spare))
                        }) {
                            best = Some((candidate, range.residual));
                        }
                    }
                }
            }
        }
        best.map(|(insertion, _)| insertion)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistRequest {
    pub start: Coordinates,
    pub target: Coordinates,
    pub start_bus_stops: Vec<BusStop>,
    pub target_bus_stops: Vec<BusStop>,
    pub direct_times: Vec<UnixtimeMs>,
    pub start_fixed: bool,
    pub capacities: Capacities,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhitelistResponse {
    pub start: Vec<Vec<Option<Insertion>>>,
    pub target: Vec<Vec<Option<Insertion>>>,
    pub direct: Vec<Option<Insertion>>,
}

/// Answers whitelist requests: start stops are reached from the start,
/// target stops lead to the target, direct times ride start → target.
pub struct WhitelistService<R: ?Sized, F: ?Sized> {
    routing: Arc<R>,
    fleet: Arc<F>,
    dispatch: DispatchConfig,
    shift: ShiftConfig,
}

impl<R, F> WhitelistService<R, F>
where
    R: RoutingProvider + ?Sized,
    F: FleetRepository + ?Sized,
{
    pub fn new(routing: Arc<R>, fleet: Arc<F>, dispatch: DispatchConfig, shift: ShiftConfig) -> Self {
        Self {
            routing,
            fleet,
            dispatch,
            shift,
        }
    }

    pub async fn evaluate(
        &self,
        request: &WhitelistRequest,
        now: UnixtimeMs,
    ) -> Result<WhitelistResponse, WhitelistError> {
        let direct_stop = [BusStop {
            coordinates: request.target,
            times: request.direct_times.clone(),
        }];
        let all_times = request
            .start_bus_stops
            .iter()
            .chain(&request.target_bus_stops)
            .chain(&direct_stop)
            .flat_map(|bs| bs.times.iter().copied());
        let (lo, hi) = all_times.fold((UnixtimeMs::MAX, UnixtimeMs::MIN), |(lo, hi), t| {
            (lo.min(t), hi.max(t))
        });
        if lo > hi {
            return Ok(WhitelistResponse {
                start: no_slots(&request.start_bus_stops),
                target: no_slots(&request.target_bus_stops),
                direct: Vec::new(),
            });
        }
        let padding = self.dispatch.search_padding_ms();
        let window = Interval::new(lo, hi).expand(padding, padding);
        let limits = EvaluationLimits::new(&self.dispatch, &self.shift, now);
        let required = &request.capacities;

        let start_points = [request.start];
        let target_points = [request.target];
        let direct_points = [request.start, request.target];
        let (start_companies, target_companies, direct_companies) = futures::try_join!(
            self.fleet.companies_covering(&start_points, required, window),
            self.fleet.companies_covering(&target_points, required, window),
            self.fleet.companies_covering(&direct_points, required, window),
        )?;

        let (start, target, mut direct) = futures::try_join!(
            evaluate_request(
                self.routing.as_ref(),
                &start_companies,
                request.start,
                &request.start_bus_stops,
                LegDirection::ToBusStop,
                required,
                request.start_fixed,
                &limits,
            ),
            evaluate_request(
                self.routing.as_ref(),
                &target_companies,
                request.target,
                &request.target_bus_stops,
                LegDirection::FromBusStop,
                required,
                request.start_fixed,
                &limits,
            ),
            evaluate_request(
                self.routing.as_ref(),
                &direct_companies,
                request.start,
                &direct_stop,
                LegDirection::ToBusStop,
                required,
                request.start_fixed,
                &limits,
            ),
        )?;

        let response = WhitelistResponse {
            start,
            target,
            direct: direct.pop().unwrap_or_default(),
        };
        info!(
            start_feasible = count_feasible(&response.start),
            target_feasible = count_feasible(&response.target),
            direct_feasible = response.direct.iter().flatten().count(),
            "whitelist_evaluated"
        );
        Ok(response)
    }
}

fn count_feasible(slots: &[Vec<Option<Insertion>>]) -> usize {
    slots.iter().flatten().flatten().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompanySummary, HOUR, MINUTE, Tour, Vehicle};

    fn limits() -> EvaluationLimits {
        EvaluationLimits {
            max_leg_ms: HOUR,
            leg_padding_ms: 0,
            max_wait_pickup_ms: 10 * MINUTE,
            max_wait_dropoff_ms: 10 * MINUTE,
            start_on_day_ms: 0,
            end_on_day_ms: 24 * HOUR,
            timezone: chrono_tz::UTC,
            not_before: 0,
        }
    }

    fn company(id: CompanyId, vehicles: Vec<Vehicle>) -> Company {
        Company {
            summary: CompanySummary {
                id,
                name: format!("company {id}"),
                depot: Coordinates::new(0.0, 0.0),
            },
            vehicles,
        }
    }

    fn vehicle(id: VehicleId, company: CompanyId, available: Interval, tours: Vec<Interval>) -> Vehicle {
        Vehicle {
            id,
            company,
            capacities: Capacities::new(4, 0, 0, 0),
            availabilities: vec![available],
            tours: tours
                .into_iter()
                .map(|interval| Tour { id: 0, vehicle: id, interval })
                .collect(),
        }
    }

    fn search<'a>(
        companies: &'a [&'a Company],
        insertions: &'a HashMap<VehicleId, Vec<InsertionRange>>,
        allowed: &'a [Interval],
        start_fixed: bool,
        limits: &'a EvaluationLimits,
    ) -> SlotSearch<'a> {
        SlotSearch {
            companies,
            insertions,
            allowed,
            start_fixed,
            limits,
        }
    }

    #[test]
    fn test_fleet_span_covers_availabilities_and_tours() {
        let companies = vec![company(
            1,
            vec![
                vehicle(1, 1, Interval::new(100, 200), vec![Interval::new(150, 400)]),
                vehicle(2, 1, Interval::new(50, 60), vec![]),
            ],
        )];
        assert_eq!(fleet_span(&companies), Some(Interval::new(50, 400)));
        assert_eq!(fleet_span(&[]), None);
    }

    #[test]
    fn test_slot_prefers_smaller_detour() {
        let near = company(1, vec![vehicle(1, 1, Interval::new(0, 10 * HOUR), vec![])]);
        let far = company(2, vec![vehicle(2, 2, Interval::new(0, 10 * HOUR), vec![])]);
        let companies = [&far, &near];
        let required = Capacities::new(1, 0, 0, 0);
        let insertions: HashMap<_, _> = [&far, &near]
            .iter()
            .flat_map(|c| c.vehicles.iter())
            .map(|v| (v.id, possible_insertions(v, &required)))
            .collect();
        let allowed = [Interval::new(0, 10 * HOUR)];
        let limits = limits();

        let slots = search(&companies, &insertions, &allowed, true, &limits);
        let best = slots
            .best(2 * HOUR, 20 * MINUTE, &[Some(30 * MINUTE), Some(5 * MINUTE)], &[Some(30 * MINUTE), Some(5 * MINUTE)])
            .expect("feasible");

        assert_eq!(best.vehicle, 1);
        assert_eq!(best.pickup_time, 2 * HOUR);
        assert_eq!(best.dropoff_time, 2 * HOUR + 20 * MINUTE);
        assert_eq!(best.departure, 2 * HOUR - 5 * MINUTE);
        assert_eq!(best.detour, 10 * MINUTE);
    }

    #[test]
    fn test_slot_shifts_pickup_within_wait_to_avoid_tour() {
        // a tour ends 5 minutes after the requested pickup; approach takes 2 minutes
        let busy = company(
            1,
            vec![vehicle(1, 1, Interval::new(0, 10 * HOUR), vec![Interval::new(HOUR, 2 * HOUR + 5 * MINUTE)])],
        );
        let companies = [&busy];
        let required = Capacities::new(1, 0, 0, 0);
        let insertions: HashMap<_, _> = busy
            .vehicles
            .iter()
            .map(|v| (v.id, possible_insertions(v, &required)))
            .collect();
        let allowed = [Interval::new(0, 10 * HOUR)];
        let limits = limits();
        let slots = search(&companies, &insertions, &allowed, true, &limits);

        let best = slots
            .best(2 * HOUR, 20 * MINUTE, &[Some(2 * MINUTE)], &[Some(2 * MINUTE)])
            .expect("pickup can slip by 7 minutes");
        assert_eq!(best.pickup_time, 2 * HOUR + 7 * MINUTE);

        // a tour ending 15 minutes after the requested pickup is beyond the wait limit
        let busy = company(
            1,
            vec![vehicle(1, 1, Interval::new(0, 10 * HOUR), vec![Interval::new(HOUR, 2 * HOUR + 15 * MINUTE)])],
        );
        let companies = [&busy];
        let insertions: HashMap<_, _> = busy
            .vehicles
            .iter()
            .map(|v| (v.id, possible_insertions(v, &required)))
            .collect();
        let slots = search(&companies, &insertions, &allowed, true, &limits);
        assert!(slots.best(2 * HOUR, 20 * MINUTE, &[Some(2 * MINUTE)], &[Some(2 * MINUTE)]).is_none());
    }

    #[test]
    fn test_slot_with_fixed_dropoff_picks_latest_pickup() {
        let idle = company(1, vec![vehicle(1, 1, Interval::new(0, 10 * HOUR), vec![])]);
        let companies = [&idle];
        let required = Capacities::new(1, 0, 0, 0);
        let insertions: HashMap<_, _> = idle
            .vehicles
            .iter()
            .map(|v| (v.id, possible_insertions(v, &required)))
            .collect();
        let allowed = [Interval::new(0, 10 * HOUR)];
        let limits = limits();
        let slots = search(&companies, &insertions, &allowed, false, &limits);

        let best = slots
            .best(5 * HOUR, 30 * MINUTE, &[Some(MINUTE)], &[Some(MINUTE)])
            .expect("feasible");
        assert_eq!(best.dropoff_time, 5 * HOUR);
        assert_eq!(best.pickup_time, 5 * HOUR - 30 * MINUTE);
    }

    #[test]
    fn test_slot_respects_shift_window_and_lead_time() {
        let idle = company(1, vec![vehicle(1, 1, Interval::new(0, 10 * HOUR), vec![])]);
        let companies = [&idle];
        let required = Capacities::new(1, 0, 0, 0);
        let insertions: HashMap<_, _> = idle
            .vehicles
            .iter()
            .map(|v| (v.id, possible_insertions(v, &required)))
            .collect();
        let limits = limits();

        // the shift ends before the vehicle could return
        let allowed = [Interval::new(0, 2 * HOUR + 20 * MINUTE)];
        let slots = search(&companies, &insertions, &allowed, true, &limits);
        assert!(slots.best(2 * HOUR, 20 * MINUTE, &[Some(MINUTE)], &[Some(MINUTE)]).is_none());

        let allowed = [Interval::new(0, 10 * HOUR)];
        let mut late = limits.clone();
        late.not_before = 3 * HOUR;
        let slots = search(&companies, &insertions, &allowed, true, &late);
        assert!(slots.best(2 * HOUR, 20 * MINUTE, &[Some(MINUTE)], &[Some(MINUTE)]).is_none());
    }

    #[test]
    fn test_unreachable_depot_is_skipped() {
        let idle = company(1, vec![vehicle(1, 1, Interval::new(0, 10 * HOUR), vec![])]);
        let companies = [&idle];
        let required = Capacities::new(1, 0, 0, 0);
        let insertions: HashMap<_, _> = idle
            .vehicles
            .iter()
            .map(|v| (v.id, possible_insertions(v, &required)))
            .collect();
        let allowed = [Interval::new(0, 10 * HOUR)];
        let limits = limits();
        let slots = search(&companies, &insertions, &allowed, true, &limits);
        assert!(slots.best(2 * HOUR, 20 * MINUTE, &[None], &[Some(MINUTE)]).is_none());
    }
}
