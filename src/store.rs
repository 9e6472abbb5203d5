//! In-memory fleet store.
//!
//! Backs the HTTP service and the tests. Zone coverage is a point-in-polygon
//! test on `geo` polygons; a zone's boundary counts as covered. Reads take a
//! shared lock, the commit section takes the write half of the same lock so
//! that commits are serialized and always see the latest tours.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use geo::{Intersects, LineString, Point, Polygon};
use serde::Deserialize;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::capacities::Capacities;
use crate::error::StoreError;
use crate::interval::Interval;
use crate::model::{
    Address, AddressId, Company, CompanyId, CompanySummary, Coordinates, CustomerId, NewEvent,
    NewRequest, NewTour, RequestId, Tour, TourId, UnixtimeMs, Vehicle, VehicleAvailability,
    VehicleId, ZoneId,
};
use crate::traits::{FleetRepository, FleetTransaction};

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneSeed {
    pub id: ZoneId,
    #[serde(default)]
    pub name: String,
    /// Community zones group villages for display and never grant service.
    #[serde(default)]
    pub community: bool,
    /// Exterior ring; the ring is closed automatically.
    pub area: Vec<Coordinates>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanySeed {
    pub id: CompanyId,
    pub name: String,
    pub zone: ZoneId,
    pub depot: Coordinates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleSeed {
    pub id: VehicleId,
    pub company: CompanyId,
    pub capacities: Capacities,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilitySeed {
    pub vehicle: VehicleId,
    pub start: UnixtimeMs,
    pub end: UnixtimeMs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TourSeed {
    pub vehicle: VehicleId,
    pub departure: UnixtimeMs,
    pub arrival: UnixtimeMs,
}

/// Initial fleet contents, typically read from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetSeed {
    #[serde(default)]
    pub zones: Vec<ZoneSeed>,
    #[serde(default)]
    pub companies: Vec<CompanySeed>,
    #[serde(default)]
    pub vehicles: Vec<VehicleSeed>,
    #[serde(default)]
    pub availabilities: Vec<AvailabilitySeed>,
    #[serde(default)]
    pub tours: Vec<TourSeed>,
}

impl FleetSeed {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet seed {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fleet seed {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ZoneRow {
    pub id: ZoneId,
    pub name: String,
    pub community: bool,
    pub area: Polygon<f64>,
}

impl ZoneRow {
    fn covers(&self, point: Coordinates) -> bool {
        self.area.intersects(&Point::new(point.lng, point.lat))
    }
}

#[derive(Debug, Clone)]
pub struct VehicleRow {
    pub id: VehicleId,
    pub company: CompanyId,
    pub capacities: Capacities,
}

#[derive(Debug, Clone)]
pub struct AvailabilityRow {
    pub vehicle: VehicleId,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub id: RequestId,
    pub tour: TourId,
    pub customer: Option<CustomerId>,
    pub capacities: Capacities,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub event: NewEvent,
}

/// Everything the store holds.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub zones: Vec<ZoneRow>,
    pub companies: Vec<(CompanySummary, ZoneId)>,
    pub vehicles: Vec<VehicleRow>,
    pub availabilities: Vec<AvailabilityRow>,
    pub tours: Vec<Tour>,
    pub requests: Vec<RequestRow>,
    pub events: Vec<EventRow>,
    pub addresses: Vec<(AddressId, Address)>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn mandatory_zones_covering<'a>(&'a self, points: &'a [Coordinates]) -> impl Iterator<Item = ZoneId> + 'a {
        self.zones
            .iter()
            .filter(|zone| !zone.community && points.iter().all(|p| zone.covers(*p)))
            .map(|zone| zone.id)
    }

    fn companies_in_zones(&self, zones: &[ZoneId]) -> impl Iterator<Item = &CompanySummary> {
        self.companies
            .iter()
            .filter(move |(_, zone)| zones.contains(zone))
            .map(|(company, _)| company)
    }

    fn fitting_vehicles<'a>(
        &'a self,
        company: CompanyId,
        required: &'a Capacities,
    ) -> impl Iterator<Item = &'a VehicleRow> + 'a {
        self.vehicles
            .iter()
            .filter(move |v| v.company == company && required.fits_within(&v.capacities))
    }

    /// Availabilities touching `window`, endpoints inclusive.
    fn availabilities_near(&self, vehicle: VehicleId, window: Interval) -> Vec<Interval> {
        self.availabilities
            .iter()
            .filter(|a| {
                a.vehicle == vehicle
                    && a.interval.start() <= window.end()
                    && a.interval.end() >= window.start()
            })
            .map(|a| a.interval)
            .collect()
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new(seed: FleetSeed) -> Result<Self, StoreError> {
        let mut tables = Tables::default();

        for zone in seed.zones {
            if zone.area.len() < 3 {
                return Err(StoreError::InvalidRecord(format!(
                    "zone {} has fewer than three corners",
                    zone.id
                )));
            }
            let ring: Vec<(f64, f64)> = zone.area.iter().map(|c| (c.lng, c.lat)).collect();
            tables.zones.push(ZoneRow {
                id: zone.id,
                name: zone.name,
                community: zone.community,
                area: Polygon::new(LineString::from(ring), Vec::new()),
            });
        }

        for company in seed.companies {
            tables.companies.push((
                CompanySummary {
                    id: company.id,
                    name: company.name,
                    depot: company.depot,
                },
                company.zone,
            ));
        }

        for vehicle in seed.vehicles {
            if !tables.companies.iter().any(|(c, _)| c.id == vehicle.company) {
                return Err(StoreError::UnknownCompany(vehicle.company));
            }
            tables.vehicles.push(VehicleRow {
                id: vehicle.id,
                company: vehicle.company,
                capacities: vehicle.capacities,
            });
        }

        for availability in seed.availabilities {
            let interval = checked_interval(availability.start, availability.end)?;
            if !tables.vehicles.iter().any(|v| v.id == availability.vehicle) {
                return Err(StoreError::UnknownVehicle(availability.vehicle));
            }
            tables.availabilities.push(AvailabilityRow {
                vehicle: availability.vehicle,
                interval,
            });
        }

        for tour in seed.tours {
            let interval = checked_interval(tour.departure, tour.arrival)?;
            if !tables.vehicles.iter().any(|v| v.id == tour.vehicle) {
                return Err(StoreError::UnknownVehicle(tour.vehicle));
            }
            let id = tables.next_id();
            tables.tours.push(Tour {
                id,
                vehicle: tour.vehicle,
                interval,
            });
        }

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// A copy of the current contents.
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }
}

fn checked_interval(start: UnixtimeMs, end: UnixtimeMs) -> Result<Interval, StoreError> {
    Interval::try_new(start, end)
        .ok_or_else(|| StoreError::InvalidRecord(format!("interval [{start}, {end}) is inverted")))
}

#[async_trait]
impl FleetRepository for MemoryStore {
    async fn booking_candidates(
        &self,
        from: Coordinates,
        to: Coordinates,
        required: &Capacities,
        window: Interval,
    ) -> Result<Vec<VehicleAvailability>, StoreError> {
        let tables = self.tables.read().await;
        let points = [from, to];
        let zones: Vec<ZoneId> = tables.mandatory_zones_covering(&points).collect();

        let mut candidates = Vec::new();
        for company in tables.companies_in_zones(&zones) {
            for vehicle in tables.fitting_vehicles(company.id, required) {
                let availabilities = tables.availabilities_near(vehicle.id, window);
                if availabilities.is_empty() {
                    continue;
                }
                candidates.push(VehicleAvailability {
                    vehicle: vehicle.id,
                    company: company.clone(),
                    availabilities,
                });
            }
        }
        Ok(candidates)
    }

    async fn zone_covers(&self, from: Coordinates, to: Coordinates) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        let points = [from, to];
        Ok(tables.mandatory_zones_covering(&points).next().is_some())
    }

    async fn companies_covering(
        &self,
        points: &[Coordinates],
        required: &Capacities,
        window: Interval,
    ) -> Result<Vec<Company>, StoreError> {
        let tables = self.tables.read().await;
        let zones: Vec<ZoneId> = tables.mandatory_zones_covering(points).collect();

        let mut companies = Vec::new();
        for summary in tables.companies_in_zones(&zones) {
            let vehicles: Vec<Vehicle> = tables
                .fitting_vehicles(summary.id, required)
                .map(|vehicle| Vehicle {
                    id: vehicle.id,
                    company: vehicle.company,
                    capacities: vehicle.capacities,
                    availabilities: tables.availabilities_near(vehicle.id, window),
                    tours: tables
                        .tours
                        .iter()
                        .filter(|t| t.vehicle == vehicle.id && t.interval.overlaps(&window))
                        .cloned()
                        .collect(),
                })
                .collect();
            if vehicles.is_empty() {
                continue;
            }
            companies.push(Company {
                summary: summary.clone(),
                vehicles,
            });
        }
        Ok(companies)
    }

    async fn begin_exclusive<'a>(&'a self) -> Result<Box<dyn FleetTransaction + 'a>, StoreError> {
        let guard = self.tables.write().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }
}

/// Writes go to `staged` and replace the guarded tables on commit.
struct MemoryTransaction<'a> {
    guard: RwLockWriteGuard<'a, Tables>,
    staged: Tables,
}

#[async_trait]
impl<'a> FleetTransaction for MemoryTransaction<'a> {
    async fn vehicles_without_overlap(
        &mut self,
        candidates: &[(VehicleId, Interval)],
    ) -> Result<Vec<VehicleId>, StoreError> {
        let mut busy: HashMap<VehicleId, Vec<Interval>> = HashMap::new();
        for tour in &self.staged.tours {
            busy.entry(tour.vehicle).or_default().push(tour.interval);
        }

        let mut free = Vec::new();
        for (vehicle, interval) in candidates {
            if !self.staged.vehicles.iter().any(|v| v.id == *vehicle) {
                return Err(StoreError::UnknownVehicle(*vehicle));
            }
            let overlapping = busy
                .get(vehicle)
                .is_some_and(|tours| tours.iter().any(|t| t.overlaps(interval)));
            if !overlapping {
                free.push(*vehicle);
            }
        }
        Ok(free)
    }

    async fn upsert_address(&mut self, address: &Address) -> Result<AddressId, StoreError> {
        if let Some((id, _)) = self.staged.addresses.iter().find(|(_, a)| a == address) {
            return Ok(*id);
        }
        let id = self.staged.next_id();
        self.staged.addresses.push((id, address.clone()));
        Ok(id)
    }

    async fn insert_tour(&mut self, tour: NewTour) -> Result<TourId, StoreError> {
        if !self.staged.vehicles.iter().any(|v| v.id == tour.vehicle) {
            return Err(StoreError::UnknownVehicle(tour.vehicle));
        }
        let id = self.staged.next_id();
        self.staged.tours.push(Tour {
            id,
            vehicle: tour.vehicle,
            interval: tour.interval,
        });
        Ok(id)
    }

    async fn insert_request(&mut self, request: NewRequest) -> Result<RequestId, StoreError> {
        let id = self.staged.next_id();
        self.staged.requests.push(RequestRow {
            id,
            tour: request.tour,
            customer: request.customer,
            capacities: request.capacities,
        });
        Ok(id)
    }

    async fn insert_events(&mut self, events: Vec<NewEvent>) -> Result<(), StoreError> {
        for event in events {
            let id = self.staged.next_id();
            self.staged.events.push(EventRow { id, event });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
