//! Haversine routing provider (fallback when OSRM unavailable).
//!
//! Uses great-circle distance to estimate travel time.
//! Less accurate than OSRM (ignores roads) but always available.

use async_trait::async_trait;

use crate::error::RoutingError;
use crate::model::{Coordinates, DurationMs};
use crate::traits::{Direction, RoutingProvider};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine-based routing provider.
///
/// Estimates travel time using straight-line distance and an assumed speed.
/// Every destination is reachable and both directions take the same time.
#[derive(Debug, Clone)]
pub struct HaversineRouting {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineRouting {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineRouting {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Calculate haversine distance between two points in kilometers.
    fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
        let lat1_rad = from.lat.to_radians();
        let lat2_rad = to.lat.to_radians();
        let delta_lat = (to.lat - from.lat).to_radians();
        let delta_lng = (to.lng - from.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    /// Convert distance in km to travel time in milliseconds.
    fn km_to_ms(&self, km: f64) -> DurationMs {
        let hours = km / self.speed_kmh;
        (hours * 3_600_000.0).round() as DurationMs
    }
}

#[async_trait]
impl RoutingProvider for HaversineRouting {
    async fn one_to_many(
        &self,
        origin: Coordinates,
        destinations: &[Coordinates],
        _direction: Direction,
    ) -> Result<Vec<Option<DurationMs>>, RoutingError> {
        Ok(destinations
            .iter()
            .map(|destination| Some(self.km_to_ms(Self::haversine_km(origin, *destination))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let p = Coordinates::new(49.87, 8.65);
        let dist = HaversineRouting::haversine_km(p, p);
        assert!(dist < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Darmstadt (49.87, 8.65) to Frankfurt (50.11, 8.68)
        // Actual distance ~27 km
        let dist = HaversineRouting::haversine_km(Coordinates::new(49.87, 8.65), Coordinates::new(50.11, 8.68));
        assert!(dist > 25.0 && dist < 29.0, "Darmstadt to Frankfurt should be ~27km, got {}", dist);
    }

    #[test]
    fn test_reasonable_travel_time() {
        let provider = HaversineRouting::new(40.0); // 40 km/h
        // 10 km at 40 km/h = 0.25 hours = 900 seconds
        assert_eq!(provider.km_to_ms(10.0), 900_000);
    }

    #[tokio::test]
    async fn test_one_to_many_same_in_both_directions() {
        let provider = HaversineRouting::default();
        let origin = Coordinates::new(49.87, 8.65);
        let destinations = [origin, Coordinates::new(49.9, 8.7)];

        let forward = provider
            .one_to_many(origin, &destinations, Direction::Forward)
            .await
            .expect("haversine never fails");
        let backward = provider
            .one_to_many(origin, &destinations, Direction::Backward)
            .await
            .expect("haversine never fails");

        assert_eq!(forward, backward);
        assert_eq!(forward[0], Some(0));
        assert!(forward[1].is_some_and(|d| d > 0));
    }
}
