//! OSRM HTTP adapter for one-to-many travel durations.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RoutingError;
use crate::model::{Coordinates, DurationMs};
use crate::traits::{Direction, RoutingProvider};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// `table` service URL with the origin at index 0.
    fn table_url(&self, origin: Coordinates, destinations: &[Coordinates], direction: Direction) -> String {
        let coords = std::iter::once(&origin)
            .chain(destinations)
            .map(|c| format!("{:.6},{:.6}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let others = (1..=destinations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let (sources, targets) = match direction {
            Direction::Forward => ("0".to_string(), others),
            Direction::Backward => (others, "0".to_string()),
        };

        format!(
            "{}/table/v1/{}/{}?sources={}&destinations={}&annotations=duration",
            self.config.base_url, self.config.profile, coords, sources, targets
        )
    }
}

#[async_trait]
impl RoutingProvider for OsrmClient {
    async fn one_to_many(
        &self,
        origin: Coordinates,
        destinations: &[Coordinates],
        direction: Direction,
    ) -> Result<Vec<Option<DurationMs>>, RoutingError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.table_url(origin, destinations, direction);
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<OsrmTableResponse>()
            .await?;

        if body.code != "Ok" {
            tracing::warn!(code = %body.code, "osrm_table_rejected");
            return Err(RoutingError::Rejected(body.code));
        }

        let rows = body.durations.unwrap_or_default();
        let durations: Vec<Option<f64>> = match direction {
            Direction::Forward => rows.into_iter().next().unwrap_or_default(),
            Direction::Backward => rows
                .into_iter()
                .map(|row| row.into_iter().next().flatten())
                .collect(),
        };

        if durations.len() != destinations.len() {
            return Err(RoutingError::Malformed {
                expected: destinations.len(),
                got: durations.len(),
            });
        }

        Ok(durations
            .into_iter()
            .map(|seconds| seconds.map(|s| (s * 1000.0).round() as DurationMs))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OsrmClient {
        OsrmClient::new(OsrmConfig::default()).expect("client builds")
    }

    #[test]
    fn test_forward_url_uses_origin_as_source() {
        let url = client().table_url(
            Coordinates::new(49.87, 8.65),
            &[Coordinates::new(49.9, 8.7), Coordinates::new(50.0, 8.8)],
            Direction::Forward,
        );
        assert_eq!(
            url,
            "http://localhost:5000/table/v1/car/8.650000,49.870000;8.700000,49.900000;8.800000,50.000000\
             ?sources=0&destinations=1;2&annotations=duration"
        );
    }

    #[test]
    fn test_backward_url_uses_origin_as_destination() {
        let url = client().table_url(
            Coordinates::new(49.87, 8.65),
            &[Coordinates::new(49.9, 8.7)],
            Direction::Backward,
        );
        assert!(url.ends_with("?sources=1&destinations=0&annotations=duration"));
    }

    #[test]
    fn test_parses_unreachable_as_null() {
        let body: OsrmTableResponse =
            serde_json::from_str(r#"{"code":"Ok","durations":[[0.0,12.5,null]]}"#).expect("valid json");
        assert_eq!(body.durations, Some(vec![vec![Some(0.0), Some(12.5), None]]));
    }

    #[tokio::test]
    async fn test_empty_destinations_skip_request() {
        let result = client()
            .one_to_many(Coordinates::new(0.0, 0.0), &[], Direction::Forward)
            .await
            .expect("no request is made");
        assert!(result.is_empty());
    }
}
