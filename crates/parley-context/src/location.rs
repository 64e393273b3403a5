//! Location enrichment: where the user is and what that place is called.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::Coordinates;
use parley_settings::LocationSettings;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::EnrichmentFault;

/// Source of the current coordinates.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_coordinates(&self) -> Result<Coordinates, EnrichmentFault>;
}

/// Turns coordinates into a human-readable place name.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn place_name(&self, coordinates: Coordinates) -> Result<String, EnrichmentFault>;
}

/// Reports coordinates fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct FixedLocationProvider {
    coordinates: Option<Coordinates>,
}

impl FixedLocationProvider {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }

    pub fn from_settings(settings: &LocationSettings) -> Self {
        Self::new(settings.coordinates().map(|(lat, lng)| Coordinates::new(lat, lng)))
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_coordinates(&self) -> Result<Coordinates, EnrichmentFault> {
        self.coordinates
            .ok_or_else(|| EnrichmentFault::Unavailable("no coordinates configured".into()))
    }
}

// =============================================================================
// Nominatim-compatible reverse geocoder
// =============================================================================

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl Address {
    /// `"{locality}, {state}, {country}"` from whichever parts are present.
    fn compose(self) -> Option<String> {
        let locality = self.city.or(self.town).or(self.village).or(self.hamlet);
        let parts: Vec<String> = [locality, self.state, self.country]
            .into_iter()
            .flatten()
            .map(|part| part.trim().to_owned())
            .filter(|part| !part.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

pub struct HttpReverseGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReverseGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn from_settings(settings: &LocationSettings) -> Self {
        Self::new(
            settings.geocoder_url.clone(),
            Duration::from_millis(settings.timeout_ms),
            &settings.user_agent,
        )
    }
}

#[async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn place_name(&self, coordinates: Coordinates) -> Result<String, EnrichmentFault> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "json".to_owned()),
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lng.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentFault::Network(format!("HTTP {status}")));
        }

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentFault::Malformed(e.to_string()))?;
        let name = body
            .address
            .and_then(Address::compose)
            .ok_or_else(|| EnrichmentFault::Malformed("no address components".into()))?;
        debug!(place = %name, "reverse geocoded");
        Ok(name)
    }
}

/// Best-effort place name; falls back to the coordinate pair on any failure.
pub async fn resolve_place_name(geocoder: &dyn ReverseGeocoder, coordinates: Coordinates) -> String {
    match geocoder.place_name(coordinates).await {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => coordinates.display_pair(),
        Err(e) => {
            warn!(error = %e, "reverse geocoding failed, using coordinates");
            coordinates.display_pair()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOSTON: Coordinates = Coordinates { lat: 42.360_081, lng: -71.058_88 };

    fn geocoder(server: &MockServer) -> HttpReverseGeocoder {
        HttpReverseGeocoder::new(server.uri(), Duration::from_millis(500), "parley-test")
    }

    #[tokio::test]
    async fn fixed_provider_reports_configured_coordinates() {
        let provider = FixedLocationProvider::new(Some(BOSTON));
        assert_eq!(provider.current_coordinates().await.unwrap(), BOSTON);
    }

    #[tokio::test]
    async fn fixed_provider_without_coordinates_is_unavailable() {
        let provider = FixedLocationProvider::from_settings(&LocationSettings::default());
        assert!(matches!(
            provider.current_coordinates().await,
            Err(EnrichmentFault::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn composes_city_state_country() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": {
                    "city": "Boston",
                    "state": "Massachusetts",
                    "country": "United States"
                }
            })))
            .mount(&server)
            .await;

        let name = geocoder(&server).place_name(BOSTON).await.unwrap();
        assert_eq!(name, "Boston, Massachusetts, United States");
    }

    #[tokio::test]
    async fn falls_through_locality_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": { "village": "Grafton", "country": "United States" }
            })))
            .mount(&server)
            .await;

        let name = geocoder(&server).place_name(BOSTON).await.unwrap();
        assert_eq!(name, "Grafton, United States");
    }

    #[tokio::test]
    async fn missing_address_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": "Unable to geocode" })))
            .mount(&server)
            .await;

        assert!(matches!(
            geocoder(&server).place_name(BOSTON).await,
            Err(EnrichmentFault::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn http_error_is_network_fault() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(
            geocoder(&server).place_name(BOSTON).await,
            Err(EnrichmentFault::Network(_))
        ));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        assert!(matches!(
            geocoder(&server).place_name(BOSTON).await,
            Err(EnrichmentFault::Timeout)
        ));
    }

    #[tokio::test]
    async fn resolve_falls_back_to_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let name = resolve_place_name(&geocoder(&server), BOSTON).await;
        assert_eq!(name, "42.3601, -71.0589");
    }
}
