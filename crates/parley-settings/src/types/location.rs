use serde::{Deserialize, Serialize};

/// Location enrichment settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationSettings {
    /// Whether to resolve a location at all.
    pub enabled: bool,
    /// Fixed latitude reported by the location provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Fixed longitude reported by the location provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Base URL of a Nominatim-compatible reverse geocoder.
    pub geocoder_url: String,
    /// Client-side timeout for geocoder requests.
    pub timeout_ms: u64,
    /// User agent sent to the geocoder.
    pub user_agent: String,
}

impl LocationSettings {
    /// Configured coordinates, when both halves are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            latitude: None,
            longitude: None,
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            timeout_ms: 5_000,
            user_agent: format!("parley/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
