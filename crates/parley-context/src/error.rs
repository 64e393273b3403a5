/// Failure to enrich the ambient context with a location.
///
/// Always recovered where it happens: the previous or default location is
/// kept and the fault is only logged.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentFault {
    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("geocoder request failed: {0}")]
    Network(String),

    #[error("geocoder request timed out")]
    Timeout,

    #[error("malformed geocoder response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for EnrichmentFault {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnrichmentFault::Timeout
        } else if e.is_decode() {
            EnrichmentFault::Malformed(e.to_string())
        } else {
            EnrichmentFault::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            EnrichmentFault::Unavailable("no fix".into()).to_string(),
            "location unavailable: no fix"
        );
        assert_eq!(EnrichmentFault::Timeout.to_string(), "geocoder request timed out");
    }
}
