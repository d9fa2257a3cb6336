//! One-shot geolocation lookup
//!
//! Resolves the visitor's approximate location and public IP address from an
//! ip-api style endpoint. The lookup runs once per session start, is never
//! retried, and on any failure (network, non-2xx, non-success status,
//! malformed body) resolves to absence so session composition is never
//! blocked.

use serde::Deserialize;

use crate::types::{GeoFacts, GeoLocation};

/// Default lookup endpoint, requesting exactly the fields the session needs
pub const DEFAULT_GEO_ENDPOINT: &str =
    "http://ip-api.com/json?fields=status,country,city,lat,lon,query";

/// Raw lookup response; every field but `status` is optional
#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    query: Option<String>,
}

impl GeoResponse {
    /// Map the response to session facts; anything short of a complete
    /// success answer is absence.
    fn into_facts(self) -> Option<GeoFacts> {
        if self.status != "success" {
            return None;
        }

        Some(GeoFacts {
            ip_address: self.query?,
            location: GeoLocation {
                country: self.country?,
                city: self.city?,
                latitude: self.lat?,
                longitude: self.lon?,
            },
        })
    }
}

/// Client for the one-shot lookup
#[derive(Debug, Clone)]
pub struct LocationResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl LocationResolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Perform the lookup. Single invocation per session; failures resolve
    /// to `None` and are only visible in the logs.
    pub async fn resolve(&self) -> Option<GeoFacts> {
        match self.fetch().await {
            Ok(facts) => facts,
            Err(error) => {
                tracing::debug!(%error, "geolocation lookup failed");
                None
            }
        }
    }

    async fn fetch(&self) -> Result<Option<GeoFacts>, reqwest::Error> {
        let response = self.client.get(&self.endpoint).send().await?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "geolocation endpoint unavailable");
            return Ok(None);
        }

        let body: GeoResponse = response.json().await?;
        Ok(body.into_facts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_response_maps_to_facts() {
        let response: GeoResponse = serde_json::from_str(
            r#"{"status":"success","country":"Romania","city":"Bucharest",
                "lat":44.43225,"lon":26.10626,"query":"203.0.113.9"}"#,
        )
        .unwrap();

        let facts = response.into_facts().unwrap();
        assert_eq!(facts.ip_address, "203.0.113.9");
        assert_eq!(facts.location.country, "Romania");
        assert_eq!(facts.location.city, "Bucharest");
    }

    #[test]
    fn test_fail_status_resolves_to_absence() {
        let response: GeoResponse =
            serde_json::from_str(r#"{"status":"fail","query":"203.0.113.9"}"#).unwrap();
        assert!(response.into_facts().is_none());
    }

    #[test]
    fn test_incomplete_success_resolves_to_absence() {
        let response: GeoResponse =
            serde_json::from_str(r#"{"status":"success","country":"Romania"}"#).unwrap();
        assert!(response.into_facts().is_none());
    }
}
