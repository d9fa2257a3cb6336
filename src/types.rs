//! Core types for the tracklet capture pipeline
//!
//! This module defines the session record sent once per page load and the
//! environment value types the probes classify into. Optional fields are
//! serialized by omission, never as null: an undetected browser, a missing
//! UTM tag or a failed geolocation lookup simply leave no key behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe;

/// Device class derived from the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Desktop,
    Tablet,
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "Desktop",
            DeviceType::Tablet => "Tablet",
            DeviceType::Mobile => "Mobile",
        }
    }
}

/// Browser family, first user-agent substring match wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Edge,
    Opera,
    Chrome,
    Firefox,
    Safari,
}

/// Operating system family, first user-agent substring match wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
}

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Scroll offset of the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Campaign attribution tags read from the landing URL query.
///
/// Populated only when at least one tag is present; callers must not assume
/// all five keys exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl UtmParameters {
    /// True when no tag was present at all
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }
}

/// Approximate visitor location resolved from the IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Successful geolocation lookup result
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFacts {
    pub ip_address: String,
    pub location: GeoLocation,
}

/// Snapshot of the host page state the probes read.
///
/// The embedding host fills this in once per page load; the pipeline never
/// touches browser globals directly, which keeps every probe a pure function
/// over plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    /// Raw user agent string, if the host exposes one
    pub user_agent: Option<String>,
    /// Viewport dimensions at load time
    pub viewport: Viewport,
    /// Full page URL including the query string
    pub page_url: String,
    /// Referrer URL; empty referrers are absent
    #[serde(default)]
    pub referrer: Option<String>,
    /// Preferred interface language
    #[serde(default)]
    pub language: Option<String>,
    /// Whether the host exposes the Microsoft media-stream marker
    #[serde(default)]
    pub microsoft_stream: bool,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            user_agent: None,
            viewport: Viewport::default(),
            page_url: "http://localhost/".to_string(),
            referrer: None,
            language: None,
            microsoft_stream: false,
        }
    }
}

/// The per-page-load session record.
///
/// Composed once after the connection is established and immutable afterwards,
/// except for `identifier` which the collector assigns asynchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Visitor identifier persisted across page loads, server-assigned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub device_type: DeviceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_parameters: Option<UtmParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<OperatingSystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<Browser>,
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Path of the page the visitor landed on
    pub landing_page: String,
    /// Page the visitor came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_page: Option<String>,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// When the session record was composed
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Compose the session record from the environment snapshot, the
    /// persisted identifier and the one-shot geolocation result.
    ///
    /// Every input that could not be derived stays absent; composition
    /// itself cannot fail.
    pub fn compose(
        env: &EnvironmentSnapshot,
        identifier: Option<String>,
        geo: Option<GeoFacts>,
    ) -> Self {
        let ua = env.user_agent.as_deref();
        let (ip_address, location) = match geo {
            Some(facts) => (Some(facts.ip_address), Some(facts.location)),
            None => (None, None),
        };

        Session {
            identifier,
            device_type: probe::device_type(ua, env.microsoft_stream),
            utm_parameters: probe::utm_parameters(&env.page_url),
            operating_system: probe::operating_system(ua, env.microsoft_stream),
            browser: probe::browser(ua),
            viewport: env.viewport,
            language: env.language.clone(),
            landing_page: probe::landing_page(&env.page_url),
            origin_page: env.referrer.clone().filter(|r| !r.is_empty()),
            domain: probe::domain(&env.page_url),
            ip_address,
            location,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn desktop_env() -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                    .to_string(),
            ),
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            page_url: "https://shop.example.com/landing?utm_source=ads".to_string(),
            referrer: Some("https://search.example.net/".to_string()),
            language: Some("en-US".to_string()),
            microsoft_stream: false,
        }
    }

    #[test]
    fn test_compose_fills_environment_facts() {
        let session = Session::compose(&desktop_env(), Some("visitor-1".to_string()), None);

        assert_eq!(session.identifier.as_deref(), Some("visitor-1"));
        assert_eq!(session.device_type, DeviceType::Desktop);
        assert_eq!(session.browser, Some(Browser::Chrome));
        assert_eq!(session.operating_system, Some(OperatingSystem::Windows));
        assert_eq!(session.domain, "shop.example.com");
        assert_eq!(session.landing_page, "/landing");
        assert_eq!(session.origin_page.as_deref(), Some("https://search.example.net/"));
    }

    #[test]
    fn test_failed_lookup_leaves_no_keys() {
        let session = Session::compose(&desktop_env(), None, None);
        let json = serde_json::to_value(&session).unwrap();

        let object = json.as_object().unwrap();
        assert!(!object.contains_key("ipAddress"));
        assert!(!object.contains_key("location"));
        assert!(!object.contains_key("identifier"));
    }

    #[test]
    fn test_successful_lookup_is_split_into_fields() {
        let geo = GeoFacts {
            ip_address: "203.0.113.9".to_string(),
            location: GeoLocation {
                country: "Romania".to_string(),
                city: "Bucharest".to_string(),
                latitude: 44.43225,
                longitude: 26.10626,
            },
        };

        let session = Session::compose(&desktop_env(), None, Some(geo));
        assert_eq!(session.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(session.location.unwrap().city, "Bucharest");
    }

    #[test]
    fn test_empty_referrer_is_absent() {
        let mut env = desktop_env();
        env.referrer = Some(String::new());

        let session = Session::compose(&env, None, None);
        assert!(session.origin_page.is_none());
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let session = Session::compose(&desktop_env(), None, None);
        let json = serde_json::to_value(&session).unwrap();

        assert_eq!(json["deviceType"], "Desktop");
        assert_eq!(json["browser"], "chrome");
        assert_eq!(json["operatingSystem"], "windows");
        assert_eq!(json["landingPage"], "/landing");
        assert_eq!(json["utmParameters"]["source"], "ads");
    }
}
