//! Environment probes
//!
//! Pure, synchronous readers of host page state. Each probe either returns a
//! concrete value or an explicit absence; none of them may fail. Browser and
//! operating system classification is a fixed ordered set of substring tests
//! where the first match wins, so the tables below are order-sensitive.

use url::Url;

use crate::types::{Browser, DeviceType, OperatingSystem, UtmParameters};

/// iOS-family marker, matched case-sensitively against the raw user agent
fn ios_family(user_agent: &str) -> bool {
    user_agent.contains("iPad") || user_agent.contains("iPhone") || user_agent.contains("iPod")
}

/// Classify the device from the user agent.
///
/// Android maps to Mobile, the iOS family (absent the Microsoft stream
/// marker) to Tablet, everything else, including an unknown agent, to
/// Desktop.
pub fn device_type(user_agent: Option<&str>, microsoft_stream: bool) -> DeviceType {
    let Some(ua) = user_agent else {
        return DeviceType::Desktop;
    };

    if ua.to_lowercase().contains("android") {
        return DeviceType::Mobile;
    }

    if ios_family(ua) && !microsoft_stream {
        return DeviceType::Tablet;
    }

    DeviceType::Desktop
}

/// Classify the browser from the user agent; `None` when nothing matches.
pub fn browser(user_agent: Option<&str>) -> Option<Browser> {
    let ua = user_agent?.to_lowercase();

    // Order matters: Chrome ships "safari" in its agent, Edge ships "chrome".
    if ua.contains("edge") {
        Some(Browser::Edge)
    } else if ua.contains("opr") {
        Some(Browser::Opera)
    } else if ua.contains("chrome") {
        Some(Browser::Chrome)
    } else if ua.contains("firefox") {
        Some(Browser::Firefox)
    } else if ua.contains("safari") {
        Some(Browser::Safari)
    } else {
        None
    }
}

/// Classify the operating system from the user agent; `None` when nothing
/// matches.
pub fn operating_system(
    user_agent: Option<&str>,
    microsoft_stream: bool,
) -> Option<OperatingSystem> {
    let raw = user_agent?;
    let ua = raw.to_lowercase();

    if ua.contains("windows") {
        Some(OperatingSystem::Windows)
    } else if ua.contains("mac") {
        Some(OperatingSystem::MacOs)
    } else if ua.contains("linux") {
        Some(OperatingSystem::Linux)
    } else if ua.contains("android") {
        Some(OperatingSystem::Android)
    } else if ios_family(raw) && !microsoft_stream {
        Some(OperatingSystem::Ios)
    } else {
        None
    }
}

/// Read the five fixed campaign tags from the page URL query.
///
/// Returns a mapping only when at least one tag carries a non-empty value.
pub fn utm_parameters(page_url: &str) -> Option<UtmParameters> {
    let url = Url::parse(page_url).ok()?;
    let mut tags = UtmParameters::default();

    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        let value = value.into_owned();
        match key.as_ref() {
            "utm_source" => tags.source = Some(value),
            "utm_medium" => tags.medium = Some(value),
            "utm_campaign" => tags.campaign = Some(value),
            "utm_term" => tags.term = Some(value),
            "utm_content" => tags.content = Some(value),
            _ => {}
        }
    }

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Path of the page the visitor landed on; an unparseable URL degrades to `/`.
pub fn landing_page(page_url: &str) -> String {
    Url::parse(page_url)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

/// Hostname serving the page; an unparseable URL degrades to an empty domain.
pub fn domain(page_url: &str) -> String {
    Url::parse(page_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default()
}
