use serde::{Deserialize, Serialize};

/// Fixed origin token for every generated route.
pub const ORIGIN: &str = "Current location";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MapProvider {
    AppleMaps,
    GoogleMaps,
}

impl MapProvider {
    /// Maximum number of waypoints the provider's deep-link format accepts.
    pub fn stop_limit(&self) -> usize {
        match self {
            MapProvider::AppleMaps => 14,
            MapProvider::GoogleMaps => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MapProvider::AppleMaps => "AppleMaps",
            MapProvider::GoogleMaps => "GoogleMaps",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AppleMaps" => Some(MapProvider::AppleMaps),
            "GoogleMaps" => Some(MapProvider::GoogleMaps),
            _ => None,
        }
    }
}

/// Builds the provider deep-link for the given stops.
///
/// Formats are bit-exact contracts with the providers; every stop is
/// percent-encoded individually before joining, and the origin is always the
/// literal `"Current location"`.
pub fn build_link(provider: MapProvider, stops: &[String]) -> String {
    let origin = urlencoding::encode(ORIGIN);
    let encoded: Vec<String> = stops
        .iter()
        .map(|stop| urlencoding::encode(stop).into_owned())
        .collect();

    match provider {
        MapProvider::AppleMaps => format!(
            "http://maps.apple.com?saddr={origin}&daddr={}&dirflg=d",
            encoded.join("+to:")
        ),
        MapProvider::GoogleMaps => format!(
            "https://www.google.com/maps/dir/{origin}/{}/data=!4m2!4m1!3e0",
            encoded.join("/")
        ),
    }
}
