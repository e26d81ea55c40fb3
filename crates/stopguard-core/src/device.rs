use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Stop id reported to the collector when `device_id` carries no numeric
/// `_<n>` suffix. This is the id of the stop the broker was first deployed
/// at; every fallback is logged at warn level.
pub const DEFAULT_BUS_STOP_ID: u32 = 450;

/// A WGS84 coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Identity of the stop this broker runs at.
///
/// Everything except `last_connection` is fixed at startup.
/// `last_connection` is written only by session transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub status: String,
    pub last_connection: Option<DateTime<Local>>,
    pub webex_enabled: bool,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            status: "online".into(),
            last_connection: None,
            webex_enabled: true,
        }
    }

    /// Numeric stop id derived from [`DeviceInfo::id`].
    pub fn bus_stop_id(&self) -> u32 {
        bus_stop_numeric_id(&self.id)
    }
}

/// Derive the collector's numeric stop id from a device id.
///
/// The id is split on `_` and the last segment parsed as an unsigned
/// integer (`"songkok_busstop_450"` gives `450`). An id without a `_`
/// separator, or whose last segment is not a number, yields
/// [`DEFAULT_BUS_STOP_ID`].
pub fn bus_stop_numeric_id(device_id: &str) -> u32 {
    let Some((_, suffix)) = device_id.rsplit_once('_') else {
        tracing::warn!(
            device_id,
            fallback = DEFAULT_BUS_STOP_ID,
            "device id has no numeric suffix, using fallback stop id"
        );
        return DEFAULT_BUS_STOP_ID;
    };

    match suffix.parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            tracing::warn!(
                device_id,
                suffix,
                fallback = DEFAULT_BUS_STOP_ID,
                "device id suffix is not numeric, using fallback stop id"
            );
            DEFAULT_BUS_STOP_ID
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_is_used() {
        assert_eq!(bus_stop_numeric_id("stop_450"), 450);
        assert_eq!(bus_stop_numeric_id("songkok_busstop_450"), 450);
        assert_eq!(bus_stop_numeric_id("stop_17"), 17);
    }

    #[test]
    fn non_numeric_suffix_falls_back() {
        assert_eq!(bus_stop_numeric_id("stop_notanumber"), DEFAULT_BUS_STOP_ID);
        assert_eq!(bus_stop_numeric_id("stop_-3"), DEFAULT_BUS_STOP_ID);
    }

    #[test]
    fn missing_suffix_falls_back() {
        assert_eq!(bus_stop_numeric_id("stop"), DEFAULT_BUS_STOP_ID);
        assert_eq!(bus_stop_numeric_id(""), DEFAULT_BUS_STOP_ID);
    }

    #[test]
    fn trailing_separator_falls_back() {
        assert_eq!(bus_stop_numeric_id("stop_"), DEFAULT_BUS_STOP_ID);
    }

    #[test]
    fn device_info_defaults() {
        let info = DeviceInfo::new("stop_12", "Main St", GeoPoint { lat: 1.0, lng: 2.0 });
        assert_eq!(info.status, "online");
        assert!(info.last_connection.is_none());
        assert!(info.webex_enabled);
        assert_eq!(info.bus_stop_id(), 12);
    }

    #[test]
    fn device_info_wire_shape() {
        let info = DeviceInfo::new("stop_12", "Main St", GeoPoint { lat: 37.5, lng: 127.0 });
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["id"], "stop_12");
        assert_eq!(json["location"]["lat"], 37.5);
        assert!(json["last_connection"].is_null());
        assert_eq!(json["webex_enabled"], true);
    }
}
