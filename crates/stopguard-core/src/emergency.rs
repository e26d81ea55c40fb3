use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceInfo, GeoPoint};

/// Text attached to events raised by the physical button. Operators read
/// it on the collector dashboard, in the same locale as the stop names.
pub const DEFAULT_EMERGENCY_MESSAGE: &str = "비상 버튼이 눌렸습니다. 즉시 조치가 필요합니다.";

/// A canonical emergency event, built once per trigger and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub device_id: String,
    pub location_name: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Local>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(rename = "busStopId")]
    pub bus_stop_id: u32,
}

impl EmergencyEvent {
    /// Build an event for `device`, stamped with the stop-local clock.
    pub fn new(device: &DeviceInfo, message: impl Into<String>) -> Self {
        Self::at(device, message, Local::now())
    }

    pub fn at(device: &DeviceInfo, message: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            device_id: device.id.clone(),
            location_name: device.name.clone(),
            location: device.location,
            timestamp,
            kind: "emergency_button".into(),
            message: message.into(),
            bus_stop_id: device.bus_stop_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEFAULT_BUS_STOP_ID;

    fn device(id: &str) -> DeviceInfo {
        DeviceInfo::new(id, "Songkok", GeoPoint { lat: 37.54, lng: 127.07 })
    }

    #[test]
    fn event_copies_device_identity() {
        let event = EmergencyEvent::new(&device("songkok_busstop_450"), DEFAULT_EMERGENCY_MESSAGE);
        assert_eq!(event.device_id, "songkok_busstop_450");
        assert_eq!(event.location_name, "Songkok");
        assert_eq!(event.location.lat, 37.54);
        assert_eq!(event.bus_stop_id, 450);
        assert_eq!(event.kind, "emergency_button");
        assert_eq!(event.message, "비상 버튼이 눌렸습니다. 즉시 조치가 필요합니다.");
    }

    #[test]
    fn event_uses_fallback_stop_id() {
        let event = EmergencyEvent::new(&device("kiosk"), "help");
        assert_eq!(event.bus_stop_id, DEFAULT_BUS_STOP_ID);
    }

    #[test]
    fn wire_field_names() {
        let event = EmergencyEvent::new(&device("stop_7"), "help");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "emergency_button");
        assert_eq!(json["busStopId"], 7);
        assert_eq!(json["message"], "help");
        assert!(json["timestamp"].is_string());
        assert!(json.get("kind").is_none());
        assert!(json.get("bus_stop_id").is_none());
    }

    #[test]
    fn timestamp_is_taken_at_construction() {
        let before = Local::now();
        let event = EmergencyEvent::new(&device("stop_7"), "help");
        let after = Local::now();
        assert!(event.timestamp >= before && event.timestamp <= after);
    }
}
