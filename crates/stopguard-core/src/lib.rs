//! Shared types for the stop broker: identifiers, device identity,
//! emergency events, the websocket envelope and the error taxonomy.

pub mod device;
pub mod emergency;
pub mod envelope;
pub mod errors;
pub mod ids;

pub use device::{bus_stop_numeric_id, DeviceInfo, GeoPoint, DEFAULT_BUS_STOP_ID};
pub use emergency::EmergencyEvent;
pub use envelope::{Inbound, Outbound, Role};
pub use errors::BrokerError;
pub use ids::ConnId;
