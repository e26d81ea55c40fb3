//! # stopguard-server
//!
//! Websocket broker for one bus-stop device. Viewers (kiosk screens)
//! connect on `/ws`, a single remote operator on `/ws/admin`.
//!
//! - [`registry`]: viewer set, operator slot, fan-out
//! - [`session`]: call-session flag and device record
//! - [`router`]: inbound envelopes to handlers
//! - [`dispatcher`]: emergency forward to the collector plus local fan-out
//! - [`server`]: axum routes and listener

#![deny(unsafe_code)]

pub mod call_control;
pub mod collector;
pub mod connection;
pub mod dispatcher;
pub mod health;
pub mod liveness;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod socket;

pub use call_control::{CallControl, DisabledCallControl, HttpCallControl};
pub use collector::{CollectorClient, HttpCollector};
pub use dispatcher::{EmergencyDispatcher, TriggerOrigin};
pub use registry::{Audience, ConnectionRegistry};
pub use server::{AppState, StopServer};
pub use shutdown::{DrainOutcome, ShutdownCoordinator};
