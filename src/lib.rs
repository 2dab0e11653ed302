//! Blocking BLE GATT server core
//!
//! This crate exposes a synchronous, blocking API for hosting GATT services
//! on top of a radio controller that only speaks in asynchronous completion
//! events. Application threads call into [`Server`]; the controller delivers
//! its events through [`Server::handle_event`].

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod event;
pub mod server;

pub use bluetooth::{
   address::BdAddr,
   controller::{Controller, ControllerError, ControllerResult},
   gatt::{ATT_DEFAULT_MTU, ConnParams, GattIf, GattStatus, ServiceId, uuid16},
};
pub use config::ServerConfig;
pub use error::{GattsError, Result};
pub use event::{ConnectInfo, EventKind, LoggingCallbacks, ServerCallbacks, ServerEvent};
pub use server::{
   RegistrationState, Server,
   connections::PeerConnection,
   service::{AttributeHandler, Service, ServiceState},
};
