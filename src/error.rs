//! Error types for the GATT server core.
//!
//! This module defines every error the server can surface to application
//! code: synchronous controller rejections, failed asynchronous completions,
//! misuse of the completion rendezvous and registry state violations.

use thiserror::Error;

use crate::bluetooth::{
   controller::ControllerError,
   gatt::{GattStatus, ServiceId},
};

/// Main error type for the GATT server.
#[derive(Error, Debug)]
pub enum GattsError {
   #[error("Controller error: {0}")]
   Controller(#[from] ControllerError),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("{op} completed with status {status}")]
   CompletionFailed { op: &'static str, status: GattStatus },

   #[error("Application is not registered with the controller")]
   NotRegistered,

   #[error("Application already registered")]
   AlreadyRegistered,

   #[error("Request timeout waiting for {0}")]
   RequestTimeout(&'static str),

   #[error("Rendezvous {0} waited on without being armed")]
   RendezvousNotArmed(&'static str),

   #[error("Rendezvous {0} already has a request in flight")]
   RendezvousBusy(&'static str),

   #[error("Service {0} has not been created by the controller")]
   ServiceNotCreated(ServiceId),

   #[error("Service {0} is already bound to handle {1:#06x}")]
   HandleAlreadyBound(ServiceId, u16),

   #[error("Service {0} must be stopped before removal")]
   ServiceNotStopped(ServiceId),

   #[error("Service {0} is not registered on this server")]
   ServiceNotFound(ServiceId),

   #[error("No pending service creation matches {0}")]
   UnmatchedCreation(ServiceId),

   #[error("Signal strength needs exactly one open connection, have {0}")]
   NotSingleConnection(u32),

   #[error("Invalid connection parameters: {0}")]
   InvalidConnParams(&'static str),

   #[error("Invalid address: {0}")]
   InvalidAddress(String),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `GattsError`.
pub type Result<T> = std::result::Result<T, GattsError>;
