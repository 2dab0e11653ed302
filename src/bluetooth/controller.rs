//! Outbound interface to the radio controller.
//!
//! Every method here only *submits* a request. The controller answers later
//! through [`crate::server::Server::handle_event`] on its own execution
//! context. An `Err` return means the controller refused the request up
//! front and no completion event will follow.

use thiserror::Error;

use crate::bluetooth::{
   address::BdAddr,
   gatt::{ConnParams, CreateServiceRequest, GattIf},
};

/// Synchronous rejection of a controller request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{op} rejected by controller (rc={code:#x})")]
pub struct ControllerError {
   pub op: &'static str,
   pub code: i32,
}

impl ControllerError {
   pub const fn new(op: &'static str, code: i32) -> Self {
      Self { op, code }
   }
}

pub type ControllerResult = std::result::Result<(), ControllerError>;

/// Requests the GATT server core issues to the radio.
pub trait Controller: Send + Sync {
   /// Answered by `ServerEvent::Registered`.
   fn register_app(&self, app_id: u16) -> ControllerResult;

   /// Answered by `ServerEvent::ServiceCreated` echoing `request.token`.
   fn create_service(&self, gatts_if: GattIf, request: &CreateServiceRequest) -> ControllerResult;

   fn start_service(&self, service_handle: u16) -> ControllerResult;

   fn stop_service(&self, service_handle: u16) -> ControllerResult;

   fn delete_service(&self, service_handle: u16) -> ControllerResult;

   /// Answered by `ServerEvent::OpenComplete`.
   fn open(&self, gatts_if: GattIf, remote: BdAddr, direct: bool) -> ControllerResult;

   /// Answered by `ServerEvent::RssiRead`.
   fn read_rssi(&self, remote: BdAddr) -> ControllerResult;

   fn update_conn_params(&self, remote: BdAddr, params: &ConnParams) -> ControllerResult;

   fn start_advertising(&self) -> ControllerResult;
}
