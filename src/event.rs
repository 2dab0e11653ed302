//! Controller events and application callbacks.
//!
//! This module defines the events the radio delivers to the server and the
//! callback interface the server uses to notify application code about
//! peers coming and going.

use std::sync::Arc;

use log::debug;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::{
   bluetooth::{
      address::BdAddr,
      gatt::{CreateToken, GattIf, GattStatus, ServiceId},
   },
   server::Server,
};

/// Attribute value payload carried by write events.
pub type Payload = SmallVec<[u8; 32]>;

/// Details of a newly established link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectInfo {
   pub conn_id: u16,
   pub remote: BdAddr,
   pub interval: u16,
   pub latency: u16,
   pub timeout: u16,
}

/// Events delivered by the controller on its own execution context.
#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(EventKind), derive(strum::Display, strum::IntoStaticStr, Hash))]
pub enum ServerEvent {
   Registered {
      status: GattStatus,
      app_id: u16,
      gatts_if: GattIf,
   },
   ServiceCreated {
      status: GattStatus,
      service_handle: u16,
      service_id: ServiceId,
      token: Option<CreateToken>,
   },
   ServiceStarted {
      status: GattStatus,
      service_handle: u16,
   },
   ServiceStopped {
      status: GattStatus,
      service_handle: u16,
   },
   ServiceDeleted {
      status: GattStatus,
      service_handle: u16,
   },
   CharacteristicAdded {
      status: GattStatus,
      attr_handle: u16,
      service_handle: u16,
      char_uuid: Uuid,
   },
   DescriptorAdded {
      status: GattStatus,
      attr_handle: u16,
      service_handle: u16,
      descr_uuid: Uuid,
   },
   MtuChanged {
      conn_id: u16,
      mtu: u16,
   },
   Connected(ConnectInfo),
   Disconnected {
      conn_id: u16,
      remote: BdAddr,
      reason: u16,
   },
   OpenComplete {
      status: GattStatus,
   },
   RssiRead {
      status: GattStatus,
      rssi: i8,
      remote: BdAddr,
   },
   Read {
      conn_id: u16,
      trans_id: u32,
      remote: BdAddr,
      handle: u16,
      offset: u16,
      is_long: bool,
      need_rsp: bool,
   },
   Write {
      conn_id: u16,
      trans_id: u32,
      remote: BdAddr,
      handle: u16,
      offset: u16,
      need_rsp: bool,
      is_prep: bool,
      value: Payload,
   },
   /// Event kinds the core has no model for; forwarded untouched.
   Other {
      kind: u16,
   },
}

impl ServerEvent {
   pub fn kind(&self) -> EventKind {
      self.into()
   }

   /// Service handle the event refers to, for service-scoped events.
   pub const fn service_handle(&self) -> Option<u16> {
      match self {
         Self::ServiceCreated { service_handle, .. }
         | Self::ServiceStarted { service_handle, .. }
         | Self::ServiceStopped { service_handle, .. }
         | Self::ServiceDeleted { service_handle, .. }
         | Self::CharacteristicAdded { service_handle, .. }
         | Self::DescriptorAdded { service_handle, .. } => Some(*service_handle),
         _ => None,
      }
   }
}

/// Server-level notifications for application code.
///
/// All methods default to logging only. They run on the controller context
/// and must not block on server operations that wait for further events.
pub trait ServerCallbacks: Send + Sync {
   fn on_connect(&self, server: &Server) {
      debug!(
         "on_connect (default): {} peer(s) connected",
         server.connected_count()
      );
   }

   fn on_connect_with_info(&self, _server: &Server, info: &ConnectInfo) {
      debug!(
         "on_connect (default): conn {} from {}",
         info.conn_id, info.remote
      );
   }

   fn on_disconnect(&self, server: &Server) {
      debug!(
         "on_disconnect (default): {} peer(s) connected",
         server.connected_count()
      );
   }
}

/// Callback set that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallbacks;

impl ServerCallbacks for LoggingCallbacks {}

/// Type alias for a shared callback object.
pub type CallbackRef = Arc<dyn ServerCallbacks>;
