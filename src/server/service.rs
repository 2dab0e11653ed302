//! Hosted GATT service object and its lifecycle.
//!
//! The attribute tree (characteristics, descriptors) lives outside this
//! crate. A service only tracks its controller-side lifecycle and hands
//! every server event to an optional [`AttributeHandler`].

use std::{
   fmt,
   sync::{Arc, OnceLock},
};

use crossbeam::atomic::AtomicCell;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::{
   bluetooth::{
      controller::Controller,
      gatt::{CreateServiceRequest, CreateToken, GattIf, ServiceId},
   },
   error::{GattsError, Result},
   event::ServerEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ServiceState {
   /// Requested, waiting for the controller to assign a handle.
   Pending,
   Created,
   Started,
   Stopped,
   Deleted,
}

/// Receives the server events forwarded to a service, for attribute-level
/// handling (reads, writes, characteristic and descriptor registration).
pub trait AttributeHandler: Send + Sync {
   fn handle_event(&self, service: &Service, event: &ServerEvent, gatts_if: GattIf);
}

pub struct Service {
   id: ServiceId,
   num_handles: u16,
   handle: OnceLock<u16>,
   state: AtomicCell<ServiceState>,
   controller: Arc<dyn Controller>,
   attributes: RwLock<Option<Arc<dyn AttributeHandler>>>,
}

impl fmt::Debug for Service {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Service")
         .field("id", &self.id)
         .field("num_handles", &self.num_handles)
         .field("handle", &self.handle.get())
         .field("state", &self.state.load())
         .finish_non_exhaustive()
   }
}

impl Service {
   pub(crate) fn new(id: ServiceId, num_handles: u16, controller: Arc<dyn Controller>) -> Self {
      Self {
         id,
         num_handles,
         handle: OnceLock::new(),
         state: AtomicCell::new(ServiceState::Pending),
         controller,
         attributes: RwLock::new(None),
      }
   }

   pub const fn id(&self) -> ServiceId {
      self.id
   }

   pub const fn uuid(&self) -> Uuid {
      self.id.uuid
   }

   pub const fn inst_id(&self) -> u8 {
      self.id.inst_id
   }

   pub const fn num_handles(&self) -> u16 {
      self.num_handles
   }

   /// Controller-assigned handle, once creation has been confirmed.
   pub fn handle(&self) -> Option<u16> {
      self.handle.get().copied()
   }

   pub fn state(&self) -> ServiceState {
      self.state.load()
   }

   pub fn is_stopped(&self) -> bool {
      matches!(self.state(), ServiceState::Stopped | ServiceState::Deleted)
   }

   pub fn set_attribute_handler(&self, handler: Arc<dyn AttributeHandler>) {
      *self.attributes.write() = Some(handler);
   }

   /// Submits the controller request that allocates this service.
   pub(crate) fn execute_create(&self, gatts_if: GattIf, token: CreateToken) -> Result<()> {
      debug!("{}: requesting creation ({} handles)", self.id, self.num_handles);
      let request = CreateServiceRequest {
         id: self.id,
         num_handles: self.num_handles,
         token,
      };
      self.controller.create_service(gatts_if, &request)?;
      Ok(())
   }

   pub(crate) fn bind_handle(&self, handle: u16) -> Result<()> {
      self
         .handle
         .set(handle)
         .map_err(|_| GattsError::HandleAlreadyBound(self.id, self.handle().unwrap_or(handle)))?;
      self.state.store(ServiceState::Created);
      Ok(())
   }

   pub fn start(&self) -> Result<()> {
      let handle = self.handle().ok_or(GattsError::ServiceNotCreated(self.id))?;
      match self.state() {
         ServiceState::Started => Ok(()),
         ServiceState::Deleted => Err(GattsError::ServiceNotCreated(self.id)),
         _ => {
            self.controller.start_service(handle)?;
            self.state.store(ServiceState::Started);
            debug!("{}: started", self.id);
            Ok(())
         },
      }
   }

   pub fn stop(&self) -> Result<()> {
      match self.state() {
         ServiceState::Started => {
            if let Some(handle) = self.handle() {
               self.controller.stop_service(handle)?;
            }
            self.state.store(ServiceState::Stopped);
            debug!("{}: stopped", self.id);
         },
         ServiceState::Pending | ServiceState::Created => {
            self.state.store(ServiceState::Stopped);
         },
         ServiceState::Stopped | ServiceState::Deleted => {},
      }
      Ok(())
   }

   /// Releases the controller-side service. The service must not be used
   /// afterwards.
   pub(crate) fn execute_delete(&self) -> Result<()> {
      if self.state() == ServiceState::Deleted {
         return Ok(());
      }
      if let Some(handle) = self.handle() {
         self.controller.delete_service(handle)?;
      }
      self.state.store(ServiceState::Deleted);
      debug!("{}: deleted", self.id);
      Ok(())
   }

   /// Applies lifecycle events addressed to this service, then forwards the
   /// event to the attribute handler.
   pub(crate) fn handle_event(&self, event: &ServerEvent, gatts_if: GattIf) {
      if event.service_handle().is_some() && event.service_handle() == self.handle() {
         self.apply_lifecycle(event);
      }

      if let ServerEvent::Write { handle, value, .. } = event {
         debug!("{}: write {handle:#06x} <- {}", self.id, hex::encode(value));
      }

      let handler = self.attributes.read().clone();
      if let Some(handler) = handler {
         handler.handle_event(self, event, gatts_if);
      }
   }

   fn apply_lifecycle(&self, event: &ServerEvent) {
      match *event {
         ServerEvent::ServiceStarted { status, .. } if !status.is_ok() => {
            warn!("{}: start failed with status {status}", self.id);
            let _ = self
               .state
               .compare_exchange(ServiceState::Started, ServiceState::Created);
         },
         ServerEvent::ServiceStopped { status, .. } if !status.is_ok() => {
            warn!("{}: stop failed with status {status}", self.id);
         },
         ServerEvent::ServiceDeleted { status, .. } => {
            if status.is_ok() {
               self.state.store(ServiceState::Deleted);
            } else {
               warn!("{}: delete failed with status {status}", self.id);
            }
         },
         _ => {},
      }
   }
}
