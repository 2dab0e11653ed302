//! GATT server core: the blocking application API on top of an
//! event-driven controller.
//!
//! Each blocking call submits a request through [`Controller`] and parks on
//! a [`Rendezvous`] until [`Server::handle_event`], running on the
//! controller's context, delivers the matching completion.

use std::{
   collections::HashMap,
   sync::{
      Arc,
      atomic::{AtomicU32, Ordering},
   },
};

use crossbeam::atomic::AtomicCell;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
   bluetooth::{
      address::BdAddr,
      controller::Controller,
      gatt::{ConnParams, CreateToken, GattIf, GattStatus, ServiceId},
   },
   config::ServerConfig,
   error::{GattsError, Result},
   event::CallbackRef,
};

pub mod connections;
mod dispatch;
pub mod registry;
pub mod rendezvous;
pub mod service;


use connections::{ConnectionTable, PeerConnection};
use registry::{InsertOutcome, ServiceRegistry};
use rendezvous::Rendezvous;
use service::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum RegistrationState {
   Unregistered,
   Registering,
   Registered,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
   status: GattStatus,
   gatts_if: GattIf,
}

#[derive(Debug, Clone, Copy)]
struct Creation {
   token: CreateToken,
   status: GattStatus,
   service_handle: u16,
}

#[derive(Debug, Clone, Copy)]
struct RssiReading {
   status: GattStatus,
   rssi: i8,
}

/// A GATT server bound to one controller.
///
/// Blocking methods must not be called from the controller's event context
/// (including [`crate::event::ServerCallbacks`]), since the completion they
/// wait for is delivered on that same context.
pub struct Server {
   controller: Arc<dyn Controller>,
   config: ServerConfig,
   services: ServiceRegistry,
   peers: ConnectionTable,
   connected_count: AtomicU32,
   app_id: AtomicCell<Option<u16>>,
   gatts_if: AtomicCell<Option<GattIf>>,
   registration: AtomicCell<RegistrationState>,
   peer_address: AtomicCell<Option<BdAddr>>,
   conn_id: AtomicCell<Option<u16>>,
   callbacks: RwLock<Option<CallbackRef>>,
   next_token: AtomicU32,
   unmatched_creations: AtomicU32,
   // Held for a whole creation, including withdrawal after a failed wait.
   create_lock: Mutex<()>,
   // Token of the creation request a caller is currently waiting on.
   creating: Mutex<Option<CreateToken>>,

   register_evt: Rendezvous<Registration>,
   create_evt: Rendezvous<Creation>,
   open_evt: Rendezvous<GattStatus>,
   rssi_evt: Rendezvous<RssiReading>,
}

impl Server {
   pub fn new(controller: Arc<dyn Controller>, config: ServerConfig) -> Arc<Self> {
      Arc::new(Self {
         controller,
         config,
         services: ServiceRegistry::new(),
         peers: ConnectionTable::new(),
         connected_count: AtomicU32::new(0),
         app_id: AtomicCell::new(None),
         gatts_if: AtomicCell::new(None),
         registration: AtomicCell::new(RegistrationState::Unregistered),
         peer_address: AtomicCell::new(None),
         conn_id: AtomicCell::new(None),
         callbacks: RwLock::new(None),
         next_token: AtomicU32::new(1),
         unmatched_creations: AtomicU32::new(0),
         create_lock: Mutex::new(()),
         creating: Mutex::new(None),
         register_evt: Rendezvous::new("app-register"),
         create_evt: Rendezvous::new("service-create"),
         open_evt: Rendezvous::new("open"),
         rssi_evt: Rendezvous::new("read-rssi"),
      })
   }

   pub fn set_callbacks(&self, callbacks: CallbackRef) {
      *self.callbacks.write() = Some(callbacks);
   }

   fn callbacks(&self) -> Option<CallbackRef> {
      self.callbacks.read().clone()
   }

   pub const fn config(&self) -> &ServerConfig {
      &self.config
   }

   /// Registers the configured application id.
   pub fn register(&self) -> Result<GattIf> {
      self.register_app(self.config.app_id)
   }

   /// Registers `app_id` with the controller and waits for the interface id.
   pub fn register_app(&self, app_id: u16) -> Result<GattIf> {
      debug!(">> register_app {app_id}");
      if self
         .registration
         .compare_exchange(RegistrationState::Unregistered, RegistrationState::Registering)
         .is_err()
      {
         return Err(GattsError::AlreadyRegistered);
      }
      self.app_id.store(Some(app_id));

      let result = self
         .register_evt
         .transact(self.config.request_timeout(), || {
            self.controller.register_app(app_id)?;
            Ok(())
         })
         .and_then(|reg| reg.status.check("register_app").map(|()| reg.gatts_if));

      match result {
         Ok(gatts_if) => {
            debug!("<< register_app {app_id}: interface {gatts_if}");
            Ok(gatts_if)
         },
         Err(e) => {
            match self
               .registration
               .compare_exchange(RegistrationState::Registering, RegistrationState::Unregistered)
            {
               // Completed just as the wait gave up.
               Err(RegistrationState::Registered) => return self.gatts_if(),
               _ => self.app_id.store(None),
            }
            warn!("<< register_app {app_id}: {e}");
            Err(e)
         },
      }
   }

   /// Creates a service and waits until the controller assigns its handle.
   ///
   /// Calls are serialized, so each completion is attributed to the request
   /// that produced it. Completions for earlier, abandoned requests are
   /// counted in [`Self::unmatched_creations`] and never bind a handle.
   pub fn create_service(&self, uuid: Uuid, num_handles: u16, inst_id: u8) -> Result<Arc<Service>> {
      debug!(">> create_service {uuid}#{inst_id}");
      let gatts_if = self.gatts_if()?;
      let service = Arc::new(Service::new(
         ServiceId::new(uuid, inst_id),
         num_handles,
         self.controller.clone(),
      ));
      let token = CreateToken(self.next_token.fetch_add(1, Ordering::Relaxed));

      let _create = self.create_lock.lock();
      let result = self
         .create_evt
         .transact(self.config.request_timeout(), || {
            if self.services.insert(service.clone()) == InsertOutcome::DuplicateUuid {
               warn!("create_service: a service with uuid {uuid} already exists");
            }
            self.services.insert_pending(token, service.clone());
            *self.creating.lock() = Some(token);
            service.execute_create(gatts_if, token)
         })
         .and_then(|creation| {
            if creation.token != token {
               return Err(GattsError::UnmatchedCreation(service.id()));
            }
            creation.status.check("create_service")?;
            match service.handle() {
               Some(_) => Ok(creation),
               None => Err(GattsError::ServiceNotCreated(service.id())),
            }
         });

      match result {
         Ok(creation) => {
            *self.creating.lock() = None;
            debug!(
               "<< create_service {}: handle {:#06x}",
               service.id(),
               creation.service_handle
            );
            Ok(service)
         },
         Err(e) => {
            self.withdraw_creation(token, &service);
            warn!("<< create_service {}: {e}", service.id());
            Err(e)
         },
      }
   }

   /// Forgets an abandoned creation request. A completion for `token`
   /// arriving later is treated as unmatched.
   fn withdraw_creation(&self, token: CreateToken, service: &Arc<Service>) {
      *self.creating.lock() = None;
      self.services.take_pending(token);
      match self.services.detach(service) {
         // Never inserted when arming failed.
         Ok(()) | Err(GattsError::ServiceNotFound(_)) => {},
         Err(e) => warn!("create_service {}: {e}", service.id()),
      }
   }

   /// Stops and deletes `service`, then drops it from the registry.
   pub fn remove_service(&self, service: &Arc<Service>) -> Result<()> {
      debug!(">> remove_service {}", service.id());
      service.stop()?;
      service.execute_delete()?;
      self.services.remove(service)
   }

   /// Opens a direct connection to `remote` from the server side.
   ///
   /// Returns `Ok(false)` when the controller accepted the request but the
   /// open completed with a failure status.
   pub fn connect(&self, remote: BdAddr) -> Result<bool> {
      debug!(">> connect {remote}");
      let gatts_if = self.gatts_if()?;
      let status = self.open_evt.transact(self.config.request_timeout(), || {
         self.controller.open(gatts_if, remote, true)?;
         Ok(())
      })?;
      debug!("<< connect {remote}: status {status}");
      Ok(status.is_ok())
   }

   /// Reads the RSSI of the sole connected peer.
   ///
   /// Only defined with exactly one open connection; otherwise fails with
   /// [`GattsError::NotSingleConnection`].
   pub fn read_rssi(&self) -> Result<i8> {
      let count = self.connected_count();
      if count != 1 {
         debug!("read_rssi: {count} devices connected");
         return Err(GattsError::NotSingleConnection(count));
      }
      let peer = self
         .peers
         .sole_peer()
         .ok_or(GattsError::NotSingleConnection(self.peers.len() as u32))?;

      let reading = self.rssi_evt.transact(self.config.request_timeout(), || {
         self.controller.read_rssi(peer.address)?;
         Ok(())
      })?;
      reading.status.check("read_rssi")?;
      debug!("read_rssi {}: {} dBm", peer.address, reading.rssi);
      Ok(reading.rssi)
   }

   /// Requests new connection parameters for `remote`. Does not wait for
   /// the update to take effect.
   pub fn update_conn_params(&self, remote: BdAddr, params: ConnParams) -> Result<()> {
      params.validate()?;
      self.controller.update_conn_params(remote, &params)?;
      debug!("update_conn_params {remote}: {params:?}");
      Ok(())
   }

   pub fn start_advertising(&self) -> Result<()> {
      debug!(">> start_advertising");
      self.controller.start_advertising()?;
      Ok(())
   }

   pub fn registration_state(&self) -> RegistrationState {
      self.registration.load()
   }

   pub fn app_id(&self) -> Option<u16> {
      self.app_id.load()
   }

   /// Interface id assigned at registration.
   pub fn gatts_if(&self) -> Result<GattIf> {
      self.gatts_if.load().ok_or(GattsError::NotRegistered)
   }

   pub fn connected_count(&self) -> u32 {
      self.connected_count.load(Ordering::SeqCst)
   }

   /// Address of the most recently connected peer.
   pub fn peer_address(&self) -> Option<BdAddr> {
      self.peer_address.load()
   }

   /// Connection id of the most recently connected peer.
   pub fn conn_id(&self) -> Option<u16> {
      self.conn_id.load()
   }

   pub fn peer(&self, conn_id: u16) -> Option<PeerConnection> {
      self.peers.get(conn_id)
   }

   pub fn peer_mtu(&self, conn_id: u16) -> Option<u16> {
      self.peers.get(conn_id).map(|p| p.mtu)
   }

   pub fn peer_devices(&self) -> HashMap<u16, PeerConnection> {
      self.peers.snapshot()
   }

   pub fn service_by_uuid(&self, uuid: Uuid) -> Option<Arc<Service>> {
      self.services.lookup_by_uuid(uuid)
   }

   pub fn service_by_id(&self, uuid: Uuid, inst_id: u8) -> Option<Arc<Service>> {
      self.services.lookup_by_id(uuid, inst_id)
   }

   pub fn service_by_handle(&self, handle: u16) -> Option<Arc<Service>> {
      self.services.lookup_by_handle(handle)
   }

   /// Creation events the server could not pair with a pending request.
   pub fn unmatched_creations(&self) -> u32 {
      self.unmatched_creations.load(Ordering::Relaxed)
   }

   /// Converts the server state to a JSON representation.
   pub fn to_json(&self) -> serde_json::Value {
      let mut peers: Vec<_> = self.peers.snapshot().into_values().collect();
      peers.sort_by_key(|p| p.conn_id);

      let services: Vec<_> = self
         .services
         .snapshot()
         .iter()
         .map(|s| {
            json!({
               "uuid": s.uuid(),
               "inst_id": s.inst_id(),
               "handle": s.handle(),
               "state": s.state(),
            })
         })
         .collect();

      json!({
         "app_id": self.app_id(),
         "gatts_if": self.gatts_if.load(),
         "registration": self.registration_state(),
         "connected_count": self.connected_count(),
         "peer_address": self.peer_address(),
         "peers": peers,
         "services": services,
      })
   }
}
