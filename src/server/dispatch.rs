//! Controller event dispatch.
//!
//! Runs on the controller's execution context. Updates the registries,
//! notifies application callbacks, releases blocked callers and finally
//! forwards every event to each hosted service.

use std::sync::atomic::Ordering;

use log::{debug, error, info, warn};

use crate::{
   bluetooth::gatt::{CreateToken, GattIf, GattStatus, ServiceId},
   error::{GattsError, Result},
   event::{ConnectInfo, ServerEvent},
   server::{Creation, Registration, RegistrationState, RssiReading, Server},
};

impl Server {
   /// Entry point for every server-level controller event.
   pub fn handle_event(&self, event: &ServerEvent) {
      let kind = event.kind();
      debug!(">> handle_event: {kind}");

      if let Err(e) = self.dispatch(event) {
         error!("{kind}: {e}");
      }

      let gatts_if = self.gatts_if.load().unwrap_or(GattIf::NONE);
      for service in self.services.snapshot() {
         service.handle_event(event, gatts_if);
      }

      debug!("<< handle_event: {kind}");
   }

   fn dispatch(&self, event: &ServerEvent) -> Result<()> {
      match *event {
         ServerEvent::Registered {
            status,
            app_id,
            gatts_if,
         } => self.on_registered(status, app_id, gatts_if),
         ServerEvent::ServiceCreated {
            status,
            service_handle,
            service_id,
            token,
         } => self.on_service_created(status, service_handle, service_id, token),
         ServerEvent::MtuChanged { conn_id, mtu } => {
            if self.peers.on_mtu_negotiated(conn_id, mtu) {
               debug!("conn {conn_id}: MTU {mtu}");
            }
            Ok(())
         },
         ServerEvent::Connected(ref info) => {
            self.on_connected(info);
            Ok(())
         },
         ServerEvent::Disconnected {
            conn_id,
            remote,
            reason,
         } => {
            debug!("conn {conn_id}: {remote} disconnected (reason {reason:#x})");
            self.on_disconnected(conn_id);
            Ok(())
         },
         ServerEvent::OpenComplete { status } => {
            self.open_evt.signal(status);
            Ok(())
         },
         ServerEvent::RssiRead { status, rssi, remote } => {
            debug!("rssi {remote}: {rssi} (status {status})");
            self.rssi_evt.signal(RssiReading { status, rssi });
            Ok(())
         },
         _ => Ok(()),
      }
   }

   fn on_registered(&self, status: GattStatus, app_id: u16, gatts_if: GattIf) -> Result<()> {
      if self.registration.load() != RegistrationState::Registering
         || self.app_id.load() != Some(app_id)
      {
         debug!("registration of app {app_id} not pending, ignored");
         return Ok(());
      }

      if status.is_ok() {
         self.gatts_if.store(Some(gatts_if));
         if self
            .registration
            .compare_exchange(RegistrationState::Registering, RegistrationState::Registered)
            .is_ok()
         {
            info!("app {app_id} registered on interface {gatts_if}");
         }
      }
      self.register_evt.signal(Registration { status, gatts_if });
      Ok(())
   }

   fn on_service_created(
      &self,
      status: GattStatus,
      service_handle: u16,
      service_id: ServiceId,
      token: Option<CreateToken>,
   ) -> Result<()> {
      // Holding `creating` keeps the waiting caller from withdrawing the
      // request between the check and the signal.
      let creating = self.creating.lock();
      let pending = match token {
         Some(token) => self.services.take_pending(token).map(|s| (token, s)),
         None => self.services.take_pending_by_id(service_id),
      };
      let Some((token, service)) = pending.filter(|(token, _)| *creating == Some(*token)) else {
         self.unmatched_creations.fetch_add(1, Ordering::Relaxed);
         return Err(GattsError::UnmatchedCreation(service_id));
      };
      if service.id() != service_id {
         warn!(
            "creation token resolved to {}, controller reported {service_id}",
            service.id()
         );
      }

      let mut status = status;
      if status.is_ok()
         && let Err(e) = self.services.bind_handle(service_handle, &service)
      {
         error!("{}: {e}", service.id());
         status = GattStatus::ERROR;
      }
      self.create_evt.signal(Creation {
         token,
         status,
         service_handle,
      });
      Ok(())
   }

   fn on_connected(&self, info: &ConnectInfo) {
      let stale = self.peers.contains(info.conn_id);
      self.peers.on_connect(info.conn_id, info.remote);
      self.conn_id.store(Some(info.conn_id));
      self.peer_address.store(Some(info.remote));

      if let Some(callbacks) = self.callbacks() {
         callbacks.on_connect(self);
         callbacks.on_connect_with_info(self, info);
      }
      if !stale {
         self.connected_count.fetch_add(1, Ordering::SeqCst);
      }
      info!("conn {}: {} connected", info.conn_id, info.remote);
   }

   fn on_disconnected(&self, conn_id: u16) {
      if self.peers.contains(conn_id) {
         self.connected_count.fetch_sub(1, Ordering::SeqCst);
      }

      if let Some(callbacks) = self.callbacks() {
         callbacks.on_disconnect(self);
      }

      if self.config.restart_advertising_on_disconnect
         && let Err(e) = self.controller.start_advertising()
      {
         warn!("failed to restart advertising: {e}");
      }

      if self.peers.on_disconnect(conn_id).is_some() {
         info!("conn {conn_id}: removed");
      }
   }
}
