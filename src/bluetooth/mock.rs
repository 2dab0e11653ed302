//! In-process controller double for tests.
//!
//! Requests are recorded into a channel. [`spawn_radio`] plays the controller
//! side by turning each request into completion events on a separate thread.

use std::{
   collections::HashSet,
   sync::{Arc, Weak},
   thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::{
   bluetooth::{
      address::BdAddr,
      controller::{Controller, ControllerError, ControllerResult},
      gatt::{ConnParams, CreateServiceRequest, GattIf},
   },
   config::ServerConfig,
   event::ServerEvent,
   server::Server,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
   RegisterApp(u16),
   CreateService(GattIf, CreateServiceRequest),
   StartService(u16),
   StopService(u16),
   DeleteService(u16),
   Open(GattIf, BdAddr, bool),
   ReadRssi(BdAddr),
   UpdateConnParams(BdAddr, ConnParams),
   StartAdvertising,
}

pub struct MockController {
   tx: Sender<Request>,
   rejected: Mutex<HashSet<&'static str>>,
}

impl MockController {
   pub fn new() -> (Arc<Self>, Receiver<Request>) {
      let (tx, rx) = channel::unbounded();
      let this = Arc::new(Self {
         tx,
         rejected: Mutex::new(HashSet::new()),
      });
      (this, rx)
   }

   /// Makes every subsequent `op` request fail synchronously.
   pub fn reject(&self, op: &'static str) {
      self.rejected.lock().insert(op);
   }

   fn submit(&self, op: &'static str, request: Request) -> ControllerResult {
      if self.rejected.lock().contains(op) {
         return Err(ControllerError::new(op, 0x103));
      }
      let _ = self.tx.send(request);
      Ok(())
   }
}

impl Controller for MockController {
   fn register_app(&self, app_id: u16) -> ControllerResult {
      self.submit("register_app", Request::RegisterApp(app_id))
   }

   fn create_service(&self, gatts_if: GattIf, request: &CreateServiceRequest) -> ControllerResult {
      self.submit("create_service", Request::CreateService(gatts_if, *request))
   }

   fn start_service(&self, service_handle: u16) -> ControllerResult {
      self.submit("start_service", Request::StartService(service_handle))
   }

   fn stop_service(&self, service_handle: u16) -> ControllerResult {
      self.submit("stop_service", Request::StopService(service_handle))
   }

   fn delete_service(&self, service_handle: u16) -> ControllerResult {
      self.submit("delete_service", Request::DeleteService(service_handle))
   }

   fn open(&self, gatts_if: GattIf, remote: BdAddr, direct: bool) -> ControllerResult {
      self.submit("open", Request::Open(gatts_if, remote, direct))
   }

   fn read_rssi(&self, remote: BdAddr) -> ControllerResult {
      self.submit("read_rssi", Request::ReadRssi(remote))
   }

   fn update_conn_params(&self, remote: BdAddr, params: &ConnParams) -> ControllerResult {
      self.submit("update_conn_params", Request::UpdateConnParams(remote, *params))
   }

   fn start_advertising(&self) -> ControllerResult {
      self.submit("start_advertising", Request::StartAdvertising)
   }
}

/// Runs a simulated controller context until the server is dropped.
///
/// `respond` maps each recorded request to the events the radio would
/// deliver; they are handed to the server in order from this thread.
pub fn spawn_radio<F>(server: &Arc<Server>, rx: Receiver<Request>, mut respond: F) -> JoinHandle<()>
where
   F: FnMut(&Request) -> Vec<ServerEvent> + Send + 'static,
{
   let weak: Weak<Server> = Arc::downgrade(server);
   thread::spawn(move || {
      while let Ok(request) = rx.recv() {
         let events = respond(&request);
         let Some(server) = weak.upgrade() else {
            break;
         };
         for event in events {
            server.handle_event(&event);
         }
      }
   })
}

/// Builds a new server backed by a [`MockController`].
pub fn server_with_mock() -> (Arc<Server>, Arc<MockController>, Receiver<Request>) {
   server_with_config(ServerConfig::default())
}

pub fn server_with_config(
   config: ServerConfig,
) -> (Arc<Server>, Arc<MockController>, Receiver<Request>) {
   let (controller, rx) = MockController::new();
   let server = Server::new(controller.clone(), config);
   (server, controller, rx)
}

pub fn init_logging() {
   let _ = env_logger::builder().is_test(true).try_init();
}
