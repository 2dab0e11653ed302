//! Service registry with lookup by logical id and by controller handle.

use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::Mutex;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::{
   bluetooth::gatt::{CreateToken, ServiceId},
   error::{GattsError, Result},
   server::service::Service,
};

pub type ServiceList = SmallVec<[Arc<Service>; 8]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
   Inserted,
   /// Another active service already uses the same UUID.
   DuplicateUuid,
}

#[derive(Debug, Default)]
struct Inner {
   // Registration order, used for event forwarding.
   services: Vec<Arc<Service>>,
   by_id: HashMap<ServiceId, Arc<Service>>,
   by_handle: HashMap<u16, Arc<Service>>,
   pending: HashMap<CreateToken, Arc<Service>>,
}

#[derive(Debug, Default)]
pub struct ServiceRegistry {
   inner: Mutex<Inner>,
}

impl ServiceRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn insert(&self, service: Arc<Service>) -> InsertOutcome {
      let mut inner = self.inner.lock();
      let uuid = service.uuid();
      let outcome = if inner.by_id.keys().any(|id| id.uuid == uuid) {
         InsertOutcome::DuplicateUuid
      } else {
         InsertOutcome::Inserted
      };
      inner.by_id.insert(service.id(), service.clone());
      inner.services.push(service);
      outcome
   }

   pub fn lookup_by_id(&self, uuid: Uuid, inst_id: u8) -> Option<Arc<Service>> {
      self
         .inner
         .lock()
         .by_id
         .get(&ServiceId::new(uuid, inst_id))
         .cloned()
   }

   /// First registered service with `uuid`, regardless of instance.
   pub fn lookup_by_uuid(&self, uuid: Uuid) -> Option<Arc<Service>> {
      let inner = self.inner.lock();
      inner
         .services
         .iter()
         .find(|s| s.uuid() == uuid && inner.by_id.contains_key(&s.id()))
         .cloned()
   }

   pub fn lookup_by_handle(&self, handle: u16) -> Option<Arc<Service>> {
      self.inner.lock().by_handle.get(&handle).cloned()
   }

   /// Records the controller handle for `service`. Fails if the service
   /// already carries a different handle.
   pub fn bind_handle(&self, handle: u16, service: &Arc<Service>) -> Result<()> {
      service.bind_handle(handle)?;
      let mut inner = self.inner.lock();
      if let Some(prev) = inner.by_handle.insert(handle, service.clone())
         && !Arc::ptr_eq(&prev, service)
      {
         debug!("handle {handle:#06x} reassigned from {} to {}", prev.id(), service.id());
      }
      Ok(())
   }

   pub fn insert_pending(&self, token: CreateToken, service: Arc<Service>) {
      self.inner.lock().pending.insert(token, service);
   }

   pub fn take_pending(&self, token: CreateToken) -> Option<Arc<Service>> {
      self.inner.lock().pending.remove(&token)
   }

   /// Fallback for controllers that cannot echo the creation token. Returns
   /// the token the matched request was issued under.
   pub fn take_pending_by_id(&self, id: ServiceId) -> Option<(CreateToken, Arc<Service>)> {
      let mut inner = self.inner.lock();
      let token = inner
         .pending
         .iter()
         .filter(|(_, s)| s.id() == id)
         .map(|(token, _)| *token)
         .min()?;
      inner.pending.remove(&token).map(|service| (token, service))
   }

   /// Removes a stopped service from every index.
   pub fn remove(&self, service: &Arc<Service>) -> Result<()> {
      if !service.is_stopped() {
         return Err(GattsError::ServiceNotStopped(service.id()));
      }
      self.detach(service)
   }

   /// Drops `service` from every index without checking its state.
   pub(crate) fn detach(&self, service: &Arc<Service>) -> Result<()> {
      let mut inner = self.inner.lock();
      let before = inner.services.len();
      inner.services.retain(|s| !Arc::ptr_eq(s, service));
      if inner.services.len() == before {
         return Err(GattsError::ServiceNotFound(service.id()));
      }

      let id = service.id();
      if inner.by_id.get(&id).is_some_and(|s| Arc::ptr_eq(s, service)) {
         inner.by_id.remove(&id);
         // Re-expose an older service with the same id, if one remains.
         let older = inner.services.iter().rev().find(|s| s.id() == id).cloned();
         if let Some(older) = older {
            inner.by_id.insert(id, older);
         }
      }
      if let Some(handle) = service.handle()
         && inner
            .by_handle
            .get(&handle)
            .is_some_and(|s| Arc::ptr_eq(s, service))
      {
         inner.by_handle.remove(&handle);
      }
      inner.pending.retain(|_, s| !Arc::ptr_eq(s, service));
      Ok(())
   }

   pub fn len(&self) -> usize {
      self.inner.lock().services.len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   /// Point-in-time list of registered services, in registration order.
   pub fn snapshot(&self) -> ServiceList {
      self.inner.lock().services.iter().cloned().collect()
   }
}
