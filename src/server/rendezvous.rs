//! Single-slot completion rendezvous.
//!
//! Pairs one asynchronous controller completion with one blocked caller.
//! The caller arms the slot *before* submitting its request, so a
//! completion that races ahead of [`Rendezvous::wait`] is parked in the slot
//! rather than lost. A completion that arrives while the slot is idle has no
//! owner and is dropped.

use std::{
   mem,
   time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::{GattsError, Result};

#[derive(Debug)]
enum Slot<T> {
   Idle,
   Armed,
   Waiting,
   Signaled(T),
}

#[derive(Debug)]
pub struct Rendezvous<T> {
   name: &'static str,
   slot: Mutex<Slot<T>>,
   cond: Condvar,
   // Serializes whole arm/issue/wait exchanges in `transact`.
   serial: Mutex<()>,
}

impl<T> Rendezvous<T> {
   pub const fn new(name: &'static str) -> Self {
      Self {
         name,
         slot: Mutex::new(Slot::Idle),
         cond: Condvar::new(),
         serial: Mutex::new(()),
      }
   }

   pub const fn name(&self) -> &'static str {
      self.name
   }

   /// Prepares the slot for exactly one completion.
   pub fn arm(&self) -> Result<()> {
      let mut slot = self.slot.lock();
      match *slot {
         Slot::Idle => {
            *slot = Slot::Armed;
            Ok(())
         },
         _ => Err(GattsError::RendezvousBusy(self.name)),
      }
   }

   /// Returns the slot to idle, discarding any parked value.
   ///
   /// A caller currently blocked in [`Self::wait`] wakes up with
   /// [`GattsError::RendezvousNotArmed`].
   pub fn disarm(&self) {
      let mut slot = self.slot.lock();
      if !matches!(*slot, Slot::Idle) {
         debug!("{}: disarmed", self.name);
         *slot = Slot::Idle;
         self.cond.notify_all();
      }
   }

   pub fn is_armed(&self) -> bool {
      !matches!(*self.slot.lock(), Slot::Idle)
   }

   /// Delivers a completion. Never blocks.
   ///
   /// Returns `false` when nobody armed the slot or a value is already
   /// parked; the first value wins.
   pub fn signal(&self, value: T) -> bool {
      let mut slot = self.slot.lock();
      match *slot {
         Slot::Armed | Slot::Waiting => {
            *slot = Slot::Signaled(value);
            self.cond.notify_all();
            true
         },
         Slot::Idle => {
            warn!("{}: completion with no pending request, dropped", self.name);
            false
         },
         Slot::Signaled(_) => {
            warn!("{}: duplicate completion, dropped", self.name);
            false
         },
      }
   }

   /// Blocks until the armed slot is signaled and takes the value.
   pub fn wait(&self) -> Result<T> {
      self.wait_until(None)
   }

   /// Like [`Self::wait`], but gives up after `timeout`. The slot is
   /// disarmed on timeout so a late completion is dropped.
   pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
      self.wait_until(Some(Instant::now() + timeout))
   }

   fn wait_until(&self, deadline: Option<Instant>) -> Result<T> {
      let mut slot = self.slot.lock();
      match mem::replace(&mut *slot, Slot::Waiting) {
         Slot::Signaled(value) => {
            *slot = Slot::Idle;
            return Ok(value);
         },
         Slot::Armed => {},
         prev @ Slot::Idle => {
            *slot = prev;
            return Err(GattsError::RendezvousNotArmed(self.name));
         },
         prev @ Slot::Waiting => {
            *slot = prev;
            return Err(GattsError::RendezvousBusy(self.name));
         },
      }

      loop {
         let timed_out = match deadline {
            Some(deadline) => self.cond.wait_until(&mut slot, deadline).timed_out(),
            None => {
               self.cond.wait(&mut slot);
               false
            },
         };
         match mem::replace(&mut *slot, Slot::Idle) {
            Slot::Signaled(value) => return Ok(value),
            Slot::Idle => return Err(GattsError::RendezvousNotArmed(self.name)),
            Slot::Waiting if timed_out => return Err(GattsError::RequestTimeout(self.name)),
            Slot::Waiting => *slot = Slot::Waiting,
            // Disarmed and re-armed by another exchange; the slot is theirs now.
            Slot::Armed => {
               *slot = Slot::Armed;
               return Err(GattsError::RendezvousNotArmed(self.name));
            },
         }
      }
   }

   /// Runs one complete request/response exchange.
   ///
   /// Concurrent callers are serialized. `issue` submits the request; if it
   /// fails the slot is disarmed and the error returned without waiting.
   pub fn transact<F>(&self, timeout: Option<Duration>, issue: F) -> Result<T>
   where
      F: FnOnce() -> Result<()>,
   {
      let _serial = self.serial.lock();
      self.arm()?;
      if let Err(e) = issue() {
         self.disarm();
         return Err(e);
      }
      match timeout {
         Some(timeout) => self.wait_timeout(timeout),
         None => self.wait(),
      }
   }
}
