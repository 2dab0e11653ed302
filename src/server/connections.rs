//! Per-connection peer state.
//!
//! The controller reuses connection ids over the device's lifetime, so an
//! entry is removed outright on disconnect. A later lookup of the same id
//! then finds nothing until a new link takes it over.

use std::collections::HashMap;

use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::bluetooth::{address::BdAddr, gatt::ATT_DEFAULT_MTU};

/// State of one open link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerConnection {
   pub conn_id: u16,
   pub address: BdAddr,
   pub mtu: u16,
   pub connected: bool,
}

impl PeerConnection {
   pub const fn new(conn_id: u16, address: BdAddr) -> Self {
      Self {
         conn_id,
         address,
         mtu: ATT_DEFAULT_MTU,
         connected: true,
      }
   }
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
   peers: Mutex<HashMap<u16, PeerConnection>>,
}

impl ConnectionTable {
   pub fn new() -> Self {
      Self::default()
   }

   /// Records a new link with the default MTU.
   pub fn on_connect(&self, conn_id: u16, address: BdAddr) -> PeerConnection {
      let peer = PeerConnection::new(conn_id, address);
      if let Some(stale) = self.peers.lock().insert(conn_id, peer) {
         warn!(
            "conn {conn_id}: replaced stale entry for {} with {address}",
            stale.address
         );
      }
      peer
   }

   /// Forgets the link. Unknown ids are ignored.
   pub fn on_disconnect(&self, conn_id: u16) -> Option<PeerConnection> {
      let removed = self.peers.lock().remove(&conn_id);
      if removed.is_none() {
         debug!("conn {conn_id}: disconnect for unknown connection");
      }
      removed
   }

   /// Updates the negotiated MTU. Returns `false` for unknown ids.
   pub fn on_mtu_negotiated(&self, conn_id: u16, mtu: u16) -> bool {
      match self.peers.lock().get_mut(&conn_id) {
         Some(peer) => {
            peer.mtu = mtu;
            true
         },
         None => {
            debug!("conn {conn_id}: MTU {mtu} for unknown connection");
            false
         },
      }
   }

   pub fn get(&self, conn_id: u16) -> Option<PeerConnection> {
      self.peers.lock().get(&conn_id).copied()
   }

   pub fn contains(&self, conn_id: u16) -> bool {
      self.peers.lock().contains_key(&conn_id)
   }

   pub fn len(&self) -> usize {
      self.peers.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   /// The only open link, if exactly one is open.
   pub fn sole_peer(&self) -> Option<PeerConnection> {
      let peers = self.peers.lock();
      if peers.len() == 1 {
         peers.values().next().copied()
      } else {
         None
      }
   }

   /// Copy of the table at this instant.
   pub fn snapshot(&self) -> HashMap<u16, PeerConnection> {
      self.peers.lock().clone()
   }
}
