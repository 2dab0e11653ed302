//! Link-layer device address.

use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};

use crate::error::GattsError;

/// A 6-byte Bluetooth device address, stored most significant octet first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
   pub const ANY: Self = Self([0; 6]);

   pub const fn new(octets: [u8; 6]) -> Self {
      Self(octets)
   }

   pub const fn octets(&self) -> [u8; 6] {
      self.0
   }
}

impl fmt::Display for BdAddr {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let [a, b, c, d, e, g] = self.0;
      write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
   }
}

impl fmt::Debug for BdAddr {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(self, f)
   }
}

impl FromStr for BdAddr {
   type Err = GattsError;

   /// Parses `AA:BB:CC:DD:EE:FF` (also accepts `-` separators or bare hex).
   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let digits: String = s.chars().filter(|c| !matches!(c, ':' | '-')).collect();
      let mut octets = [0u8; 6];
      hex::decode_to_slice(&digits, &mut octets)
         .map_err(|e| GattsError::InvalidAddress(format!("{s}: {e}")))?;
      Ok(Self(octets))
   }
}

impl From<[u8; 6]> for BdAddr {
   fn from(octets: [u8; 6]) -> Self {
      Self(octets)
   }
}

impl Serialize for BdAddr {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.collect_str(self)
   }
}
