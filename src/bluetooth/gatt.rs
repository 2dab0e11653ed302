//! GATT-level identifiers and parameter types shared by the server and the
//! controller interface.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GattsError, Result};

/// Default ATT MTU before any exchange has taken place.
pub const ATT_DEFAULT_MTU: u16 = 23;

/// Bluetooth Base UUID, `00000000-0000-1000-8000-00805F9B34FB`.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expands a 16-bit SIG-assigned UUID into its full 128-bit form.
pub const fn uuid16(short: u16) -> Uuid {
   Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Controller interface id handed out on application registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GattIf(pub u8);

impl GattIf {
   /// Placeholder used by controllers before an interface has been assigned.
   pub const NONE: Self = Self(0xFF);
}

impl fmt::Display for GattIf {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.0)
   }
}

/// Status code carried by controller completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GattStatus(pub u16);

impl GattStatus {
   pub const OK: Self = Self(0x00);
   pub const ERROR: Self = Self(0x85);

   pub const fn is_ok(self) -> bool {
      self.0 == Self::OK.0
   }

   /// Maps a non-OK status to [`GattsError::CompletionFailed`].
   pub fn check(self, op: &'static str) -> Result<()> {
      if self.is_ok() {
         Ok(())
      } else {
         Err(GattsError::CompletionFailed { op, status: self })
      }
   }
}

impl fmt::Display for GattStatus {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{:#04x}", self.0)
   }
}

/// Logical service identity: UUID plus instance discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceId {
   pub uuid: Uuid,
   pub inst_id: u8,
}

impl ServiceId {
   pub const fn new(uuid: Uuid, inst_id: u8) -> Self {
      Self { uuid, inst_id }
   }
}

impl fmt::Display for ServiceId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}#{}", self.uuid, self.inst_id)
   }
}

/// Token the server attaches to a service-creation request. Controllers echo
/// it back on the matching [`crate::event::ServerEvent::ServiceCreated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreateToken(pub u32);

/// Everything the controller needs to allocate a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateServiceRequest {
   pub id: ServiceId,
   pub num_handles: u16,
   pub token: CreateToken,
}

/// Connection parameter update, in controller units.
///
/// Intervals are in 1.25 ms steps, the supervision timeout in 10 ms steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnParams {
   pub min_interval: u16,
   pub max_interval: u16,
   pub latency: u16,
   pub timeout: u16,
}

impl Default for ConnParams {
   fn default() -> Self {
      Self {
         min_interval: 0x10, // 20ms
         max_interval: 0x20, // 40ms
         latency: 0,
         timeout: 400, // 4s
      }
   }
}

impl ConnParams {
   const INTERVAL_RANGE: std::ops::RangeInclusive<u16> = 0x0006..=0x0C80;
   const TIMEOUT_RANGE: std::ops::RangeInclusive<u16> = 0x000A..=0x0C80;
   const MAX_LATENCY: u16 = 0x01F3;

   /// Checks the parameters against the ranges allowed by Bluetooth Core.
   pub fn validate(&self) -> Result<()> {
      if !Self::INTERVAL_RANGE.contains(&self.min_interval)
         || !Self::INTERVAL_RANGE.contains(&self.max_interval)
      {
         return Err(GattsError::InvalidConnParams("interval out of range"));
      }
      if self.min_interval > self.max_interval {
         return Err(GattsError::InvalidConnParams("min interval above max interval"));
      }
      if self.latency > Self::MAX_LATENCY {
         return Err(GattsError::InvalidConnParams("latency out of range"));
      }
      if !Self::TIMEOUT_RANGE.contains(&self.timeout) {
         return Err(GattsError::InvalidConnParams("supervision timeout out of range"));
      }
      // Timeout (10ms units) must exceed (1 + latency) * max_interval * 2 (1.25ms units).
      let min_timeout_ms = (1 + self.latency as u32) * self.max_interval as u32 * 125 * 2 / 100;
      if self.timeout as u32 * 10 <= min_timeout_ms {
         return Err(GattsError::InvalidConnParams(
            "supervision timeout too short for interval and latency",
         ));
      }
      Ok(())
   }
}
