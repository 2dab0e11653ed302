//! Radio-facing layer of the GATT server.
//!
//! This module provides the link-layer value types and the outbound
//! controller interface that the server core drives.

pub mod address;
pub mod controller;
pub mod gatt;

#[cfg(test)]
pub mod mock;
