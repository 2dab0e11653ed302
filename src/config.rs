//! Configuration management for the GATT server.
//!
//! This module handles loading and saving the server configuration from
//! disk: the application id to register, advertising behavior on disconnect
//! and the optional bound on blocking waits.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{GattsError, Result};

/// Main configuration structure for the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
   #[serde(default)]
   pub app_id: u16,

   #[serde(default = "default_restart_advertising")]
   pub restart_advertising_on_disconnect: bool,

   /// Upper bound for blocking requests, in milliseconds. `0` waits forever.
   #[serde(default)]
   pub request_timeout_ms: u64,
}

const fn default_restart_advertising() -> bool {
   true
}

impl Default for ServerConfig {
   fn default() -> Self {
      Self {
         app_id: 0,
         restart_advertising_on_disconnect: default_restart_advertising(),
         request_timeout_ms: 0,
      }
   }
}

impl ServerConfig {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the defaults there if absent.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("GATTS_HOME") {
         PathBuf::from(home)
      } else if let Some(dir) = dirs::config_dir() {
         dir
      } else {
         return Err(GattsError::ConfigDirNotFound);
      };

      Ok(config_dir.join("gatt-server").join("config.toml"))
   }

   /// Bound applied to blocking requests, if any.
   pub const fn request_timeout(&self) -> Option<Duration> {
      match self.request_timeout_ms {
         0 => None,
         ms => Some(Duration::from_millis(ms)),
      }
   }
}
