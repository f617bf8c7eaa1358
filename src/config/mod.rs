//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config (Config, HomeserverConfig, AppserviceConfig)
//! - [`irc`]: Per-network IRC blocks (IrcServerConfig, ExposeConfig, RoomsConfig)
//! - [`validation`]: Startup validation

mod defaults;
mod irc;
mod types;
mod validation;

pub use irc::{ExposeConfig, IrcServerConfig, RoomsConfig};
pub use types::{AppserviceConfig, Config, ConfigError, HomeserverConfig};
pub use validation::{ValidationError, validate};
