//! Lobby lifecycle management for Lobbyforge.
//!
//! Each open lobby runs as an isolated Tokio task (actor model) that owns
//! its status, members, and start countdown.
//!
//! # Key types
//!
//! - [`LobbyManager`]: creates lobbies, routes joins and leaves to actors
//! - [`LobbyHandle`]: send commands to a running lobby actor
//! - [`Watchdog`]: keeps permanent lobbies available per slot
//! - [`StateBroadcaster`] / [`EventBus`]: outbound lobby events
//! - [`LobbyConfig`] / [`WatchdogConfig`]: settings

mod config;
mod error;
mod events;
mod lobby;
mod manager;
mod watchdog;

pub use config::{LobbyConfig, PermanentSlot, WatchdogConfig};
pub use error::LobbyError;
pub use events::{EventBus, StateBroadcaster};
pub use lobby::LobbyHandle;
pub use manager::LobbyManager;
pub use watchdog::{MaintenanceHandle, Watchdog};
