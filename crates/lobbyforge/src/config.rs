//! Service-wide configuration.

use std::path::Path;

use lobbyforge_lobby::{LobbyConfig, WatchdogConfig};
use lobbyforge_settlement::SettlementConfig;
use lobbyforge_wallet::BalanceCacheConfig;
use serde::{Deserialize, Serialize};

use crate::LobbyforgeError;

/// Every setting the service needs, grouped by the component that reads it.
///
/// Missing sections and fields fall back to their defaults, so
/// `{}` is a valid configuration file.
///
/// ```json
/// {
///   "lobby": { "wager_tiers": ["0", "0.01", "0.05"], "countdown_secs": 10 },
///   "watchdog": { "maintenance_interval_secs": 30 },
///   "settlement": { "transfer_timeout_secs": 30, "tie_policy": "no_payout" },
///   "balance_cache": { "ttl_secs": 20 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub lobby: LobbyConfig,
    pub watchdog: WatchdogConfig,
    pub settlement: SettlementConfig,
    pub balance_cache: BalanceCacheConfig,
    /// Capacity of the lobby event channel.
    pub event_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lobby: LobbyConfig::default(),
            watchdog: WatchdogConfig::default(),
            settlement: SettlementConfig::default(),
            balance_cache: BalanceCacheConfig::default(),
            event_buffer: 256,
        }
    }
}

impl ServiceConfig {
    /// Reads and validates a JSON configuration file.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LobbyforgeError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| LobbyforgeError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_slice(&raw)
            .map_err(|e| LobbyforgeError::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "configuration loaded");
        config.validated()
    }

    /// Checks every section.
    ///
    /// Wager tiers come first: watchdog slots must name a configured tier.
    pub fn validated(self) -> Result<Self, LobbyforgeError> {
        let lobby = self.lobby.validated()?;
        let watchdog = self.watchdog.validated(&lobby)?;
        Ok(Self {
            lobby,
            watchdog,
            settlement: self.settlement.validated(),
            balance_cache: self.balance_cache,
            event_buffer: self.event_buffer.max(1),
        })
    }
}
