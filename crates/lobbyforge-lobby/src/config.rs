//! Lobby and watchdog configuration.

use std::time::Duration;

use lobbyforge_protocol::{Amount, GameType};
use lobbyforge_tick::CountdownConfig;
use serde::{Deserialize, Serialize};

use crate::LobbyError;

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Settings shared by every lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// The only wagers a lobby may carry.
    pub wager_tiers: Vec<Amount>,
    /// Members needed before the countdown arms.
    pub min_players_to_start: usize,
    /// Countdown length once the minimum is reached.
    pub countdown_secs: u32,
    pub tick_interval_ms: u64,
    /// Command channel capacity per lobby actor.
    pub channel_size: usize,
    /// Cancel a non-permanent lobby when its last member leaves.
    pub cancel_abandoned: bool,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            wager_tiers: vec![
                Amount::ZERO,
                Amount::from_base_units(Amount::SCALE / 100),
                Amount::from_base_units(Amount::SCALE / 20),
            ],
            min_players_to_start: 2,
            countdown_secs: 10,
            tick_interval_ms: 1_000,
            channel_size: 64,
            cancel_abandoned: true,
        }
    }
}

impl LobbyConfig {
    /// Normalizes the config, rejecting values that cannot be fixed up.
    ///
    /// Tiers are sorted and deduplicated; `channel_size` and
    /// `min_players_to_start` are raised to at least 1.
    pub fn validated(mut self) -> Result<Self, LobbyError> {
        if self.wager_tiers.is_empty() {
            return Err(LobbyError::Validation(
                "at least one wager tier is required".into(),
            ));
        }
        self.wager_tiers.sort();
        self.wager_tiers.dedup();

        if self.min_players_to_start == 0 {
            tracing::warn!("min_players_to_start is 0, using 1");
            self.min_players_to_start = 1;
        }
        self.channel_size = self.channel_size.max(1);
        Ok(self)
    }

    pub fn is_tier(&self, wager: Amount) -> bool {
        self.wager_tiers.contains(&wager)
    }

    pub fn check_tier(&self, wager: Amount) -> Result<(), LobbyError> {
        if self.is_tier(wager) {
            Ok(())
        } else {
            Err(LobbyError::Validation(format!(
                "{wager} is not a wager tier"
            )))
        }
    }

    /// Resolves the capacity for a new lobby.
    ///
    /// `requested` must fit between the start threshold and the game
    /// type's natural size; team games need an even count. A game type
    /// too small to ever reach the start threshold is rejected outright,
    /// since its lobbies could never start.
    pub fn max_players(
        &self,
        game_type: GameType,
        requested: Option<usize>,
    ) -> Result<usize, LobbyError> {
        let upper = game_type.default_max_players();
        let lower = self.min_players_to_start;
        if upper < lower {
            return Err(LobbyError::Validation(format!(
                "{game_type} holds at most {upper} players but {lower} are needed to start"
            )));
        }
        let Some(n) = requested else {
            return Ok(upper);
        };
        if n < lower || n > upper {
            return Err(LobbyError::Validation(format!(
                "max_players for {game_type} must be between {lower} and {upper}"
            )));
        }
        if game_type.is_team_based() && n % 2 != 0 {
            return Err(LobbyError::Validation(
                "team games need an even max_players".into(),
            ));
        }
        Ok(n)
    }

    pub fn countdown(&self) -> CountdownConfig {
        CountdownConfig {
            seconds: self.countdown_secs,
            tick_interval_ms: self.tick_interval_ms,
            ..CountdownConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// WatchdogConfig
// ---------------------------------------------------------------------------

/// A `(wager, game type)` pair that always has a joinable lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermanentSlot {
    pub wager: Amount,
    pub game_type: GameType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub slots: Vec<PermanentSlot>,
    /// Seconds between background maintenance passes.
    pub maintenance_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        let slots = LobbyConfig::default()
            .wager_tiers
            .into_iter()
            .map(|wager| PermanentSlot {
                wager,
                game_type: GameType::Duel,
            })
            .collect();
        Self {
            slots,
            maintenance_interval_secs: 30,
        }
    }
}

impl WatchdogConfig {
    /// Checks every slot against the lobby tiers and drops duplicates.
    ///
    /// A slot whose game type cannot seat `min_players_to_start` is
    /// rejected: its lobby would sit in `waiting` forever.
    pub fn validated(mut self, lobby: &LobbyConfig) -> Result<Self, LobbyError> {
        for slot in &self.slots {
            lobby.check_tier(slot.wager)?;
            lobby.max_players(slot.game_type, None)?;
        }
        let mut seen = std::collections::HashSet::new();
        self.slots.retain(|s| seen.insert(*s));
        self.maintenance_interval_secs = self.maintenance_interval_secs.max(1);
        Ok(self)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}
