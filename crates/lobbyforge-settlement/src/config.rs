//! Settlement configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens when the top score is shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Nobody pays; every player keeps their stake.
    #[default]
    NoPayout,
    /// The lowest-ordered tied side (team 0 before team 1) takes the match.
    FirstSideWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Upper bound on a single transfer attempt, in seconds.
    pub transfer_timeout_secs: u64,
    /// Transfers in flight at once for one settlement.
    pub max_concurrent_transfers: usize,
    pub tie_policy: TiePolicy,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            transfer_timeout_secs: 30,
            max_concurrent_transfers: 8,
            tie_policy: TiePolicy::NoPayout,
        }
    }
}

impl SettlementConfig {
    pub fn validated(mut self) -> Self {
        if self.transfer_timeout_secs == 0 {
            tracing::warn!("transfer_timeout_secs is 0, using 1");
            self.transfer_timeout_secs = 1;
        }
        self.max_concurrent_transfers = self.max_concurrent_transfers.max(1);
        self
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}
