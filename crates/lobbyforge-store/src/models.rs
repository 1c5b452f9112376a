//! Persisted entities.

use chrono::{DateTime, Utc};
use lobbyforge_protocol::{
    Amount, GameType, LobbyId, LobbyStatus, LobbySummary, MatchOutcome, MemberSummary,
    TransferOutcome, WalletAddress,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// A lobby row. Members are stored separately as [`Membership`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    pub id: LobbyId,
    pub wager: Amount,
    pub game_type: GameType,
    pub status: LobbyStatus,
    pub max_players: usize,
    /// Kept alive by the availability watchdog.
    pub permanent: bool,
    /// Seconds left on the start countdown while `starting`.
    pub countdown_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Lobby {
    /// A fresh `waiting` lobby with a generated id.
    pub fn new(wager: Amount, game_type: GameType, max_players: usize, permanent: bool) -> Self {
        Self {
            id: LobbyId::generate(),
            wager,
            game_type,
            status: LobbyStatus::Waiting,
            max_players,
            permanent,
            countdown_secs: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Builds the client-facing view of this lobby.
    pub fn summary(&self, members: &[Membership]) -> LobbySummary {
        LobbySummary {
            lobby_id: self.id.clone(),
            wager: self.wager,
            game_type: self.game_type,
            status: self.status,
            permanent: self.permanent,
            max_players: self.max_players,
            members: members
                .iter()
                .map(|m| MemberSummary {
                    wallet: m.wallet.clone(),
                    team: m.team,
                    joined_at: m.joined_at,
                })
                .collect(),
            countdown: self.countdown_secs,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub lobby_id: LobbyId,
    pub wallet: WalletAddress,
    /// Team index for team-based game types.
    pub team: Option<u8>,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// One planned stake movement: `amount` from loser `from` to winner `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTransfer {
    pub from: WalletAddress,
    pub to: WalletAddress,
    pub amount: Amount,
}

/// A player's line in a settlement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResult {
    pub wallet: WalletAddress,
    pub team: Option<u8>,
    pub score: u64,
    pub won: bool,
    /// Total the plan intends to credit this player (zero for losers).
    pub intended_payout: Amount,
}

/// The audit record of one lobby's settlement.
///
/// Inserted once with the plan, then `outcomes` grows as transfers are
/// attempted, then the record is sealed and never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub lobby_id: LobbyId,
    pub wager: Amount,
    pub outcome: MatchOutcome,
    pub results: Vec<RecordedResult>,
    pub plan: Vec<PlannedTransfer>,
    pub outcomes: Vec<TransferOutcome>,
    pub created_at: DateTime<Utc>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl SettlementRecord {
    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Criteria for [`SessionStore::find_lobbies`](crate::SessionStore::find_lobbies).
///
/// Unset fields match everything; an empty `statuses` matches any status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LobbyFilter {
    pub wager: Option<Amount>,
    pub game_type: Option<GameType>,
    pub statuses: Vec<LobbyStatus>,
}

impl LobbyFilter {
    /// Lobbies that are still joinable (`waiting` or `starting`).
    pub fn joinable() -> Self {
        Self {
            statuses: vec![LobbyStatus::Waiting, LobbyStatus::Starting],
            ..Self::default()
        }
    }

    pub fn wager(mut self, wager: Amount) -> Self {
        self.wager = Some(wager);
        self
    }

    pub fn game_type(mut self, game_type: GameType) -> Self {
        self.game_type = Some(game_type);
        self
    }

    pub fn matches(&self, lobby: &Lobby) -> bool {
        self.wager.is_none_or(|w| w == lobby.wager)
            && self.game_type.is_none_or(|g| g == lobby.game_type)
            && (self.statuses.is_empty() || self.statuses.contains(&lobby.status))
    }
}
