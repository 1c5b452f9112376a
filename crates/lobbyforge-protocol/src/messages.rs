//! The request/response surface and the real-time event stream.
//!
//! Everything a client can ask for is a [`ClientRequest`]; everything the
//! server answers with is a [`ServerResponse`]; state changes are pushed as
//! [`LobbyEvent`]s. All three travel inside an [`Envelope`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, GameType, LobbyId, LobbyStatus, WalletAddress};

// ---------------------------------------------------------------------------
// Lobby snapshots
// ---------------------------------------------------------------------------

/// One member of a lobby as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub wallet: WalletAddress,
    /// Team index for team-based game types.
    pub team: Option<u8>,
    pub joined_at: DateTime<Utc>,
}

/// A point-in-time view of a lobby and its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbySummary {
    pub lobby_id: LobbyId,
    pub wager: Amount,
    pub game_type: GameType,
    pub status: LobbyStatus,
    /// Kept alive by the availability watchdog.
    pub permanent: bool,
    pub max_players: usize,
    pub members: Vec<MemberSummary>,
    /// Seconds left before the game starts, while `starting`.
    pub countdown: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LobbySummary {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// `true` if the lobby is accepting joins and has a free slot.
    pub fn has_open_slot(&self) -> bool {
        self.status.is_joinable() && self.members.len() < self.max_players
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// A single player's submitted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub wallet: WalletAddress,
    /// Team the score counts toward. `None` means the player is their own side.
    #[serde(default)]
    pub team: Option<u8>,
    pub score: u64,
}

/// A side in a match: a team, or a lone player in non-team games.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Side {
    Team(u8),
    Player(WalletAddress),
}

/// Who won, if anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Top scores are equal; nobody pays.
    Tie,
    /// A single side took the match.
    Decided { winner: Side },
}

/// The result of one attempted fund transfer.
///
/// Persisted as-is in the settlement record. `receipt` is the opaque
/// confirmation identifier; `reason` is a human-readable failure string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferResult {
    Confirmed { receipt: String },
    Failed { reason: String },
}

impl TransferResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// One entry in a settlement's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Losing player whose stake moves.
    pub from: WalletAddress,
    /// Winning player who receives it.
    pub to: WalletAddress,
    /// Custodial source address, if it could be resolved.
    pub source: Option<WalletAddress>,
    /// Custodial destination address, if it could be resolved.
    pub destination: Option<WalletAddress>,
    pub amount: Amount,
    pub result: TransferResult,
    pub attempted_at: DateTime<Utc>,
}

/// Per-player money movement in a settlement.
///
/// `intended_*` is what the payout plan called for; `credited`/`debited`
/// count only confirmed transfers, so a failed transfer shows as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPayout {
    pub wallet: WalletAddress,
    pub side: Side,
    pub score: u64,
    pub won: bool,
    pub intended_credit: Amount,
    pub intended_debit: Amount,
    pub credited: Amount,
    pub debited: Amount,
}

/// What the caller of submit-results gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub lobby_id: LobbyId,
    pub wager: Amount,
    pub outcome: MatchOutcome,
    pub winners: Vec<WalletAddress>,
    pub losers: Vec<WalletAddress>,
    pub payouts: Vec<PlayerPayout>,
    pub transfers: Vec<TransferOutcome>,
}

impl SettlementSummary {
    /// Number of transfers that were confirmed.
    pub fn confirmed_transfers(&self) -> usize {
        self.transfers
            .iter()
            .filter(|t| t.result.is_confirmed())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Client → Server operations.
///
/// Internally tagged: `{ "type": "join_lobby", "lobby_id": "...", ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Open lobbies, optionally filtered; permanent first, then newest.
    ListLobbies {
        #[serde(default)]
        wager: Option<Amount>,
        #[serde(default)]
        game_type: Option<GameType>,
    },
    /// Create a lobby; the creator is joined automatically.
    CreateLobby {
        wallet: WalletAddress,
        wager: Amount,
        game_type: GameType,
        #[serde(default)]
        max_players: Option<usize>,
    },
    JoinLobby {
        lobby_id: LobbyId,
        wallet: WalletAddress,
    },
    LeaveLobby {
        lobby_id: LobbyId,
        wallet: WalletAddress,
    },
    SubmitResults {
        lobby_id: LobbyId,
        results: Vec<PlayerResult>,
    },
}

/// Structured context attached to an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    StateConflict {
        status: Option<LobbyStatus>,
    },
    AlreadyCommitted {
        lobby_id: LobbyId,
    },
    InsufficientBalance {
        required: Amount,
        available: Amount,
        deposit_address: WalletAddress,
    },
}

/// Server → Client replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    LobbyList { lobbies: Vec<LobbySummary> },
    Lobby { lobby: LobbySummary },
    Left { lobby_id: LobbyId },
    Settlement { summary: SettlementSummary },
    /// `code` follows HTTP conventions; `kind` is a stable machine name
    /// such as `"insufficient_balance"`.
    Error {
        code: u16,
        kind: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<ErrorDetail>,
    },
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A lobby state change pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyEvent {
    Snapshot { lobby: LobbySummary },
    PlayerJoined {
        lobby_id: LobbyId,
        wallet: WalletAddress,
        member_count: usize,
    },
    PlayerLeft {
        lobby_id: LobbyId,
        wallet: WalletAddress,
        member_count: usize,
    },
    CountdownTick { lobby_id: LobbyId, remaining: u32 },
    GameStarted { lobby_id: LobbyId },
    Completed { lobby_id: LobbyId },
    Cancelled { lobby_id: LobbyId, reason: String },
}

impl LobbyEvent {
    /// The lobby this event is about.
    pub fn lobby_id(&self) -> &LobbyId {
        match self {
            Self::Snapshot { lobby } => &lobby.lobby_id,
            Self::PlayerJoined { lobby_id, .. }
            | Self::PlayerLeft { lobby_id, .. }
            | Self::CountdownTick { lobby_id, .. }
            | Self::GameStarted { lobby_id }
            | Self::Completed { lobby_id }
            | Self::Cancelled { lobby_id, .. } => lobby_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// What an envelope carries.
///
/// Adjacently tagged: `{ "type": "Request", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Request(ClientRequest),
    Response(ServerResponse),
    Event(LobbyEvent),
}

/// The top-level frame. A response echoes the `seq` of its request;
/// events use the server's own counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub payload: Payload,
}
