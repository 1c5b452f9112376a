//! Error types for the store layer.

use lobbyforge_protocol::{LobbyId, LobbyStatus, WalletAddress};

/// Errors returned by [`SessionStore`](crate::SessionStore) operations.
///
/// The conditional primitives report *why* a write was refused so the
/// lifecycle layer can turn it into a user-facing error without a second
/// read.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    #[error("lobby {0} already exists")]
    DuplicateLobby(LobbyId),

    /// A conditional status write found the lobby in another status.
    #[error("lobby {lobby_id} is {current}")]
    StatusConflict {
        lobby_id: LobbyId,
        current: LobbyStatus,
    },

    #[error("lobby {0} is full")]
    LobbyFull(LobbyId),

    #[error("{wallet} is already in lobby {lobby_id}")]
    AlreadyMember {
        lobby_id: LobbyId,
        wallet: WalletAddress,
    },

    /// The wallet holds an open membership in another lobby of the same tier.
    #[error("{wallet} is already committed to lobby {lobby_id}")]
    AlreadyCommitted {
        wallet: WalletAddress,
        lobby_id: LobbyId,
    },

    #[error("{wallet} is not in lobby {lobby_id}")]
    NotMember {
        lobby_id: LobbyId,
        wallet: WalletAddress,
    },

    #[error("lobby {0} already has a settlement record")]
    AlreadySettled(LobbyId),

    #[error("no settlement record for lobby {0}")]
    SettlementNotFound(LobbyId),

    #[error("settlement for lobby {0} is sealed")]
    SettlementSealed(LobbyId),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The backing store could not be reached. Safe to retry.
    #[error("store unavailable: {0}")]
    Backend(String),
}
