//! Error types for the lobby layer.

use lobbyforge_protocol::{Amount, LobbyId, LobbyStatus, WalletAddress};
use lobbyforge_store::StoreError;
use lobbyforge_wallet::WalletError;

/// Errors from lobby lifecycle operations.
///
/// Everything except `Wallet`, `Store`, and `Unavailable` is a user-facing
/// rejection with no side effect.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LobbyError {
    /// Malformed input, such as a wager that is not a configured tier.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// The operation is not valid for the lobby's current status
    /// (joining a full or closed lobby, completing a lobby twice).
    #[error("lobby {lobby_id}: {reason}")]
    StateConflict {
        lobby_id: LobbyId,
        status: Option<LobbyStatus>,
        reason: String,
    },

    /// The wallet already has stake in another open lobby of this tier.
    #[error("{wallet} is already committed to lobby {lobby_id}")]
    AlreadyCommitted {
        wallet: WalletAddress,
        lobby_id: LobbyId,
    },

    /// Cached balance is below the wager. Deposit to `deposit_address`.
    #[error("insufficient balance: {available} available, {required} required")]
    InsufficientBalance {
        required: Amount,
        available: Amount,
        deposit_address: WalletAddress,
    },

    #[error("{wallet} is not in lobby {lobby_id}")]
    NotMember {
        lobby_id: LobbyId,
        wallet: WalletAddress,
    },

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("store error: {0}")]
    Store(StoreError),

    /// The lobby's actor is gone and the store could not explain why.
    #[error("lobby {0} is unavailable")]
    Unavailable(LobbyId),
}

impl LobbyError {
    pub(crate) fn conflict(
        lobby_id: &LobbyId,
        status: LobbyStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self::StateConflict {
            lobby_id: lobby_id.clone(),
            status: Some(status),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for LobbyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::StatusConflict { lobby_id, current } => Self::StateConflict {
                reason: format!("lobby is {current}"),
                lobby_id,
                status: Some(current),
            },
            StoreError::LobbyFull(lobby_id) => Self::StateConflict {
                lobby_id,
                status: None,
                reason: "lobby is full".into(),
            },
            StoreError::AlreadyMember { lobby_id, .. } => Self::StateConflict {
                lobby_id,
                status: None,
                reason: "already a member".into(),
            },
            StoreError::AlreadyCommitted { wallet, lobby_id } => {
                Self::AlreadyCommitted { wallet, lobby_id }
            }
            StoreError::NotMember { lobby_id, wallet } => Self::NotMember { lobby_id, wallet },
            other => Self::Store(other),
        }
    }
}
