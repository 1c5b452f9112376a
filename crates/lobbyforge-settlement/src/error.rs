//! Error types for settlement.

use lobbyforge_lobby::LobbyError;
use lobbyforge_store::StoreError;

/// Why a results submission was refused.
///
/// Individual transfer failures never show up here; they are recorded in
/// the settlement and the call still succeeds.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettlementError {
    /// The submitted results do not describe the lobby's members.
    #[error("invalid results: {0}")]
    Validation(String),

    /// Unknown lobby, or a lobby that is not `active` (including one that
    /// has already been settled).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
