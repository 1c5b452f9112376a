//! Unified error type for the Lobbyforge service.

use lobbyforge_lobby::LobbyError;
use lobbyforge_protocol::{ErrorDetail, ProtocolError, ServerResponse};
use lobbyforge_settlement::SettlementError;
use lobbyforge_store::StoreError;
use lobbyforge_wallet::WalletError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors. Use
/// [`code`](Self::code) and [`kind`](Self::kind) to classify an error for a
/// client, or [`to_response`](Self::to_response) to build the reply.
#[derive(Debug, thiserror::Error)]
pub enum LobbyforgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Configuration could not be read or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

/// HTTP-style status and stable machine name.
type Class = (u16, &'static str);

const VALIDATION: Class = (400, "validation");
const INSUFFICIENT_BALANCE: Class = (402, "insufficient_balance");
const NOT_FOUND: Class = (404, "not_found");
const STATE_CONFLICT: Class = (409, "state_conflict");
const ALREADY_COMMITTED: Class = (409, "already_committed");
const INTERNAL: Class = (500, "internal");
const UNAVAILABLE: Class = (503, "unavailable");

impl LobbyforgeError {
    /// HTTP-style status code.
    pub fn code(&self) -> u16 {
        self.class().0
    }

    /// Stable machine-readable name, e.g. `"already_committed"`.
    pub fn kind(&self) -> &'static str {
        self.class().1
    }

    /// Structured context for the caller, where there is any.
    pub fn detail(&self) -> Option<ErrorDetail> {
        match self {
            Self::Lobby(e) | Self::Settlement(SettlementError::Lobby(e)) => lobby_detail(e),
            Self::Store(e) | Self::Settlement(SettlementError::Store(e)) => store_detail(e),
            _ => None,
        }
    }

    /// The error as a [`ServerResponse::Error`].
    pub fn to_response(&self) -> ServerResponse {
        ServerResponse::Error {
            code: self.code(),
            kind: self.kind().to_string(),
            message: self.to_string(),
            detail: self.detail(),
        }
    }

    fn class(&self) -> Class {
        match self {
            Self::Protocol(ProtocolError::Encode(_)) => INTERNAL,
            Self::Protocol(_) | Self::Config(_) => VALIDATION,
            Self::Wallet(_) => UNAVAILABLE,
            Self::Store(e) => store_class(e),
            Self::Lobby(e) => lobby_class(e),
            Self::Settlement(SettlementError::Validation(_)) => VALIDATION,
            Self::Settlement(SettlementError::Lobby(e)) => lobby_class(e),
            Self::Settlement(SettlementError::Store(e)) => store_class(e),
        }
    }
}

fn lobby_class(err: &LobbyError) -> Class {
    match err {
        LobbyError::Validation(_) => VALIDATION,
        LobbyError::NotFound(_) | LobbyError::NotMember { .. } => NOT_FOUND,
        LobbyError::StateConflict { .. } => STATE_CONFLICT,
        LobbyError::AlreadyCommitted { .. } => ALREADY_COMMITTED,
        LobbyError::InsufficientBalance { .. } => INSUFFICIENT_BALANCE,
        LobbyError::Wallet(_) | LobbyError::Unavailable(_) => UNAVAILABLE,
        LobbyError::Store(e) => store_class(e),
    }
}

fn store_class(err: &StoreError) -> Class {
    match err {
        StoreError::NotFound(_)
        | StoreError::NotMember { .. }
        | StoreError::SettlementNotFound(_) => NOT_FOUND,
        StoreError::DuplicateLobby(_)
        | StoreError::StatusConflict { .. }
        | StoreError::LobbyFull(_)
        | StoreError::AlreadyMember { .. }
        | StoreError::AlreadySettled(_)
        | StoreError::SettlementSealed(_) => STATE_CONFLICT,
        StoreError::AlreadyCommitted { .. } => ALREADY_COMMITTED,
        StoreError::Snapshot(_) => INTERNAL,
        StoreError::Backend(_) => UNAVAILABLE,
    }
}

fn lobby_detail(err: &LobbyError) -> Option<ErrorDetail> {
    match err {
        LobbyError::StateConflict { status, .. } => {
            Some(ErrorDetail::StateConflict { status: *status })
        }
        LobbyError::AlreadyCommitted { lobby_id, .. } => Some(ErrorDetail::AlreadyCommitted {
            lobby_id: lobby_id.clone(),
        }),
        LobbyError::InsufficientBalance {
            required,
            available,
            deposit_address,
        } => Some(ErrorDetail::InsufficientBalance {
            required: *required,
            available: *available,
            deposit_address: deposit_address.clone(),
        }),
        LobbyError::Store(e) => store_detail(e),
        _ => None,
    }
}

fn store_detail(err: &StoreError) -> Option<ErrorDetail> {
    match err {
        StoreError::StatusConflict { current, .. } => Some(ErrorDetail::StateConflict {
            status: Some(*current),
        }),
        StoreError::AlreadyCommitted { lobby_id, .. } => Some(ErrorDetail::AlreadyCommitted {
            lobby_id: lobby_id.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::{Amount, LobbyId, LobbyStatus, WalletAddress};

    #[test]
    fn test_from_lobby_error() {
        let err: LobbyforgeError = LobbyError::NotFound(LobbyId::new("lob_x")).into();
        assert!(matches!(err, LobbyforgeError::Lobby(_)));
        assert_eq!(err.code(), 404);
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains("lob_x"));
    }

    #[test]
    fn test_insufficient_balance_carries_deposit_address() {
        let err: LobbyforgeError = LobbyError::InsufficientBalance {
            required: "0.05".parse().unwrap(),
            available: Amount::ZERO,
            deposit_address: WalletAddress::new("custody_1"),
        }
        .into();
        assert_eq!(err.code(), 402);
        match err.to_response() {
            ServerResponse::Error { kind, detail, .. } => {
                assert_eq!(kind, "insufficient_balance");
                assert!(matches!(
                    detail,
                    Some(ErrorDetail::InsufficientBalance { deposit_address, .. })
                        if deposit_address.as_str() == "custody_1"
                ));
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn test_conflict_through_settlement_keeps_status() {
        let err: LobbyforgeError = SettlementError::Lobby(LobbyError::StateConflict {
            lobby_id: LobbyId::new("lob_1"),
            status: Some(LobbyStatus::Completed),
            reason: "cannot settle a lobby that is completed".into(),
        })
        .into();
        assert_eq!(err.kind(), "state_conflict");
        assert_eq!(
            err.detail(),
            Some(ErrorDetail::StateConflict {
                status: Some(LobbyStatus::Completed)
            })
        );
    }

    #[test]
    fn test_wallet_outage_is_unavailable() {
        let err: LobbyforgeError =
            LobbyError::Wallet(WalletError::Unavailable("down".into())).into();
        assert_eq!(err.code(), 503);
        assert_eq!(err.kind(), "unavailable");
    }

    #[test]
    fn test_already_committed_from_store() {
        let err: LobbyforgeError = StoreError::AlreadyCommitted {
            wallet: WalletAddress::new("alice"),
            lobby_id: LobbyId::new("lob_other"),
        }
        .into();
        assert_eq!(err.code(), 409);
        assert_eq!(err.kind(), "already_committed");
        assert_eq!(
            err.detail(),
            Some(ErrorDetail::AlreadyCommitted {
                lobby_id: LobbyId::new("lob_other")
            })
        );
    }
}
