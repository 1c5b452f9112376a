//! Error types for the wallet layer.

use lobbyforge_protocol::WalletAddress;

/// Errors from balance queries and custodial account lookups.
///
/// Transfer failures are not here: a failed transfer is an expected
/// outcome and is returned as a [`TransferFailure`](crate::TransferFailure)
/// value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletError {
    /// The gateway could not be reached or answered with an error.
    #[error("wallet gateway unavailable: {0}")]
    Unavailable(String),

    /// A balance was requested for an address the cache has never seen,
    /// and the gateway could not supply one.
    #[error("no balance known for {0}")]
    UnknownBalance(WalletAddress),

    /// The gateway refused to create or look up a custodial account.
    #[error("custodial account error for {owner}: {reason}")]
    Custody {
        owner: WalletAddress,
        reason: String,
    },
}
