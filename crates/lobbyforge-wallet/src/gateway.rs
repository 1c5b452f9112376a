//! The custodial wallet contract the core depends on.
//!
//! Lobbyforge does not hold keys or talk to a chain. It defines the
//! [`WalletGateway`] trait: three async operations that a custody provider
//! implements. Key management, transaction submission, and confirmation
//! waiting all live behind it.

use std::fmt;
use std::future::Future;

use lobbyforge_protocol::{Amount, WalletAddress};
use serde::{Deserialize, Serialize};

use crate::WalletError;

/// A player's system-held account.
///
/// The gateway signs transfers out of `address` on behalf of `owner`;
/// passing this handle to [`WalletGateway::transfer`] is the credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustodialAccount {
    /// The player's own (externally owned) wallet.
    pub owner: WalletAddress,
    /// The custodial address that holds stake funds.
    pub address: WalletAddress,
}

/// Confirmation of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Opaque confirmation identifier (e.g., a transaction signature).
    pub id: String,
}

impl fmt::Display for TransferReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A transfer that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{reason}")]
pub struct TransferFailure {
    pub reason: String,
}

impl TransferFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Custodial wallet operations.
///
/// Each call is an independent network operation with its own latency and
/// failure mode. Implementations must be `Send + Sync` because lobby actors
/// and settlement tasks call them concurrently.
///
/// # Contract
///
/// - [`custodial_account`](Self::custodial_account) is idempotent: the same
///   owner always maps to the same address.
/// - [`balance_of`](Self::balance_of) reports the balance the gateway
///   currently sees. Callers that need staleness bounds wrap the gateway in
///   a [`BalanceCache`](crate::BalanceCache).
/// - [`transfer`](Self::transfer) is a single best-effort attempt. It is
///   the only authority on whether funds can actually move; insufficient
///   funds at that moment is a `TransferFailure`, not a panic or an `Err`
///   of some outer operation.
pub trait WalletGateway: Send + Sync + 'static {
    /// Returns the custodial account for a player, creating it on first use.
    fn custodial_account(
        &self,
        owner: &WalletAddress,
    ) -> impl Future<Output = Result<CustodialAccount, WalletError>> + Send;

    /// Returns the balance held at `address`.
    fn balance_of(
        &self,
        address: &WalletAddress,
    ) -> impl Future<Output = Result<Amount, WalletError>> + Send;

    /// Moves `amount` out of `from` into `to`.
    fn transfer(
        &self,
        from: &CustodialAccount,
        to: &WalletAddress,
        amount: Amount,
    ) -> impl Future<Output = Result<TransferReceipt, TransferFailure>> + Send;
}
