//! Custodial wallet contract for Lobbyforge.
//!
//! - [`WalletGateway`] is the seam to the custody provider.
//! - [`BalanceCache`] bounds how often admission checks hit it.
//! - [`InMemoryWallet`] is a complete gateway for tests and demos.

mod cache;
mod error;
mod gateway;
mod memory;

pub use cache::{BalanceCache, BalanceCacheConfig};
pub use error::WalletError;
pub use gateway::{CustodialAccount, TransferFailure, TransferReceipt, WalletGateway};
pub use memory::{InMemoryWallet, LoggedTransfer};
