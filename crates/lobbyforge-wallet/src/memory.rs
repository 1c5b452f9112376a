//! In-process [`WalletGateway`] for tests, demos, and local development.
//!
//! Balances live in a map keyed by address. Transfers check the balance
//! at the moment they run, exactly like a real custody provider would, so
//! a player who drains their custodial account after joining produces a
//! failed transfer during settlement.
//!
//! A few knobs simulate the failure modes a real gateway has:
//! [`set_offline`](InMemoryWallet::set_offline),
//! [`fail_transfers_to`](InMemoryWallet::fail_transfers_to), and
//! [`set_latency`](InMemoryWallet::set_latency).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use lobbyforge_protocol::{Amount, WalletAddress};
use rand::Rng;
use tokio::sync::Mutex;

use crate::{CustodialAccount, TransferFailure, TransferReceipt, WalletError, WalletGateway};

/// One transfer as recorded by [`InMemoryWallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedTransfer {
    pub from: WalletAddress,
    pub to: WalletAddress,
    pub amount: Amount,
    pub receipt: TransferReceipt,
}

#[derive(Default)]
struct Ledger {
    balances: HashMap<WalletAddress, Amount>,
    /// owner → custodial address
    custody: HashMap<WalletAddress, WalletAddress>,
    offline: bool,
    rejected_destinations: HashSet<WalletAddress>,
    latency: Duration,
    log: Vec<LoggedTransfer>,
}

/// A wallet gateway backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryWallet {
    ledger: Mutex<Ledger>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` to `address` out of thin air.
    pub async fn deposit(&self, address: &WalletAddress, amount: Amount) {
        let mut ledger = self.ledger.lock().await;
        let entry = ledger.balances.entry(address.clone()).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Debits up to `amount` from `address`, simulating an external withdrawal.
    pub async fn withdraw(&self, address: &WalletAddress, amount: Amount) {
        let mut ledger = self.ledger.lock().await;
        let entry = ledger.balances.entry(address.clone()).or_default();
        *entry = entry.checked_sub(amount).unwrap_or(Amount::ZERO);
    }

    /// Current balance, bypassing offline mode. Zero for unknown addresses.
    pub async fn balance(&self, address: &WalletAddress) -> Amount {
        self.ledger
            .lock()
            .await
            .balances
            .get(address)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// While offline, every gateway call fails.
    pub async fn set_offline(&self, offline: bool) {
        self.ledger.lock().await.offline = offline;
    }

    /// Makes every transfer to `destination` fail.
    pub async fn fail_transfers_to(&self, destination: &WalletAddress) {
        self.ledger
            .lock()
            .await
            .rejected_destinations
            .insert(destination.clone());
    }

    /// Delay applied to each transfer before it runs.
    pub async fn set_latency(&self, latency: Duration) {
        self.ledger.lock().await.latency = latency;
    }

    /// Every transfer that succeeded, in order.
    pub async fn transfer_log(&self) -> Vec<LoggedTransfer> {
        self.ledger.lock().await.log.clone()
    }

    pub async fn transfer_count(&self) -> usize {
        self.ledger.lock().await.log.len()
    }

    fn random_hex() -> String {
        format!("{:016x}", rand::rng().random::<u64>())
    }
}

impl WalletGateway for InMemoryWallet {
    async fn custodial_account(
        &self,
        owner: &WalletAddress,
    ) -> Result<CustodialAccount, WalletError> {
        let mut ledger = self.ledger.lock().await;
        if ledger.offline {
            return Err(WalletError::Unavailable("wallet offline".into()));
        }
        let address = ledger
            .custody
            .entry(owner.clone())
            .or_insert_with(|| WalletAddress::new(format!("custody_{}", Self::random_hex())))
            .clone();
        Ok(CustodialAccount {
            owner: owner.clone(),
            address,
        })
    }

    async fn balance_of(&self, address: &WalletAddress) -> Result<Amount, WalletError> {
        let ledger = self.ledger.lock().await;
        if ledger.offline {
            return Err(WalletError::Unavailable("wallet offline".into()));
        }
        Ok(ledger.balances.get(address).copied().unwrap_or(Amount::ZERO))
    }

    async fn transfer(
        &self,
        from: &CustodialAccount,
        to: &WalletAddress,
        amount: Amount,
    ) -> Result<TransferReceipt, TransferFailure> {
        let latency = self.ledger.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut ledger = self.ledger.lock().await;
        if ledger.offline {
            return Err(TransferFailure::new("wallet offline"));
        }
        if ledger.rejected_destinations.contains(to) {
            return Err(TransferFailure::new(format!("destination {to} rejected")));
        }

        let available = ledger
            .balances
            .get(&from.address)
            .copied()
            .unwrap_or(Amount::ZERO);
        let Some(remaining) = available.checked_sub(amount) else {
            return Err(TransferFailure::new("insufficient funds"));
        };
        ledger.balances.insert(from.address.clone(), remaining);
        let credited = ledger.balances.entry(to.clone()).or_default();
        *credited = credited.saturating_add(amount);

        let receipt = TransferReceipt {
            id: format!("tx_{}", Self::random_hex()),
        };
        ledger.log.push(LoggedTransfer {
            from: from.address.clone(),
            to: to.clone(),
            amount,
            receipt: receipt.clone(),
        });
        tracing::debug!(from = %from.address, %to, %amount, %receipt, "in-memory transfer");
        Ok(receipt)
    }
}
