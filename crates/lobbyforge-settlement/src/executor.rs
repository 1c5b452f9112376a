//! Transfer executor: runs a payout plan against the wallet gateway.
//!
//! Every planned transfer is an independent attempt. Attempts run
//! concurrently up to a limit and each produces exactly one
//! [`TransferOutcome`]. A failure is recorded and never retried, and it
//! never affects any other attempt.
//!
//! The timeout covers the whole attempt: resolving both custodial
//! accounts as well as the transfer itself. An account lookup that hangs
//! is reported as `timed out` like a hung transfer, so settlement always
//! finishes within one timeout per batch of concurrent attempts.
//!
//! Accounts are resolved through the shared [`BalanceCache`], and a
//! confirmed transfer drops the cached balances of both sides. The next
//! join-time admission check then sees the post-settlement balance
//! instead of the stake the player just lost.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use lobbyforge_protocol::{TransferOutcome, TransferResult};
use lobbyforge_store::PlannedTransfer;
use lobbyforge_wallet::{BalanceCache, TransferReceipt, WalletGateway};

pub struct TransferExecutor<W: WalletGateway> {
    balances: Arc<BalanceCache<W>>,
    timeout: Duration,
    max_concurrent: usize,
}

impl<W: WalletGateway> TransferExecutor<W> {
    pub fn new(balances: Arc<BalanceCache<W>>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            balances,
            timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Attempts every transfer, yielding outcomes as they finish.
    pub fn execute(
        &self,
        transfers: Vec<PlannedTransfer>,
    ) -> impl Stream<Item = TransferOutcome> + Send + '_ {
        stream::iter(transfers)
            .map(move |planned| self.attempt(planned))
            .buffer_unordered(self.max_concurrent)
    }

    async fn attempt(&self, planned: PlannedTransfer) -> TransferOutcome {
        let mut outcome = TransferOutcome {
            from: planned.from.clone(),
            to: planned.to.clone(),
            source: None,
            destination: None,
            amount: planned.amount,
            result: TransferResult::Failed {
                reason: String::new(),
            },
            attempted_at: Utc::now(),
        };

        let attempt = self.run(&planned, &mut outcome);
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(receipt)) => {
                tracing::info!(
                    from = %planned.from,
                    to = %planned.to,
                    amount = %planned.amount,
                    %receipt,
                    "transfer confirmed"
                );
                outcome.result = TransferResult::Confirmed { receipt: receipt.id };
                outcome
            }
            Ok(Err(reason)) => fail(outcome, reason),
            Err(_) => fail(outcome, "timed out".to_string()),
        }
    }

    /// Resolves both accounts and moves the funds, filling in the
    /// addresses on `outcome` as they become known.
    async fn run(
        &self,
        planned: &PlannedTransfer,
        outcome: &mut TransferOutcome,
    ) -> Result<TransferReceipt, String> {
        let source = self
            .balances
            .custodial_account(&planned.from)
            .await
            .map_err(|e| format!("source account unavailable: {e}"))?;
        outcome.source = Some(source.address.clone());

        let destination = self
            .balances
            .custodial_account(&planned.to)
            .await
            .map_err(|e| format!("destination account unavailable: {e}"))?
            .address;
        outcome.destination = Some(destination.clone());

        let receipt = self
            .balances
            .gateway()
            .transfer(&source, &destination, planned.amount)
            .await
            .map_err(|failure| failure.reason)?;

        self.balances.invalidate(&source.address).await;
        self.balances.invalidate(&destination).await;
        Ok(receipt)
    }
}

fn fail(mut outcome: TransferOutcome, reason: String) -> TransferOutcome {
    tracing::warn!(
        from = %outcome.from,
        to = %outcome.to,
        amount = %outcome.amount,
        %reason,
        "transfer failed"
    );
    outcome.result = TransferResult::Failed { reason };
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::{Amount, WalletAddress};
    use lobbyforge_wallet::{
        BalanceCacheConfig, CustodialAccount, InMemoryWallet, TransferFailure, WalletError,
    };

    /// A gateway whose account lookups never answer.
    struct StalledAccounts;

    impl WalletGateway for StalledAccounts {
        async fn custodial_account(
            &self,
            _owner: &WalletAddress,
        ) -> Result<CustodialAccount, WalletError> {
            std::future::pending().await
        }

        async fn balance_of(&self, _address: &WalletAddress) -> Result<Amount, WalletError> {
            Ok(Amount::ZERO)
        }

        async fn transfer(
            &self,
            _from: &CustodialAccount,
            _to: &WalletAddress,
            _amount: Amount,
        ) -> Result<TransferReceipt, TransferFailure> {
            Ok(TransferReceipt { id: "unreachable".into() })
        }
    }

    fn planned(from: &str, to: &str, amount: &str) -> PlannedTransfer {
        PlannedTransfer {
            from: WalletAddress::new(from),
            to: WalletAddress::new(to),
            amount: amount.parse().unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_account_lookup_times_out() {
        let balances = Arc::new(BalanceCache::new(
            Arc::new(StalledAccounts),
            BalanceCacheConfig::default(),
        ));
        let executor = TransferExecutor::new(balances, Duration::from_secs(5), 4);

        let outcomes: Vec<_> = executor
            .execute(vec![planned("bob", "alice", "0.05")])
            .collect()
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].source, None);
        assert_eq!(
            outcomes[0].result,
            TransferResult::Failed {
                reason: "timed out".into()
            }
        );
    }

    #[tokio::test]
    async fn test_confirmed_transfer_refreshes_cached_balances() {
        let wallet = Arc::new(InMemoryWallet::new());
        let balances = Arc::new(BalanceCache::new(
            Arc::clone(&wallet),
            BalanceCacheConfig { ttl_secs: 3600 },
        ));
        let bob = balances
            .custodial_account(&WalletAddress::new("bob"))
            .await
            .unwrap();
        wallet.deposit(&bob.address, "1".parse().unwrap()).await;
        assert_eq!(
            balances.balance_of(&bob.address).await.unwrap(),
            "1".parse().unwrap()
        );

        let executor = TransferExecutor::new(Arc::clone(&balances), Duration::from_secs(5), 4);
        let outcomes: Vec<_> = executor
            .execute(vec![planned("bob", "alice", "0.25")])
            .collect()
            .await;
        assert!(matches!(outcomes[0].result, TransferResult::Confirmed { .. }));

        assert_eq!(
            balances.balance_of(&bob.address).await.unwrap(),
            "0.75".parse().unwrap()
        );
    }
}
