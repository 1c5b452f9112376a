//! Bounded-staleness balance cache in front of a [`WalletGateway`].
//!
//! Join-time admission checks go through this cache. It answers from memory
//! while an entry is younger than the TTL, refreshes from the gateway after
//! that, and falls back to the last known value if the refresh fails.
//! It never invents a balance for an address it has not seen.
//!
//! Cached balances are good enough to admit a player to a lobby, but they
//! are never used to authorize moving funds: only
//! [`WalletGateway::transfer`] decides that.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lobbyforge_protocol::{Amount, WalletAddress};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{CustodialAccount, WalletError, WalletGateway};

/// Settings for [`BalanceCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceCacheConfig {
    /// How long (in seconds) a fetched balance is served without refresh.
    pub ttl_secs: u64,
}

impl Default for BalanceCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 20 }
    }
}

struct CachedBalance {
    amount: Amount,
    fetched_at: Instant,
}

/// Caches balances and custodial account lookups for one gateway.
pub struct BalanceCache<W: WalletGateway> {
    gateway: Arc<W>,
    /// Last fetched balance per custodial address.
    balances: Mutex<HashMap<WalletAddress, CachedBalance>>,
    /// Owner → custodial account. Never expires: the mapping is stable.
    accounts: Mutex<HashMap<WalletAddress, CustodialAccount>>,
    ttl: Duration,
}

impl<W: WalletGateway> BalanceCache<W> {
    pub fn new(gateway: Arc<W>, config: BalanceCacheConfig) -> Self {
        Self {
            gateway,
            balances: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// The wrapped gateway.
    pub fn gateway(&self) -> &Arc<W> {
        &self.gateway
    }

    /// Returns the player's custodial account, asking the gateway once.
    pub async fn custodial_account(
        &self,
        owner: &WalletAddress,
    ) -> Result<CustodialAccount, WalletError> {
        if let Some(account) = self.accounts.lock().await.get(owner) {
            return Ok(account.clone());
        }
        let account = self.gateway.custodial_account(owner).await?;
        self.accounts
            .lock()
            .await
            .insert(owner.clone(), account.clone());
        Ok(account)
    }

    /// Returns the balance at `address`, at most `ttl` stale.
    ///
    /// # Errors
    /// [`WalletError::UnknownBalance`] if the gateway fails and no earlier
    /// value exists for this address.
    pub async fn balance_of(&self, address: &WalletAddress) -> Result<Amount, WalletError> {
        let cached = self
            .balances
            .lock()
            .await
            .get(address)
            .map(|c| (c.amount, c.fetched_at));

        if let Some((amount, fetched_at)) = cached {
            if fetched_at.elapsed() < self.ttl {
                return Ok(amount);
            }
        }

        match self.gateway.balance_of(address).await {
            Ok(amount) => {
                self.balances.lock().await.insert(
                    address.clone(),
                    CachedBalance {
                        amount,
                        fetched_at: Instant::now(),
                    },
                );
                Ok(amount)
            }
            Err(e) => match cached {
                Some((amount, fetched_at)) => {
                    tracing::warn!(
                        %address,
                        error = %e,
                        age_secs = fetched_at.elapsed().as_secs(),
                        "balance refresh failed, serving last known value"
                    );
                    Ok(amount)
                }
                None => {
                    tracing::warn!(%address, error = %e, "balance unavailable, nothing cached");
                    Err(WalletError::UnknownBalance(address.clone()))
                }
            },
        }
    }

    /// Drops the cached balance for `address` so the next read refreshes.
    pub async fn invalidate(&self, address: &WalletAddress) {
        self.balances.lock().await.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryWallet;

    fn units(n: u64) -> Amount {
        Amount::from_base_units(n)
    }

    async fn setup(ttl_secs: u64) -> (Arc<InMemoryWallet>, BalanceCache<InMemoryWallet>, WalletAddress) {
        let wallet = Arc::new(InMemoryWallet::new());
        let owner = WalletAddress::new("alice");
        let account = wallet.custodial_account(&owner).await.unwrap();
        wallet.deposit(&account.address, units(100)).await;
        let cache = BalanceCache::new(Arc::clone(&wallet), BalanceCacheConfig { ttl_secs });
        (wallet, cache, account.address)
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_cached_value_within_ttl() {
        let (wallet, cache, addr) = setup(20).await;
        assert_eq!(cache.balance_of(&addr).await.unwrap(), units(100));

        wallet.deposit(&addr, units(50)).await;
        assert_eq!(cache.balance_of(&addr).await.unwrap(), units(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_after_ttl() {
        let (wallet, cache, addr) = setup(20).await;
        cache.balance_of(&addr).await.unwrap();
        wallet.deposit(&addr, units(50)).await;

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(cache.balance_of(&addr).await.unwrap(), units(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_last_known_on_failure() {
        let (wallet, cache, addr) = setup(20).await;
        cache.balance_of(&addr).await.unwrap();

        wallet.set_offline(true).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.balance_of(&addr).await.unwrap(), units(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fabricates_unseen_balance() {
        let (wallet, cache, _) = setup(20).await;
        wallet.set_offline(true).await;

        let unseen = WalletAddress::new("custody_never_seen");
        let err = cache.balance_of(&unseen).await.unwrap_err();
        assert!(matches!(err, WalletError::UnknownBalance(a) if a == unseen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh() {
        let (wallet, cache, addr) = setup(20).await;
        cache.balance_of(&addr).await.unwrap();
        wallet.deposit(&addr, units(1)).await;

        cache.invalidate(&addr).await;
        assert_eq!(cache.balance_of(&addr).await.unwrap(), units(101));
    }

    #[tokio::test]
    async fn test_custodial_account_is_memoized() {
        let (_wallet, cache, addr) = setup(20).await;
        let owner = WalletAddress::new("alice");
        let a = cache.custodial_account(&owner).await.unwrap();
        let b = cache.custodial_account(&owner).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.address, addr);
    }
}
