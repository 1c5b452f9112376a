//! A lobby looked up while its creation is still in flight must end up
//! with exactly one actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use lobbyforge_lobby::{EventBus, LobbyConfig, LobbyManager};
use lobbyforge_protocol::{Amount, GameType, LobbyId, LobbyStatus, TransferOutcome, WalletAddress};
use lobbyforge_store::{
    InMemoryStore, Lobby, LobbyFilter, Membership, SessionStore, SettlementRecord, StoreError,
};
use lobbyforge_wallet::{BalanceCache, BalanceCacheConfig, InMemoryWallet};
use tokio::sync::Notify;

// =========================================================================
// Gated store
// =========================================================================

/// Holds the first `insert_lobby` open after the row is written, until
/// the test releases it.
#[derive(Default)]
struct GatedStore {
    inner: InMemoryStore,
    armed: AtomicBool,
    inserted: Notify,
    release: Notify,
    lobby_id: std::sync::Mutex<Option<LobbyId>>,
}

impl GatedStore {
    fn armed() -> Self {
        let store = Self::default();
        store.armed.store(true, Ordering::SeqCst);
        store
    }

    fn lobby_id(&self) -> LobbyId {
        self.lobby_id.lock().unwrap().clone().unwrap()
    }
}

impl SessionStore for GatedStore {
    async fn insert_lobby(&self, lobby: Lobby) -> Result<(), StoreError> {
        let id = lobby.id.clone();
        self.inner.insert_lobby(lobby).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            *self.lobby_id.lock().unwrap() = Some(id);
            self.inserted.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }

    async fn lobby(&self, id: &LobbyId) -> Result<Option<Lobby>, StoreError> {
        self.inner.lobby(id).await
    }

    async fn find_lobbies(&self, filter: &LobbyFilter) -> Result<Vec<Lobby>, StoreError> {
        self.inner.find_lobbies(filter).await
    }

    async fn transition_status(
        &self,
        id: &LobbyId,
        from: &[LobbyStatus],
        to: LobbyStatus,
        at: DateTime<Utc>,
    ) -> Result<Lobby, StoreError> {
        self.inner.transition_status(id, from, to, at).await
    }

    async fn set_countdown(&self, id: &LobbyId, remaining: Option<u32>) -> Result<(), StoreError> {
        self.inner.set_countdown(id, remaining).await
    }

    async fn insert_membership(&self, membership: Membership) -> Result<usize, StoreError> {
        self.inner.insert_membership(membership).await
    }

    async fn remove_membership(
        &self,
        id: &LobbyId,
        wallet: &WalletAddress,
    ) -> Result<usize, StoreError> {
        self.inner.remove_membership(id, wallet).await
    }

    async fn memberships(&self, id: &LobbyId) -> Result<Vec<Membership>, StoreError> {
        self.inner.memberships(id).await
    }

    async fn open_commitment(
        &self,
        wallet: &WalletAddress,
        wager: Amount,
    ) -> Result<Option<LobbyId>, StoreError> {
        self.inner.open_commitment(wallet, wager).await
    }

    async fn create_if_absent(&self, candidate: Lobby) -> Result<(Lobby, bool), StoreError> {
        self.inner.create_if_absent(candidate).await
    }

    async fn insert_settlement(&self, record: SettlementRecord) -> Result<(), StoreError> {
        self.inner.insert_settlement(record).await
    }

    async fn append_transfer_outcome(
        &self,
        id: &LobbyId,
        outcome: TransferOutcome,
    ) -> Result<(), StoreError> {
        self.inner.append_transfer_outcome(id, outcome).await
    }

    async fn seal_settlement(
        &self,
        record: SettlementRecord,
        at: DateTime<Utc>,
    ) -> Result<SettlementRecord, StoreError> {
        self.inner.seal_settlement(record, at).await
    }

    async fn settlement(&self, id: &LobbyId) -> Result<Option<SettlementRecord>, StoreError> {
        self.inner.settlement(id).await
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_during_creation_uses_the_created_actor() {
    let store = Arc::new(GatedStore::armed());
    let balances = Arc::new(BalanceCache::new(
        Arc::new(InMemoryWallet::new()),
        BalanceCacheConfig::default(),
    ));
    let manager = Arc::new(LobbyManager::new(
        Arc::clone(&store),
        balances,
        Arc::new(EventBus::new(16)),
        LobbyConfig::default().validated().unwrap(),
    ));

    let creating = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .create_lobby(Amount::ZERO, GameType::FreeForAll, None)
                .await
        })
    };
    store.inserted.notified().await;
    let id = store.lobby_id();

    // The row is visible but the creator has not registered its actor.
    let joining = {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        tokio::spawn(async move { manager.join_lobby(&id, WalletAddress::new("alice")).await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    store.release.notify_one();

    creating.await.unwrap().unwrap();
    let joined = joining.await.unwrap().unwrap();
    assert_eq!(joined.member_count(), 1);

    // The actor that answers now is the one that seated alice.
    let lobby = manager.lobby(&id).await.unwrap();
    assert_eq!(lobby.member_count(), 1);
    assert_eq!(manager.active_actors().await, 1);
    let left = manager
        .leave_lobby(&id, WalletAddress::new("alice"))
        .await
        .unwrap();
    assert_eq!(left.member_count(), 0);
}
