//! End-to-end settlement against the in-memory store and wallet.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lobbyforge_lobby::{
    EventBus, LobbyConfig, LobbyError, LobbyManager, PermanentSlot, Watchdog, WatchdogConfig,
};
use lobbyforge_protocol::{
    Amount, GameType, LobbyId, LobbyStatus, MatchOutcome, PlayerResult, Side, TransferOutcome,
    TransferResult, WalletAddress,
};
use lobbyforge_settlement::{SettlementConfig, SettlementEngine, SettlementError, TiePolicy};
use lobbyforge_store::{
    InMemoryStore, Lobby, LobbyFilter, Membership, SessionStore, SettlementRecord, StoreError,
};
use lobbyforge_wallet::{BalanceCache, BalanceCacheConfig, InMemoryWallet, WalletGateway};

// =========================================================================
// Helpers
// =========================================================================

type Wallet = InMemoryWallet;

struct Harness<S: SessionStore = InMemoryStore> {
    manager: Arc<LobbyManager<S, Wallet>>,
    watchdog: Arc<Watchdog<S, Wallet>>,
    engine: Arc<SettlementEngine<S, Wallet>>,
    store: Arc<S>,
    wallet: Arc<Wallet>,
}

fn harness_on<S: SessionStore>(store: Arc<S>, settlement: SettlementConfig) -> Harness<S> {
    let wallet = Arc::new(InMemoryWallet::new());
    let balances = Arc::new(BalanceCache::new(
        Arc::clone(&wallet),
        BalanceCacheConfig::default(),
    ));
    let lobby_config = LobbyConfig {
        countdown_secs: 1,
        ..LobbyConfig::default()
    };
    let manager = Arc::new(LobbyManager::new(
        Arc::clone(&store),
        balances,
        Arc::new(EventBus::default()),
        lobby_config.clone(),
    ));
    let watchdog = Arc::new(Watchdog::new(
        Arc::clone(&manager),
        WatchdogConfig {
            slots: vec![PermanentSlot {
                wager: stake("0.05"),
                game_type: GameType::Duel,
            }],
            maintenance_interval_secs: 30,
        }
        .validated(&lobby_config)
        .unwrap(),
    ));
    let engine = Arc::new(
        SettlementEngine::new(Arc::clone(&manager), settlement)
            .with_watchdog(Arc::clone(&watchdog)),
    );
    Harness {
        manager,
        watchdog,
        engine,
        store,
        wallet,
    }
}

fn harness_with(settlement: SettlementConfig) -> Harness {
    harness_on(Arc::new(InMemoryStore::new()), settlement)
}

fn harness() -> Harness {
    harness_with(SettlementConfig::default())
}

fn stake(s: &str) -> Amount {
    s.parse().unwrap()
}

fn player(name: &str) -> WalletAddress {
    WalletAddress::new(name)
}

fn result(name: &str, score: u64) -> PlayerResult {
    PlayerResult {
        wallet: player(name),
        team: None,
        score,
    }
}

impl<S: SessionStore> Harness<S> {
    async fn custody(&self, name: &str) -> WalletAddress {
        self.wallet
            .custodial_account(&player(name))
            .await
            .unwrap()
            .address
    }

    async fn balance(&self, name: &str) -> Amount {
        let address = self.custody(name).await;
        self.wallet.balance(&address).await
    }

    /// Funds every player with 1 unit, seats them, and waits for the game
    /// to start.
    async fn active_lobby(&self, wager: &str, game_type: GameType, names: &[&str]) -> LobbyId {
        let id = self
            .manager
            .create_lobby(stake(wager), game_type, Some(names.len()))
            .await
            .unwrap()
            .lobby_id;
        self.seat(&id, names).await;
        id
    }

    async fn seat(&self, id: &LobbyId, names: &[&str]) {
        for name in names {
            let address = self.custody(name).await;
            self.wallet.deposit(&address, stake("1")).await;
            self.manager.join_lobby(id, player(name)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            self.store.lobby(id).await.unwrap().unwrap().status,
            LobbyStatus::Active
        );
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_free_lobby_settles_without_transfers() {
    let h = harness();
    let id = h.active_lobby("0", GameType::Duel, &["a", "b"]).await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 3), result("b", 1)])
        .await
        .unwrap();

    assert!(summary.transfers.is_empty());
    assert_eq!(summary.winners, vec![player("a")]);
    assert_eq!(h.wallet.transfer_count().await, 0);
    let lobby = h.store.lobby(&id).await.unwrap().unwrap();
    assert_eq!(lobby.status, LobbyStatus::Completed);

    let record = h.store.settlement(&id).await.unwrap().unwrap();
    assert!(record.is_sealed());
    assert!(record.outcomes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wagered_duel_moves_one_stake() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();

    assert_eq!(summary.transfers.len(), 1);
    let transfer = &summary.transfers[0];
    assert_eq!(transfer.from, player("b"));
    assert_eq!(transfer.to, player("a"));
    assert_eq!(transfer.amount, stake("0.05"));
    assert!(transfer.result.is_confirmed());

    assert_eq!(h.balance("a").await, stake("1.05"));
    assert_eq!(h.balance("b").await, stake("0.95"));

    let a = summary.payouts.iter().find(|p| p.wallet == player("a")).unwrap();
    assert_eq!(a.credited, stake("0.05"));
    assert_eq!(a.intended_credit, stake("0.05"));
    let b = summary.payouts.iter().find(|p| p.wallet == player("b")).unwrap();
    assert_eq!(b.debited, stake("0.05"));
    assert_eq!(b.intended_debit, stake("0.05"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_transfer_still_completes_lobby() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;
    let winner_custody = h.custody("a").await;
    h.wallet.fail_transfers_to(&winner_custody).await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();

    assert_eq!(summary.transfers.len(), 1);
    assert!(matches!(
        summary.transfers[0].result,
        TransferResult::Failed { .. }
    ));
    assert_eq!(summary.confirmed_transfers(), 0);
    let a = summary.payouts.iter().find(|p| p.wallet == player("a")).unwrap();
    assert_eq!(a.intended_credit, stake("0.05"));
    assert_eq!(a.credited, Amount::ZERO);

    assert_eq!(
        h.store.lobby(&id).await.unwrap().unwrap().status,
        LobbyStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_balance_drained_after_join_fails_at_transfer() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;
    let loser_custody = h.custody("b").await;
    h.wallet.withdraw(&loser_custody, stake("1")).await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();

    assert!(matches!(
        &summary.transfers[0].result,
        TransferResult::Failed { reason } if reason == "insufficient funds"
    ));
    assert_eq!(h.balance("a").await, stake("1"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_transfer_times_out_and_is_recorded() {
    let h = harness_with(SettlementConfig {
        transfer_timeout_secs: 2,
        ..SettlementConfig::default()
    });
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;
    h.wallet.set_latency(Duration::from_secs(60)).await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();

    assert!(matches!(
        &summary.transfers[0].result,
        TransferResult::Failed { reason } if reason == "timed out"
    ));
    assert_eq!(h.wallet.transfer_count().await, 0);
}

// =========================================================================
// Idempotence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_second_submission_is_conflict() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;

    h.engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();
    let err = h
        .engine
        .submit_results(&id, vec![result("a", 1), result("b", 9)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SettlementError::Lobby(LobbyError::StateConflict {
            status: Some(LobbyStatus::Completed),
            ..
        })
    ));
    assert_eq!(h.wallet.transfer_count().await, 1);
    assert_eq!(h.balance("a").await, stake("1.05"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_settle_once() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let engine = Arc::clone(&h.engine);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .submit_results(&id, vec![result("a", 5), result("b", 2)])
                .await
        }));
    }
    let mut ok = 0;
    for t in tasks {
        match t.await.unwrap() {
            Ok(_) => ok += 1,
            Err(SettlementError::Lobby(LobbyError::StateConflict { .. })) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(h.wallet.transfer_count().await, 1);
    assert_eq!(
        h.store.settlement(&id).await.unwrap().unwrap().outcomes.len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_results_leave_lobby_active() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;

    let err = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("mallory", 9)])
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));
    assert_eq!(
        h.store.lobby(&id).await.unwrap().unwrap().status,
        LobbyStatus::Active
    );
    assert!(h.store.settlement(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_waiting_lobby_cannot_be_settled() {
    let h = harness();
    let id = h
        .manager
        .create_lobby(Amount::ZERO, GameType::Duel, None)
        .await
        .unwrap()
        .lobby_id;
    let err = h
        .engine
        .submit_results(&id, vec![result("a", 1)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Lobby(LobbyError::StateConflict {
            status: Some(LobbyStatus::Waiting),
            ..
        })
    ));

    let err = h
        .engine
        .submit_results(&LobbyId::new("lob_missing"), vec![result("a", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Lobby(LobbyError::NotFound(_))));
}

// =========================================================================
// Payout policy
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_team_match_conserves_funds() {
    let h = harness();
    let names = ["a", "b", "c", "d"];
    let id = h
        .active_lobby("0.05", GameType::TeamDeathmatch, &names)
        .await;

    // a, c on team 0; b, d on team 1.
    let summary = h
        .engine
        .submit_results(
            &id,
            vec![result("a", 1), result("b", 3), result("c", 2), result("d", 4)],
        )
        .await
        .unwrap();

    assert_eq!(
        summary.outcome,
        MatchOutcome::Decided {
            winner: Side::Team(1)
        }
    );
    assert_eq!(summary.transfers.len(), 4);
    assert_eq!(summary.confirmed_transfers(), 4);

    let credited = summary
        .payouts
        .iter()
        .fold(Amount::ZERO, |acc, p| acc.saturating_add(p.credited));
    let debited = summary
        .payouts
        .iter()
        .fold(Amount::ZERO, |acc, p| acc.saturating_add(p.debited));
    // losers × winners × wager
    assert_eq!(credited, stake("0.2"));
    assert_eq!(debited, credited);

    for name in ["b", "d"] {
        assert_eq!(h.balance(name).await, stake("1.1"));
    }
    for name in ["a", "c"] {
        assert_eq!(h.balance(name).await, stake("0.9"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_tie_moves_nothing_by_default() {
    let h = harness();
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;
    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 2), result("b", 2)])
        .await
        .unwrap();
    assert_eq!(summary.outcome, MatchOutcome::Tie);
    assert!(summary.transfers.is_empty());
    assert!(summary.winners.is_empty() && summary.losers.is_empty());
    assert_eq!(
        h.store.lobby(&id).await.unwrap().unwrap().status,
        LobbyStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_tie_with_first_side_wins_pays_out() {
    let h = harness_with(SettlementConfig {
        tie_policy: TiePolicy::FirstSideWins,
        ..SettlementConfig::default()
    });
    let id = h
        .active_lobby("0.05", GameType::TeamDeathmatch, &["a", "b"])
        .await;
    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 2), result("b", 2)])
        .await
        .unwrap();
    assert_eq!(
        summary.outcome,
        MatchOutcome::Decided {
            winner: Side::Team(0)
        }
    );
    assert_eq!(summary.winners, vec![player("a")]);
    assert_eq!(summary.transfers.len(), 1);
}

// =========================================================================
// Watchdog hand-off
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_settling_permanent_lobby_refills_slot() {
    let h = harness();
    let slot_lobby = h
        .watchdog
        .list_available(Some(stake("0.05")), Some(GameType::Duel))
        .await
        .unwrap()[0]
        .lobby_id
        .clone();
    h.seat(&slot_lobby, &["a", "b"]).await;

    h.engine
        .submit_results(&slot_lobby, vec![result("a", 1), result("b", 0)])
        .await
        .unwrap();

    let open = h.store
        .find_lobbies(&LobbyFilter::joinable().wager(stake("0.05")))
        .await
        .unwrap();
    assert_eq!(open.len(), 1, "slot refilled right after completion");
    assert!(open[0].permanent);
    assert_ne!(open[0].id, slot_lobby);

    let summary = h.engine.settlement(&slot_lobby).await.unwrap().unwrap();
    assert_eq!(summary.winners, vec![player("a")]);
}

// =========================================================================
// Store failures after completion
// =========================================================================

/// Refuses settlement writes: opening the record and appending outcomes
/// always fail, and the first `seal_failures` seals fail too.
struct FlakyStore {
    inner: InMemoryStore,
    seal_failures: AtomicUsize,
}

impl FlakyStore {
    fn new(seal_failures: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            seal_failures: AtomicUsize::new(seal_failures),
        }
    }
}

fn down() -> StoreError {
    StoreError::Backend("connection reset".into())
}

impl SessionStore for FlakyStore {
    async fn insert_lobby(&self, lobby: Lobby) -> Result<(), StoreError> {
        self.inner.insert_lobby(lobby).await
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

    async fn insert_settlement(&self, _record: SettlementRecord) -> Result<(), StoreError> {
        Err(down())
    }

    async fn append_transfer_outcome(
        &self,
        _id: &LobbyId,
        _outcome: TransferOutcome,
    ) -> Result<(), StoreError> {
        Err(down())
    }

    async fn seal_settlement(
        &self,
        record: SettlementRecord,
        at: DateTime<Utc>,
    ) -> Result<SettlementRecord, StoreError> {
        let failing = self
            .seal_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(down());
        }
        self.inner.seal_settlement(record, at).await
    }

    async fn settlement(&self, id: &LobbyId) -> Result<Option<SettlementRecord>, StoreError> {
        self.inner.settlement(id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_lost_appends_are_written_at_seal() {
    let h = harness_on(Arc::new(FlakyStore::new(2)), SettlementConfig::default());
    let id = h
        .active_lobby("0.05", GameType::FreeForAll, &["a", "b", "c"])
        .await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 9), result("b", 2), result("c", 1)])
        .await
        .unwrap();
    assert_eq!(summary.transfers.len(), 2);
    assert_eq!(summary.confirmed_transfers(), 2);

    let record = h.store.settlement(&id).await.unwrap().unwrap();
    assert!(record.is_sealed());
    assert_eq!(record.outcomes.len(), h.wallet.transfer_count().await);
    assert_eq!(
        h.store.lobby(&id).await.unwrap().unwrap().status,
        LobbyStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_unsealable_record_still_returns_summary() {
    let h = harness_on(Arc::new(FlakyStore::new(usize::MAX)), SettlementConfig::default());
    let id = h.active_lobby("0.05", GameType::Duel, &["a", "b"]).await;

    let summary = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();
    assert_eq!(summary.confirmed_transfers(), 1);
    assert_eq!(h.balance("a").await, stake("1.05"));

    // The guard was won, so a retry is still refused.
    let err = h
        .engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Lobby(LobbyError::StateConflict { .. })
    ));
    assert_eq!(h.wallet.transfer_count().await, 1);
}

// =========================================================================
// Balance cache after settlement
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_lost_stake_is_not_reused_for_next_join() {
    let h = harness();
    let id = h
        .manager
        .create_lobby(stake("0.05"), GameType::Duel, None)
        .await
        .unwrap()
        .lobby_id;
    for (name, funds) in [("a", "1"), ("b", "0.05")] {
        let address = h.custody(name).await;
        h.wallet.deposit(&address, stake(funds)).await;
        h.manager.join_lobby(&id, player(name)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(3)).await;

    h.engine
        .submit_results(&id, vec![result("a", 5), result("b", 2)])
        .await
        .unwrap();
    assert_eq!(h.balance("b").await, Amount::ZERO);

    // Well inside the cache TTL: the cached 0.05 must not admit b again.
    let next = h
        .manager
        .create_lobby(stake("0.05"), GameType::Duel, None)
        .await
        .unwrap()
        .lobby_id;
    let err = h.manager.join_lobby(&next, player("b")).await.unwrap_err();
    assert!(matches!(err, LobbyError::InsufficientBalance { .. }));
}
