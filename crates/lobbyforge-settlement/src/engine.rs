//! Settlement engine: results in, audited payout out, exactly once.
//!
//! # Flow
//!
//! 1. Validate the results and build the payout plan. Nothing is written
//!    yet, so a rejected submission leaves no trace.
//! 2. Win the `active → completed` transition through the lobby manager.
//!    This single conditional write is the idempotency guard: a second
//!    submission for the same lobby loses it and gets a state conflict.
//! 3. Insert the settlement record, run the transfers, append each
//!    outcome as it lands, then write the full record and seal it.
//!    The engine keeps its own copy of the record throughout. A store
//!    failure past step 2 is logged, never returned: the lobby is already
//!    completed and money may have moved, so the caller always gets the
//!    summary, and the seal rewrites whatever the appends missed.
//! 4. Hand a completed permanent lobby to the watchdog.
//!
//! Transfers run after the guard is won, outside the lobby actor, so a
//! slow wallet never blocks lifecycle commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use lobbyforge_lobby::{LobbyError, LobbyManager, Watchdog};
use lobbyforge_protocol::{
    Amount, LobbyId, LobbyStatus, MatchOutcome, PlayerPayout, PlayerResult, SettlementSummary,
    TransferResult,
};
use lobbyforge_store::{SessionStore, SettlementRecord};
use lobbyforge_wallet::WalletGateway;

use crate::plan::{plan_settlement, side_of};
use crate::{SettlementConfig, SettlementError, TransferExecutor};

const SEAL_ATTEMPTS: u32 = 4;
const SEAL_BACKOFF: Duration = Duration::from_millis(100);

/// Settles finished games.
///
/// The engine owns no lobby state. It reads the lobby and its members
/// from the store, asks the [`LobbyManager`] for the `completed`
/// transition, and moves funds through a [`TransferExecutor`] built on
/// the manager's balance cache. Sharing one engine across tasks is fine:
/// concurrent submissions for the same lobby race on the manager's
/// guard, and only one of them reaches the executor.
pub struct SettlementEngine<S: SessionStore, W: WalletGateway> {
    manager: Arc<LobbyManager<S, W>>,
    watchdog: Option<Arc<Watchdog<S, W>>>,
    executor: TransferExecutor<W>,
    config: SettlementConfig,
}

impl<S: SessionStore, W: WalletGateway> SettlementEngine<S, W> {
    /// Builds an engine that moves funds through the manager's wallet
    /// gateway. Account lookups share the manager's balance cache, and
    /// confirmed transfers invalidate its entries.
    pub fn new(manager: Arc<LobbyManager<S, W>>, config: SettlementConfig) -> Self {
        let config = config.validated();
        let executor = TransferExecutor::new(
            Arc::clone(manager.balances()),
            config.transfer_timeout(),
            config.max_concurrent_transfers,
        );
        Self {
            manager,
            watchdog: None,
            executor,
            config,
        }
    }

    /// Notifies `watchdog` when a permanent lobby is settled.
    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog<S, W>>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settles an `active` lobby.
    ///
    /// Succeeds even if some or all transfers fail; the summary shows
    /// intended and actual amounts per player.
    ///
    /// # Errors
    /// - [`SettlementError::Validation`] for results that do not match the
    ///   lobby's members.
    /// - [`LobbyError::NotFound`] / [`LobbyError::StateConflict`] (wrapped)
    ///   for an unknown lobby or one that is not `active`, including any
    ///   repeat submission.
    pub async fn submit_results(
        &self,
        lobby_id: &LobbyId,
        results: Vec<PlayerResult>,
    ) -> Result<SettlementSummary, SettlementError> {
        let store = self.manager.store();
        let lobby = store
            .lobby(lobby_id)
            .await?
            .ok_or_else(|| LobbyError::NotFound(lobby_id.clone()))?;
        if lobby.status != LobbyStatus::Active {
            tracing::debug!(%lobby_id, status = %lobby.status, "results rejected, lobby not active");
            return Err(LobbyError::StateConflict {
                lobby_id: lobby_id.clone(),
                status: Some(lobby.status),
                reason: format!("cannot settle a lobby that is {}", lobby.status),
            }
            .into());
        }

        let members = store.memberships(lobby_id).await?;
        let plan = plan_settlement(lobby.wager, &members, &results, self.config.tie_policy)?;

        // Idempotency guard. Only one caller gets past this line.
        let completed = self.manager.complete(lobby_id).await?;

        // From here on the lobby is completed and funds may move, so store
        // failures are logged and never abort the settlement.
        let transfers = plan.payout.transfers().to_vec();
        let mut record = SettlementRecord {
            lobby_id: lobby_id.clone(),
            wager: lobby.wager,
            outcome: plan.outcome.clone(),
            results: plan.results.clone(),
            plan: transfers.clone(),
            outcomes: Vec::with_capacity(transfers.len()),
            created_at: Utc::now(),
            sealed_at: None,
        };
        if let Err(e) = store.insert_settlement(record.clone()).await {
            tracing::warn!(%lobby_id, error = %e, "failed to open settlement record");
        }
        tracing::info!(
            %lobby_id,
            wager = %lobby.wager,
            planned = transfers.len(),
            "settlement started"
        );

        let mut outcomes = std::pin::pin!(self.executor.execute(transfers));
        while let Some(outcome) = outcomes.next().await {
            if let Err(e) = store.append_transfer_outcome(lobby_id, outcome.clone()).await {
                tracing::warn!(%lobby_id, error = %e, "failed to record transfer outcome");
            }
            record.outcomes.push(outcome);
        }

        let record = self.seal(record).await;
        let summary = summarize(&record);
        tracing::info!(
            %lobby_id,
            confirmed = summary.confirmed_transfers(),
            attempted = summary.transfers.len(),
            sealed = record.is_sealed(),
            "settlement finished"
        );

        if completed.permanent {
            if let Some(watchdog) = &self.watchdog {
                if let Err(e) = watchdog.on_lobby_completed(&completed).await {
                    tracing::warn!(%lobby_id, error = %e, "failed to refill permanent slot");
                }
            }
        }

        Ok(summary)
    }

    /// Writes the full record and seals it, retrying with backoff.
    ///
    /// Gives up after [`SEAL_ATTEMPTS`] and returns the in-memory record
    /// unsealed; the transfers already happened either way.
    async fn seal(&self, record: SettlementRecord) -> SettlementRecord {
        let store = self.manager.store();
        let mut backoff = SEAL_BACKOFF;
        for attempt in 1..=SEAL_ATTEMPTS {
            match store.seal_settlement(record.clone(), Utc::now()).await {
                Ok(sealed) => return sealed,
                Err(e) if attempt < SEAL_ATTEMPTS => {
                    tracing::warn!(lobby_id = %record.lobby_id, attempt, error = %e, "seal failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    tracing::error!(
                        lobby_id = %record.lobby_id,
                        outcomes = record.outcomes.len(),
                        error = %e,
                        "settlement record could not be sealed"
                    );
                }
            }
        }
        record
    }

    /// The summary of a finished settlement, if the lobby has one.
    pub async fn settlement(
        &self,
        lobby_id: &LobbyId,
    ) -> Result<Option<SettlementSummary>, SettlementError> {
        let record = self.manager.store().settlement(lobby_id).await?;
        Ok(record.as_ref().map(summarize))
    }
}

/// Builds the client-facing summary from a settlement record.
///
/// Each player gets two pairs of numbers:
///
/// - `intended_credit` / `intended_debit` come from the plan: what the
///   player should have received or paid.
/// - `credited` / `debited` sum the confirmed transfers only: what
///   actually moved.
///
/// A gap between the two is how a client sees a failed transfer without
/// reading the raw outcome list. `losers` is empty for a tie.
pub fn summarize(record: &SettlementRecord) -> SettlementSummary {
    let decided = matches!(record.outcome, MatchOutcome::Decided { .. });

    let payouts = record
        .results
        .iter()
        .map(|r| {
            let mut credited = Amount::ZERO;
            let mut debited = Amount::ZERO;
            for o in record
                .outcomes
                .iter()
                .filter(|o| matches!(o.result, TransferResult::Confirmed { .. }))
            {
                if o.to == r.wallet {
                    credited = credited.saturating_add(o.amount);
                }
                if o.from == r.wallet {
                    debited = debited.saturating_add(o.amount);
                }
            }
            PlayerPayout {
                wallet: r.wallet.clone(),
                side: side_of(&r.wallet, r.team),
                score: r.score,
                won: r.won,
                intended_credit: r.intended_payout,
                intended_debit: record
                    .plan
                    .iter()
                    .filter(|t| t.from == r.wallet)
                    .fold(Amount::ZERO, |acc, t| acc.saturating_add(t.amount)),
                credited,
                debited,
            }
        })
        .collect();

    SettlementSummary {
        lobby_id: record.lobby_id.clone(),
        wager: record.wager,
        outcome: record.outcome.clone(),
        winners: record
            .results
            .iter()
            .filter(|r| r.won)
            .map(|r| r.wallet.clone())
            .collect(),
        losers: record
            .results
            .iter()
            .filter(|r| decided && !r.won)
            .map(|r| r.wallet.clone())
            .collect(),
        payouts,
        transfers: record.outcomes.clone(),
    }
}
