//! Lobby actor: one Tokio task per open lobby.
//!
//! The actor is the only writer of its lobby's status and memberships.
//! Commands arrive on an mpsc channel and are handled one at a time, so
//! the capacity check and the membership insert of a join can never
//! interleave with another join. The countdown lives inside the same
//! `select!` loop: a leave that rolls the lobby back disarms it before the
//! next loop iteration, so no tick from the old arming can fire.
//!
//! ## Lifecycle
//!
//! ```text
//! waiting ──(min players)──▶ starting ──(countdown ends)──▶ active ──(complete)──▶ completed
//!    ▲                          │
//!    └──(leave below minimum)───┘
//!
//! waiting | starting ──(cancel, or last member leaves)──▶ cancelled
//! ```
//!
//! Every status change goes through the store's conditional
//! `transition_status` first and only then updates the actor's copy. If
//! the store refuses, the actor keeps its old view and the caller gets
//! the conflict.
//!
//! ## Who talks to the actor
//!
//! Nobody holds a `LobbyActor` directly. The manager keeps a
//! [`LobbyHandle`], which is just the sending half of the command channel
//! plus the lobby id. Each request packs a `oneshot::Sender` into the
//! command, and the handle awaits the matching receiver. When the actor
//! has stopped, the send fails and the handle reports
//! [`LobbyError::Unavailable`]; the manager then reads the stored status
//! to explain why.

use std::sync::Arc;

use chrono::Utc;
use lobbyforge_protocol::{
    LobbyEvent, LobbyId, LobbyStatus, LobbySummary, WalletAddress,
};
use lobbyforge_store::{Lobby, Membership, SessionStore};
use lobbyforge_tick::{Countdown, CountdownTick};
use lobbyforge_wallet::{BalanceCache, WalletGateway};
use tokio::sync::{mpsc, oneshot};

use crate::{LobbyConfig, LobbyError, StateBroadcaster};

type Reply<T> = oneshot::Sender<Result<T, LobbyError>>;

/// Commands sent to a lobby actor.
pub(crate) enum LobbyCommand {
    Join {
        wallet: WalletAddress,
        reply: Reply<LobbySummary>,
    },
    Leave {
        wallet: WalletAddress,
        reply: Reply<LobbySummary>,
    },
    /// Apply one countdown step immediately.
    Tick {
        reply: Reply<Option<CountdownTick>>,
    },
    /// `active → completed`. The actor stops afterwards.
    Complete { reply: Reply<Lobby> },
    Cancel {
        reason: String,
        reply: Reply<LobbySummary>,
    },
    Snapshot { reply: Reply<LobbySummary> },
    Shutdown,
}

/// Handle to a running lobby actor. Cheap to clone.
#[derive(Clone)]
pub struct LobbyHandle {
    lobby_id: LobbyId,
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    pub fn lobby_id(&self) -> &LobbyId {
        &self.lobby_id
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> LobbyCommand,
    ) -> Result<T, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))?
    }

    pub async fn join(&self, wallet: WalletAddress) -> Result<LobbySummary, LobbyError> {
        self.request(|reply| LobbyCommand::Join { wallet, reply })
            .await
    }

    pub async fn leave(&self, wallet: WalletAddress) -> Result<LobbySummary, LobbyError> {
        self.request(|reply| LobbyCommand::Leave { wallet, reply })
            .await
    }

    pub async fn tick(&self) -> Result<Option<CountdownTick>, LobbyError> {
        self.request(|reply| LobbyCommand::Tick { reply }).await
    }

    pub async fn complete(&self) -> Result<Lobby, LobbyError> {
        self.request(|reply| LobbyCommand::Complete { reply }).await
    }

    pub async fn cancel(&self, reason: String) -> Result<LobbySummary, LobbyError> {
        self.request(|reply| LobbyCommand::Cancel { reason, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<LobbySummary, LobbyError> {
        self.request(|reply| LobbyCommand::Snapshot { reply }).await
    }

    /// Stops the actor without touching the lobby's stored state.
    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.sender
            .send(LobbyCommand::Shutdown)
            .await
            .map_err(|_| LobbyError::Unavailable(self.lobby_id.clone()))
    }
}

/// What woke the actor's loop.
///
/// `select!` evaluates to one of these so the borrow of `self.receiver`
/// or `self.countdown` ends before the handler needs `&mut self`.
enum Wake {
    Command(Option<LobbyCommand>),
    Tick(CountdownTick),
}

struct LobbyActor<S: SessionStore, W: WalletGateway> {
    lobby: Lobby,
    members: Vec<Membership>,
    countdown: Countdown,
    config: Arc<LobbyConfig>,
    store: Arc<S>,
    balances: Arc<BalanceCache<W>>,
    broadcaster: Arc<dyn StateBroadcaster>,
    receiver: mpsc::Receiver<LobbyCommand>,
}

impl<S: SessionStore, W: WalletGateway> LobbyActor<S, W> {
    /// The actor loop.
    ///
    /// `biased` polls the command channel before the countdown. A leave
    /// queued in the same instant as a tick is applied first, so the
    /// lobby cannot go `active` with fewer players than it needs.
    ///
    /// The loop ends when every handle is dropped, on `Shutdown`, or once
    /// the lobby reaches a terminal status.
    async fn run(mut self) {
        tracing::debug!(lobby_id = %self.lobby.id, status = %self.lobby.status, "lobby actor started");

        loop {
            let wake = tokio::select! {
                biased;
                cmd = self.receiver.recv() => Wake::Command(cmd),
                tick = self.countdown.wait_for_tick() => Wake::Tick(tick),
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(LobbyCommand::Shutdown)) => break,
                Wake::Command(Some(cmd)) => self.handle(cmd).await,
                Wake::Tick(tick) => self.on_tick(tick).await,
            }

            if self.lobby.status.is_terminal() {
                break;
            }
        }

        tracing::debug!(lobby_id = %self.lobby.id, status = %self.lobby.status, "lobby actor stopped");
    }

    async fn handle(&mut self, cmd: LobbyCommand) {
        match cmd {
            LobbyCommand::Join { wallet, reply } => {
                let result = self.handle_join(wallet).await;
                let _ = reply.send(result);
            }
            LobbyCommand::Leave { wallet, reply } => {
                let result = self.handle_leave(wallet).await;
                let _ = reply.send(result);
            }
            LobbyCommand::Tick { reply } => {
                let tick = self.countdown.step();
                if let Some(tick) = tick {
                    self.on_tick(tick).await;
                }
                let _ = reply.send(Ok(tick));
            }
            LobbyCommand::Complete { reply } => {
                let result = self.handle_complete().await;
                let _ = reply.send(result);
            }
            LobbyCommand::Cancel { reason, reply } => {
                let result = self.cancel(&reason).await.map(|()| self.summary());
                let _ = reply.send(result);
            }
            LobbyCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.summary()));
            }
            LobbyCommand::Shutdown => {}
        }
    }

    // -----------------------------------------------------------------------
    // Join / leave
    // -----------------------------------------------------------------------

    /// Seats `wallet` if every admission check passes.
    ///
    /// Checks run cheapest first: in-memory status, capacity, and
    /// duplicate before the store lookup for a same-tier commitment, and
    /// the wallet round trip last. The balance comes from the cache and
    /// may be up to one TTL stale; the settlement transfer is what finally
    /// proves the funds are there.
    async fn handle_join(&mut self, wallet: WalletAddress) -> Result<LobbySummary, LobbyError> {
        let id = self.lobby.id.clone();

        if !self.lobby.status.is_joinable() {
            return Err(LobbyError::conflict(
                &id,
                self.lobby.status,
                format!("cannot join a lobby that is {}", self.lobby.status),
            ));
        }
        if self.members.len() >= self.lobby.max_players {
            return Err(LobbyError::conflict(&id, self.lobby.status, "lobby is full"));
        }
        if self.members.iter().any(|m| m.wallet == wallet) {
            return Err(LobbyError::conflict(&id, self.lobby.status, "already a member"));
        }
        if let Some(other) = self.store.open_commitment(&wallet, self.lobby.wager).await? {
            tracing::debug!(lobby_id = %id, %wallet, other = %other, "join rejected, already committed");
            return Err(LobbyError::AlreadyCommitted {
                wallet,
                lobby_id: other,
            });
        }

        if !self.lobby.wager.is_zero() {
            let account = self.balances.custodial_account(&wallet).await?;
            let available = self.balances.balance_of(&account.address).await?;
            if available < self.lobby.wager {
                tracing::debug!(lobby_id = %id, %wallet, %available, "join rejected, insufficient balance");
                return Err(LobbyError::InsufficientBalance {
                    required: self.lobby.wager,
                    available,
                    deposit_address: account.address,
                });
            }
        }

        let membership = Membership {
            lobby_id: id.clone(),
            wallet: wallet.clone(),
            team: self.next_team(),
            joined_at: Utc::now(),
        };
        let count = self.store.insert_membership(membership.clone()).await?;
        self.members.push(membership);

        tracing::info!(lobby_id = %id, %wallet, players = count, "player joined");
        self.broadcaster.publish(LobbyEvent::PlayerJoined {
            lobby_id: id.clone(),
            wallet,
            member_count: count,
        });

        if self.lobby.status == LobbyStatus::Waiting && count >= self.config.min_players_to_start {
            self.start_countdown().await?;
        }

        Ok(self.summary())
    }

    async fn handle_leave(&mut self, wallet: WalletAddress) -> Result<LobbySummary, LobbyError> {
        let id = self.lobby.id.clone();

        if !self.lobby.status.is_joinable() {
            return Err(LobbyError::conflict(
                &id,
                self.lobby.status,
                format!("cannot leave a lobby that is {}", self.lobby.status),
            ));
        }
        if !self.members.iter().any(|m| m.wallet == wallet) {
            return Err(LobbyError::NotMember {
                lobby_id: id,
                wallet,
            });
        }

        let count = self.store.remove_membership(&id, &wallet).await?;
        self.members.retain(|m| m.wallet != wallet);

        tracing::info!(lobby_id = %id, %wallet, players = count, "player left");
        self.broadcaster.publish(LobbyEvent::PlayerLeft {
            lobby_id: id.clone(),
            wallet,
            member_count: count,
        });

        if self.lobby.status == LobbyStatus::Starting && count < self.config.min_players_to_start {
            self.countdown.disarm();
            self.lobby = self
                .store
                .transition_status(&id, &[LobbyStatus::Starting], LobbyStatus::Waiting, Utc::now())
                .await?;
            tracing::info!(lobby_id = %id, players = count, "countdown rolled back");
            self.publish_snapshot();
        }

        if count == 0 && !self.lobby.permanent && self.config.cancel_abandoned {
            self.cancel("abandoned").await?;
        }

        Ok(self.summary())
    }

    /// Team with fewer members, lowest index on ties. `None` outside team games.
    fn next_team(&self) -> Option<u8> {
        if !self.lobby.game_type.is_team_based() {
            return None;
        }
        let on_zero = self.members.iter().filter(|m| m.team == Some(0)).count();
        let on_one = self.members.iter().filter(|m| m.team == Some(1)).count();
        Some(if on_one < on_zero { 1 } else { 0 })
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    async fn start_countdown(&mut self) -> Result<(), LobbyError> {
        let id = self.lobby.id.clone();
        self.lobby = self
            .store
            .transition_status(&id, &[LobbyStatus::Waiting], LobbyStatus::Starting, Utc::now())
            .await?;
        self.countdown.arm();
        let seconds = self.countdown.seconds();
        self.store.set_countdown(&id, Some(seconds)).await?;
        self.lobby.countdown_secs = Some(seconds);

        tracing::info!(lobby_id = %id, seconds, "countdown armed");
        self.publish_snapshot();
        Ok(())
    }

    /// Applies a countdown step. A step that cannot be stored cancels the
    /// lobby, so it never stays in `starting` with no countdown running.
    async fn on_tick(&mut self, tick: CountdownTick) {
        if let Err(e) = self.apply_tick(tick).await {
            tracing::warn!(lobby_id = %self.lobby.id, error = %e, "countdown tick failed, cancelling lobby");
            if let Err(e) = self.cancel("countdown failed").await {
                tracing::warn!(lobby_id = %self.lobby.id, error = %e, "cancel after tick failure failed");
                // Stop the actor either way.
                self.lobby.status = LobbyStatus::Cancelled;
                self.broadcaster.publish(LobbyEvent::Cancelled {
                    lobby_id: self.lobby.id.clone(),
                    reason: "countdown failed".into(),
                });
            }
        }
    }

    async fn apply_tick(&mut self, tick: CountdownTick) -> Result<(), LobbyError> {
        let id = self.lobby.id.clone();
        self.broadcaster.publish(LobbyEvent::CountdownTick {
            lobby_id: id.clone(),
            remaining: tick.remaining,
        });

        if !tick.expired {
            self.store.set_countdown(&id, Some(tick.remaining)).await?;
            self.lobby.countdown_secs = Some(tick.remaining);
            return Ok(());
        }

        self.lobby = self
            .store
            .transition_status(&id, &[LobbyStatus::Starting], LobbyStatus::Active, Utc::now())
            .await?;
        tracing::info!(lobby_id = %id, players = self.members.len(), "game started");
        self.broadcaster.publish(LobbyEvent::GameStarted { lobby_id: id });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    async fn handle_complete(&mut self) -> Result<Lobby, LobbyError> {
        let id = self.lobby.id.clone();
        if self.lobby.status != LobbyStatus::Active {
            return Err(LobbyError::conflict(
                &id,
                self.lobby.status,
                format!("cannot complete a lobby that is {}", self.lobby.status),
            ));
        }
        self.lobby = self
            .store
            .transition_status(&id, &[LobbyStatus::Active], LobbyStatus::Completed, Utc::now())
            .await?;
        tracing::info!(lobby_id = %id, "lobby completed");
        self.broadcaster.publish(LobbyEvent::Completed { lobby_id: id });
        Ok(self.lobby.clone())
    }

    async fn cancel(&mut self, reason: &str) -> Result<(), LobbyError> {
        let id = self.lobby.id.clone();
        self.countdown.disarm();
        self.lobby = self
            .store
            .transition_status(&id, &LobbyStatus::OPEN, LobbyStatus::Cancelled, Utc::now())
            .await?;
        tracing::info!(lobby_id = %id, reason, "lobby cancelled");
        self.broadcaster.publish(LobbyEvent::Cancelled {
            lobby_id: id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn summary(&self) -> LobbySummary {
        self.lobby.summary(&self.members)
    }

    fn publish_snapshot(&self) {
        self.broadcaster.publish(LobbyEvent::Snapshot {
            lobby: self.summary(),
        });
    }
}

/// Spawns an actor for a stored lobby and returns its handle.
///
/// A lobby restored in `starting` resumes its countdown from the stored
/// remaining seconds.
pub(crate) fn spawn_lobby<S: SessionStore, W: WalletGateway>(
    lobby: Lobby,
    members: Vec<Membership>,
    config: Arc<LobbyConfig>,
    store: Arc<S>,
    balances: Arc<BalanceCache<W>>,
    broadcaster: Arc<dyn StateBroadcaster>,
) -> LobbyHandle {
    let (tx, rx) = mpsc::channel(config.channel_size);

    let mut countdown = Countdown::new(config.countdown());
    if lobby.status == LobbyStatus::Starting {
        countdown.arm_with(lobby.countdown_secs.unwrap_or(countdown.seconds()));
    }

    let lobby_id = lobby.id.clone();
    let actor = LobbyActor {
        lobby,
        members,
        countdown,
        config,
        store,
        balances,
        broadcaster,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    LobbyHandle {
        lobby_id,
        sender: tx,
    }
}
