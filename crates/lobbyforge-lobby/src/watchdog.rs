//! Availability watchdog: keeps a joinable lobby alive for every
//! configured `(wager, game type)` slot.
//!
//! The watchdog remembers which lobby currently fills each slot, but the
//! pointer is only a hint. Every check re-reads the lobby from the store,
//! and a stale or missing pointer falls through to
//! [`LobbyManager::create_lobby_if_absent`], which reuses any joinable
//! lobby before creating a new one in the same atomic store step.

use std::collections::HashMap;
use std::sync::Arc;

use lobbyforge_protocol::{Amount, GameType, LobbyId, LobbySummary};
use lobbyforge_store::{Lobby, LobbyFilter, SessionStore};
use lobbyforge_wallet::WalletGateway;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::{LobbyError, LobbyManager, PermanentSlot, WatchdogConfig};

pub struct Watchdog<S: SessionStore, W: WalletGateway> {
    manager: Arc<LobbyManager<S, W>>,
    config: WatchdogConfig,
    slots: Mutex<HashMap<PermanentSlot, LobbyId>>,
}

impl<S: SessionStore, W: WalletGateway> Watchdog<S, W> {
    pub fn new(manager: Arc<LobbyManager<S, W>>, config: WatchdogConfig) -> Self {
        Self {
            manager,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Makes sure `slot` has a joinable lobby and returns its id.
    pub async fn ensure(&self, slot: PermanentSlot) -> Result<LobbyId, LobbyError> {
        let mut slots = self.slots.lock().await;

        if let Some(id) = slots.get(&slot) {
            if let Some(lobby) = self.manager.store().lobby(id).await? {
                if self.still_serves(&lobby).await? {
                    return Ok(lobby.id);
                }
            }
        }

        let (lobby, created) = self
            .manager
            .create_lobby_if_absent(slot.wager, slot.game_type, true)
            .await?;
        if created {
            tracing::info!(
                lobby_id = %lobby.lobby_id,
                wager = %slot.wager,
                game_type = %slot.game_type,
                "permanent lobby created"
            );
        } else {
            tracing::debug!(lobby_id = %lobby.lobby_id, wager = %slot.wager, "reusing open lobby for slot");
        }
        slots.insert(slot, lobby.lobby_id.clone());
        Ok(lobby.lobby_id)
    }

    async fn still_serves(&self, lobby: &Lobby) -> Result<bool, LobbyError> {
        if !lobby.status.is_joinable() {
            return Ok(false);
        }
        let members = self.manager.store().memberships(&lobby.id).await?;
        Ok(members.len() < lobby.max_players)
    }

    /// Runs [`ensure`](Self::ensure) for every configured slot.
    ///
    /// Failures are logged and do not stop the pass. Returns how many
    /// slots ended up with a lobby.
    pub async fn ensure_all(&self) -> usize {
        let mut ok = 0;
        for slot in &self.config.slots {
            match self.ensure(*slot).await {
                Ok(_) => ok += 1,
                Err(e) => {
                    tracing::warn!(wager = %slot.wager, game_type = %slot.game_type, error = %e, "slot repair failed");
                }
            }
        }
        ok
    }

    /// Joinable lobbies, permanent first, then newest first.
    ///
    /// Configured slots matching the filter are repaired before the read.
    pub async fn list_available(
        &self,
        wager: Option<Amount>,
        game_type: Option<GameType>,
    ) -> Result<Vec<LobbySummary>, LobbyError> {
        for slot in &self.config.slots {
            let wanted = wager.is_none_or(|w| w == slot.wager)
                && game_type.is_none_or(|g| g == slot.game_type);
            if wanted {
                if let Err(e) = self.ensure(*slot).await {
                    tracing::warn!(wager = %slot.wager, error = %e, "slot repair failed during listing");
                }
            }
        }

        let filter = LobbyFilter {
            wager,
            game_type,
            ..LobbyFilter::joinable()
        };
        let mut lobbies = self.manager.find(&filter).await?;
        lobbies.sort_by(|a, b| {
            b.permanent
                .cmp(&a.permanent)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(lobbies)
    }

    /// Refills the slot of a permanent lobby that just completed.
    pub async fn on_lobby_completed(&self, lobby: &Lobby) -> Result<(), LobbyError> {
        if !lobby.permanent {
            return Ok(());
        }
        let slot = PermanentSlot {
            wager: lobby.wager,
            game_type: lobby.game_type,
        };
        {
            let mut slots = self.slots.lock().await;
            if slots.get(&slot) == Some(&lobby.id) {
                slots.remove(&slot);
            }
        }
        let replacement = self.ensure(slot).await?;
        tracing::info!(completed = %lobby.id, replacement = %replacement, "permanent slot refilled");
        Ok(())
    }

    /// Starts a background task that runs [`ensure_all`](Self::ensure_all)
    /// on the configured interval until shut down.
    pub fn spawn_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let watchdog = Arc::clone(self);
        let period = self.config.maintenance_interval();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let ok = watchdog.ensure_all().await;
                        tracing::debug!(slots = ok, "watchdog maintenance pass");
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            tracing::info!("watchdog maintenance stopped");
        });

        MaintenanceHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Controls a running maintenance task.
pub struct MaintenanceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stops the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}
