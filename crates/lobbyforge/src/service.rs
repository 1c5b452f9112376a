//! `LobbyService`: the request surface over lifecycle, availability, and
//! settlement.
//!
//! This ties the layers together: wallet → store → lobby actors →
//! watchdog → settlement. Callers (an HTTP layer, a socket handler, a
//! test) talk to this one type.

use std::sync::Arc;

use lobbyforge_lobby::{EventBus, LobbyManager, MaintenanceHandle, StateBroadcaster, Watchdog};
use lobbyforge_protocol::{
    Amount, GameType, LobbyEvent, LobbyId, LobbySummary, PlayerResult, SettlementSummary,
    WalletAddress,
};
use lobbyforge_settlement::SettlementEngine;
use lobbyforge_store::SessionStore;
use lobbyforge_wallet::{BalanceCache, WalletGateway};
use tokio::sync::{Mutex, broadcast};

use crate::{LobbyforgeError, ServiceConfig};

/// Reason recorded when a creator cannot join their own new lobby.
const CREATOR_JOIN_FAILED: &str = "creator could not join";

pub struct LobbyService<S: SessionStore, W: WalletGateway> {
    manager: Arc<LobbyManager<S, W>>,
    watchdog: Arc<Watchdog<S, W>>,
    engine: SettlementEngine<S, W>,
    events: Arc<EventBus>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl<S: SessionStore, W: WalletGateway> LobbyService<S, W> {
    /// Wires a service over `store` and `wallet`.
    ///
    /// Nothing runs until [`start`](Self::start).
    pub fn new(store: Arc<S>, wallet: Arc<W>, config: ServiceConfig) -> Result<Self, LobbyforgeError> {
        let config = config.validated()?;
        let balances = Arc::new(BalanceCache::new(wallet, config.balance_cache));
        let events = Arc::new(EventBus::new(config.event_buffer));
        let broadcaster: Arc<dyn StateBroadcaster> = events.clone();
        let manager = Arc::new(LobbyManager::new(store, balances, broadcaster, config.lobby));
        let watchdog = Arc::new(Watchdog::new(Arc::clone(&manager), config.watchdog));
        let engine = SettlementEngine::new(Arc::clone(&manager), config.settlement)
            .with_watchdog(Arc::clone(&watchdog));

        Ok(Self {
            manager,
            watchdog,
            engine,
            events,
            maintenance: Mutex::new(None),
        })
    }

    /// Fills every permanent slot and starts background maintenance.
    ///
    /// Returns the number of slots that are available. Calling it again
    /// restarts maintenance.
    pub async fn start(&self) -> usize {
        let available = self.watchdog.ensure_all().await;
        let previous = self
            .maintenance
            .lock()
            .await
            .replace(self.watchdog.spawn_maintenance());
        if let Some(handle) = previous {
            handle.shutdown().await;
        }
        tracing::info!(slots = available, "lobby service started");
        available
    }

    /// Stops maintenance and every lobby actor. Stored state is kept.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.maintenance.lock().await.take() {
            handle.shutdown().await;
        }
        self.manager.shutdown().await;
        tracing::info!("lobby service stopped");
    }

    pub fn manager(&self) -> &Arc<LobbyManager<S, W>> {
        &self.manager
    }

    pub fn watchdog(&self) -> &Arc<Watchdog<S, W>> {
        &self.watchdog
    }

    pub fn engine(&self) -> &SettlementEngine<S, W> {
        &self.engine
    }

    /// Receives every lobby event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Request surface
    // -----------------------------------------------------------------------

    /// Joinable lobbies, permanent first, then newest.
    pub async fn list_lobbies(
        &self,
        wager: Option<Amount>,
        game_type: Option<GameType>,
    ) -> Result<Vec<LobbySummary>, LobbyforgeError> {
        if let Some(w) = wager {
            self.manager.config().check_tier(w)?;
        }
        Ok(self.watchdog.list_available(wager, game_type).await?)
    }

    /// Creates a lobby and joins `creator` to it.
    ///
    /// If the creator cannot join (balance, commitment, wallet outage) the
    /// new lobby is cancelled and the join error is returned.
    pub async fn create_lobby(
        &self,
        creator: WalletAddress,
        wager: Amount,
        game_type: GameType,
        max_players: Option<usize>,
    ) -> Result<LobbySummary, LobbyforgeError> {
        let created = self
            .manager
            .create_lobby(wager, game_type, max_players)
            .await?;
        let lobby_id = created.lobby_id;

        match self.manager.join_lobby(&lobby_id, creator.clone()).await {
            Ok(lobby) => Ok(lobby),
            Err(join_err) => {
                tracing::debug!(%lobby_id, wallet = %creator, error = %join_err, "creator join failed");
                if let Err(e) = self
                    .manager
                    .cancel_lobby(&lobby_id, CREATOR_JOIN_FAILED)
                    .await
                {
                    tracing::warn!(%lobby_id, error = %e, "failed to cancel unjoined lobby");
                }
                Err(join_err.into())
            }
        }
    }

    pub async fn join_lobby(
        &self,
        lobby_id: &LobbyId,
        wallet: WalletAddress,
    ) -> Result<LobbySummary, LobbyforgeError> {
        Ok(self.manager.join_lobby(lobby_id, wallet).await?)
    }

    pub async fn leave_lobby(
        &self,
        lobby_id: &LobbyId,
        wallet: WalletAddress,
    ) -> Result<LobbySummary, LobbyforgeError> {
        Ok(self.manager.leave_lobby(lobby_id, wallet).await?)
    }

    pub async fn submit_results(
        &self,
        lobby_id: &LobbyId,
        results: Vec<PlayerResult>,
    ) -> Result<SettlementSummary, LobbyforgeError> {
        Ok(self.engine.submit_results(lobby_id, results).await?)
    }

    pub async fn lobby(&self, lobby_id: &LobbyId) -> Result<LobbySummary, LobbyforgeError> {
        Ok(self.manager.lobby(lobby_id).await?)
    }

    pub async fn settlement(
        &self,
        lobby_id: &LobbyId,
    ) -> Result<Option<SettlementSummary>, LobbyforgeError> {
        Ok(self.engine.settlement(lobby_id).await?)
    }
}
