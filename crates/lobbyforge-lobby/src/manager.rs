//! Lobby manager: creates lobbies and routes operations to their actors.

use std::collections::HashMap;
use std::sync::Arc;

use lobbyforge_protocol::{Amount, GameType, LobbyId, LobbySummary, WalletAddress};
use lobbyforge_store::{Lobby, LobbyFilter, Membership, SessionStore};
use lobbyforge_tick::CountdownTick;
use lobbyforge_wallet::{BalanceCache, WalletGateway};
use tokio::sync::Mutex;

use crate::lobby::spawn_lobby;
use crate::{LobbyConfig, LobbyError, LobbyHandle, StateBroadcaster};

/// Owns the lobby state machines.
///
/// Each open lobby is driven by its own actor task; the manager only keeps
/// handles. A lobby that is open in the store but has no running actor
/// (for example after a restart) gets one spawned on first use. Actors
/// stop once their lobby reaches a terminal status, and the stale handle
/// is dropped on the next lookup.
pub struct LobbyManager<S: SessionStore, W: WalletGateway> {
    store: Arc<S>,
    balances: Arc<BalanceCache<W>>,
    broadcaster: Arc<dyn StateBroadcaster>,
    config: Arc<LobbyConfig>,
    handles: Mutex<HashMap<LobbyId, LobbyHandle>>,
}

impl<S: SessionStore, W: WalletGateway> LobbyManager<S, W> {
    pub fn new(
        store: Arc<S>,
        balances: Arc<BalanceCache<W>>,
        broadcaster: Arc<dyn StateBroadcaster>,
        config: LobbyConfig,
    ) -> Self {
        Self {
            store,
            balances,
            broadcaster,
            config: Arc::new(config),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn balances(&self) -> &Arc<BalanceCache<W>> {
        &self.balances
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Creates a `waiting` lobby with no members.
    ///
    /// No balance check happens here; stake is checked when players join.
    pub async fn create_lobby(
        &self,
        wager: Amount,
        game_type: GameType,
        max_players: Option<usize>,
    ) -> Result<LobbySummary, LobbyError> {
        self.config.check_tier(wager)?;
        let max_players = self.config.max_players(game_type, max_players)?;

        let lobby = Lobby::new(wager, game_type, max_players, false);
        // Held across insert and spawn so a concurrent lookup cannot
        // rehydrate a second actor for the same lobby.
        let mut handles = self.handles.lock().await;
        self.store.insert_lobby(lobby.clone()).await?;
        tracing::info!(lobby_id = %lobby.id, %wager, %game_type, max_players, "lobby created");

        let summary = lobby.summary(&[]);
        let id = lobby.id.clone();
        handles.insert(id, self.spawn_handle(lobby, Vec::new()));
        Ok(summary)
    }

    /// Returns a joinable lobby for `(wager, game_type)`, creating one only
    /// if the store has none.
    ///
    /// The reuse-or-insert is a single store operation, so concurrent
    /// callers never create two lobbies. The flag is `true` if this call
    /// created the lobby.
    pub async fn create_lobby_if_absent(
        &self,
        wager: Amount,
        game_type: GameType,
        permanent: bool,
    ) -> Result<(LobbySummary, bool), LobbyError> {
        self.config.check_tier(wager)?;
        let max_players = self.config.max_players(game_type, None)?;

        let candidate = Lobby::new(wager, game_type, max_players, permanent);
        let existing = {
            let mut handles = self.handles.lock().await;
            let (lobby, created) = self.store.create_if_absent(candidate).await?;
            if created {
                tracing::info!(lobby_id = %lobby.id, %wager, %game_type, permanent, "lobby created");
                let summary = lobby.summary(&[]);
                let id = lobby.id.clone();
                handles.insert(id, self.spawn_handle(lobby, Vec::new()));
                return Ok((summary, true));
            }
            lobby.id
        };
        Ok((self.lobby(&existing).await?, false))
    }

    fn spawn_handle(
        &self,
        lobby: Lobby,
        members: Vec<Membership>,
    ) -> LobbyHandle {
        spawn_lobby(
            lobby,
            members,
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&self.balances),
            Arc::clone(&self.broadcaster),
        )
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Returns a live handle, rehydrating the actor from the store if needed.
    async fn handle_for(&self, id: &LobbyId) -> Result<LobbyHandle, LobbyError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(id) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
            handles.remove(id);
        }

        let lobby = self
            .store
            .lobby(id)
            .await?
            .ok_or_else(|| LobbyError::NotFound(id.clone()))?;
        if lobby.status.is_terminal() {
            return Err(LobbyError::conflict(
                id,
                lobby.status,
                format!("lobby is {}", lobby.status),
            ));
        }

        let members = self.store.memberships(id).await?;
        tracing::info!(lobby_id = %id, status = %lobby.status, "rehydrating lobby actor");
        let handle = self.spawn_handle(lobby, members);
        handles.insert(id.clone(), handle.clone());
        Ok(handle)
    }

    /// Explains an actor that went away mid-request.
    async fn closed(&self, id: &LobbyId, err: LobbyError) -> LobbyError {
        if !matches!(err, LobbyError::Unavailable(_)) {
            return err;
        }
        match self.store.lobby(id).await {
            Ok(Some(lobby)) if lobby.status.is_terminal() => LobbyError::conflict(
                id,
                lobby.status,
                format!("lobby is {}", lobby.status),
            ),
            Ok(None) => LobbyError::NotFound(id.clone()),
            _ => err,
        }
    }

    pub async fn join_lobby(
        &self,
        id: &LobbyId,
        wallet: WalletAddress,
    ) -> Result<LobbySummary, LobbyError> {
        let handle = self.handle_for(id).await?;
        match handle.join(wallet).await {
            Err(e) => Err(self.closed(id, e).await),
            ok => ok,
        }
    }

    pub async fn leave_lobby(
        &self,
        id: &LobbyId,
        wallet: WalletAddress,
    ) -> Result<LobbySummary, LobbyError> {
        let handle = self.handle_for(id).await?;
        match handle.leave(wallet).await {
            Err(e) => Err(self.closed(id, e).await),
            ok => ok,
        }
    }

    /// Advances a lobby's countdown by one step without waiting for the
    /// timer. Returns `None` if no countdown is running.
    pub async fn tick(&self, id: &LobbyId) -> Result<Option<CountdownTick>, LobbyError> {
        let handle = self.handle_for(id).await?;
        match handle.tick().await {
            Err(e) => Err(self.closed(id, e).await),
            ok => ok,
        }
    }

    /// The guarded `active → completed` transition.
    ///
    /// Exactly one caller wins for a given lobby; every other caller gets
    /// [`LobbyError::StateConflict`].
    pub async fn complete(&self, id: &LobbyId) -> Result<Lobby, LobbyError> {
        let handle = self.handle_for(id).await?;
        match handle.complete().await {
            Err(e) => Err(self.closed(id, e).await),
            ok => ok,
        }
    }

    /// Cancels any non-terminal lobby.
    pub async fn cancel_lobby(
        &self,
        id: &LobbyId,
        reason: impl Into<String>,
    ) -> Result<LobbySummary, LobbyError> {
        let handle = self.handle_for(id).await?;
        match handle.cancel(reason.into()).await {
            Err(e) => Err(self.closed(id, e).await),
            ok => ok,
        }
    }

    /// Current view of a lobby, open or not.
    pub async fn lobby(&self, id: &LobbyId) -> Result<LobbySummary, LobbyError> {
        let lobby = self
            .store
            .lobby(id)
            .await?
            .ok_or_else(|| LobbyError::NotFound(id.clone()))?;
        if lobby.status.is_terminal() {
            let members = self.store.memberships(id).await?;
            return Ok(lobby.summary(&members));
        }
        let handle = self.handle_for(id).await?;
        match handle.snapshot().await {
            Err(e) => Err(self.closed(id, e).await),
            ok => ok,
        }
    }

    /// Lobbies matching `filter`, read straight from the store.
    pub async fn find(&self, filter: &LobbyFilter) -> Result<Vec<LobbySummary>, LobbyError> {
        let lobbies = self.store.find_lobbies(filter).await?;
        let mut out = Vec::with_capacity(lobbies.len());
        for lobby in lobbies {
            let members = self.store.memberships(&lobby.id).await?;
            out.push(lobby.summary(&members));
        }
        Ok(out)
    }

    /// Number of running lobby actors.
    pub async fn active_actors(&self) -> usize {
        self.handles
            .lock()
            .await
            .values()
            .filter(|h| !h.is_closed())
            .count()
    }

    /// Stops every actor. Stored lobby state is left as is.
    pub async fn shutdown(&self) {
        let handles: Vec<LobbyHandle> = self.handles.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
        tracing::info!("lobby actors stopped");
    }
}
