//! In-process [`SessionStore`] with JSON snapshots.
//!
//! All tables sit behind one `RwLock`, so every trait method is atomic
//! with respect to every other. Snapshots serialize the whole state and
//! can be loaded back into a fresh store after a restart.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use lobbyforge_protocol::{Amount, LobbyId, LobbyStatus, TransferOutcome, WalletAddress};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Lobby, LobbyFilter, Membership, SessionStore, SettlementRecord, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    lobbies: HashMap<LobbyId, Lobby>,
    /// Per-lobby members in join order.
    memberships: HashMap<LobbyId, Vec<Membership>>,
    settlements: HashMap<LobbyId, SettlementRecord>,
}

impl Tables {
    fn member_count(&self, id: &LobbyId) -> usize {
        self.memberships.get(id).map_or(0, Vec::len)
    }

    fn open_commitment(&self, wallet: &WalletAddress, wager: Amount) -> Option<LobbyId> {
        self.memberships
            .iter()
            .filter(|(_, members)| members.iter().any(|m| &m.wallet == wallet))
            .find_map(|(id, _)| {
                self.lobbies
                    .get(id)
                    .filter(|l| l.wager == wager && l.status.is_open())
                    .map(|l| l.id.clone())
            })
    }
}

/// A [`SessionStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the full store state to `path` as JSON.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let bytes = {
            let tables = self.tables.read().await;
            serde_json::to_vec_pretty(&*tables).map_err(|e| StoreError::Snapshot(e.to_string()))?
        };
        tokio::fs::write(path.as_ref(), bytes)
            .await
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "store snapshot saved");
        Ok(())
    }

    /// Builds a store from a snapshot written by [`save_snapshot`](Self::save_snapshot).
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        let tables: Tables =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        tracing::info!(
            path = %path.as_ref().display(),
            lobbies = tables.lobbies.len(),
            settlements = tables.settlements.len(),
            "store snapshot loaded"
        );
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }
}

impl SessionStore for InMemoryStore {
    async fn insert_lobby(&self, lobby: Lobby) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.lobbies.contains_key(&lobby.id) {
            return Err(StoreError::DuplicateLobby(lobby.id));
        }
        tables.lobbies.insert(lobby.id.clone(), lobby);
        Ok(())
    }

    async fn lobby(&self, id: &LobbyId) -> Result<Option<Lobby>, StoreError> {
        Ok(self.tables.read().await.lobbies.get(id).cloned())
    }

    async fn find_lobbies(&self, filter: &LobbyFilter) -> Result<Vec<Lobby>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .lobbies
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        id: &LobbyId,
        from: &[LobbyStatus],
        to: LobbyStatus,
        at: DateTime<Utc>,
    ) -> Result<Lobby, StoreError> {
        let mut tables = self.tables.write().await;
        let lobby = tables
            .lobbies
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !from.contains(&lobby.status) {
            return Err(StoreError::StatusConflict {
                lobby_id: id.clone(),
                current: lobby.status,
            });
        }

        if lobby.status == LobbyStatus::Starting {
            lobby.countdown_secs = None;
        }
        match to {
            LobbyStatus::Active => lobby.started_at = Some(at),
            LobbyStatus::Completed | LobbyStatus::Cancelled => lobby.completed_at = Some(at),
            LobbyStatus::Waiting | LobbyStatus::Starting => {}
        }
        lobby.status = to;
        Ok(lobby.clone())
    }

    async fn set_countdown(&self, id: &LobbyId, remaining: Option<u32>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let lobby = tables
            .lobbies
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        lobby.countdown_secs = remaining;
        Ok(())
    }

    async fn insert_membership(&self, membership: Membership) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let id = membership.lobby_id.clone();
        let lobby = tables
            .lobbies
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !lobby.status.is_joinable() {
            return Err(StoreError::StatusConflict {
                lobby_id: id,
                current: lobby.status,
            });
        }
        let members = tables.memberships.get(&id);
        if members.is_some_and(|ms| ms.iter().any(|m| m.wallet == membership.wallet)) {
            return Err(StoreError::AlreadyMember {
                lobby_id: id,
                wallet: membership.wallet,
            });
        }
        if tables.member_count(&id) >= lobby.max_players {
            return Err(StoreError::LobbyFull(id));
        }
        if let Some(other) = tables.open_commitment(&membership.wallet, lobby.wager) {
            return Err(StoreError::AlreadyCommitted {
                wallet: membership.wallet,
                lobby_id: other,
            });
        }

        let members = tables.memberships.entry(id).or_default();
        members.push(membership);
        Ok(members.len())
    }

    async fn remove_membership(
        &self,
        id: &LobbyId,
        wallet: &WalletAddress,
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.lobbies.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let not_member = || StoreError::NotMember {
            lobby_id: id.clone(),
            wallet: wallet.clone(),
        };
        let members = tables.memberships.get_mut(id).ok_or_else(not_member)?;
        let idx = members
            .iter()
            .position(|m| &m.wallet == wallet)
            .ok_or_else(not_member)?;
        members.remove(idx);
        Ok(members.len())
    }

    async fn memberships(&self, id: &LobbyId) -> Result<Vec<Membership>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .memberships
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_commitment(
        &self,
        wallet: &WalletAddress,
        wager: Amount,
    ) -> Result<Option<LobbyId>, StoreError> {
        Ok(self.tables.read().await.open_commitment(wallet, wager))
    }

    async fn create_if_absent(&self, candidate: Lobby) -> Result<(Lobby, bool), StoreError> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .lobbies
            .values()
            .filter(|l| {
                l.wager == candidate.wager
                    && l.game_type == candidate.game_type
                    && l.status.is_joinable()
                    && tables.member_count(&l.id) < l.max_players
            })
            .max_by_key(|l| (l.permanent, l.created_at))
            .cloned();

        if let Some(lobby) = existing {
            return Ok((lobby, false));
        }
        if tables.lobbies.contains_key(&candidate.id) {
            return Err(StoreError::DuplicateLobby(candidate.id));
        }
        tables.lobbies.insert(candidate.id.clone(), candidate.clone());
        Ok((candidate, true))
    }

    async fn insert_settlement(&self, record: SettlementRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.settlements.contains_key(&record.lobby_id) {
            return Err(StoreError::AlreadySettled(record.lobby_id));
        }
        tables.settlements.insert(record.lobby_id.clone(), record);
        Ok(())
    }

    async fn append_transfer_outcome(
        &self,
        id: &LobbyId,
        outcome: TransferOutcome,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .settlements
            .get_mut(id)
            .ok_or_else(|| StoreError::SettlementNotFound(id.clone()))?;
        if record.is_sealed() {
            return Err(StoreError::SettlementSealed(id.clone()));
        }
        record.outcomes.push(outcome);
        Ok(())
    }

    async fn seal_settlement(
        &self,
        mut record: SettlementRecord,
        at: DateTime<Utc>,
    ) -> Result<SettlementRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(stored) = tables.settlements.get(&record.lobby_id) {
            if stored.is_sealed() {
                return Ok(stored.clone());
            }
        }
        record.sealed_at = Some(at);
        tables
            .settlements
            .insert(record.lobby_id.clone(), record.clone());
        Ok(record)
    }

    async fn settlement(&self, id: &LobbyId) -> Result<Option<SettlementRecord>, StoreError> {
        Ok(self.tables.read().await.settlements.get(id).cloned())
    }
}
