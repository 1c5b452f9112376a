//! The session store contract.

use std::future::Future;

use chrono::{DateTime, Utc};
use lobbyforge_protocol::{Amount, LobbyId, LobbyStatus, TransferOutcome, WalletAddress};

use crate::{Lobby, LobbyFilter, Membership, SettlementRecord, StoreError};

/// Durable storage for lobbies, memberships, and settlement records.
///
/// Every method that changes state is a single atomic operation against
/// the backing store. The lifecycle layer serializes mutations per lobby
/// on top of that, but the invariants below hold even without it:
///
/// - a lobby never has more memberships than `max_players`;
/// - a wallet holds at most one membership among open lobbies of the same
///   wager tier;
/// - a lobby's status only changes through [`transition_status`], which
///   succeeds only from an expected status;
/// - a lobby has at most one settlement record.
///
/// [`transition_status`]: SessionStore::transition_status
pub trait SessionStore: Send + Sync + 'static {
    /// Inserts a new lobby. Fails if the id is taken.
    fn insert_lobby(&self, lobby: Lobby) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn lobby(
        &self,
        id: &LobbyId,
    ) -> impl Future<Output = Result<Option<Lobby>, StoreError>> + Send;

    /// Lobbies matching `filter`, in no particular order.
    fn find_lobbies(
        &self,
        filter: &LobbyFilter,
    ) -> impl Future<Output = Result<Vec<Lobby>, StoreError>> + Send;

    /// Conditional status write.
    ///
    /// Moves the lobby to `to` only if its current status is one of
    /// `from`, stamping `started_at` or `completed_at` with `at` as
    /// appropriate. Leaving `starting` clears the stored countdown.
    ///
    /// # Errors
    /// [`StoreError::StatusConflict`] carrying the current status if the
    /// precondition does not hold.
    fn transition_status(
        &self,
        id: &LobbyId,
        from: &[LobbyStatus],
        to: LobbyStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Lobby, StoreError>> + Send;

    /// Records the seconds left on a lobby's countdown.
    fn set_countdown(
        &self,
        id: &LobbyId,
        remaining: Option<u32>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adds a member, checking in one step that the lobby is joinable,
    /// has a free slot, does not already hold this wallet, and that the
    /// wallet has no other open membership at the same wager.
    ///
    /// Returns the member count after the insert.
    fn insert_membership(
        &self,
        membership: Membership,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Removes a member. Returns the member count after the removal.
    fn remove_membership(
        &self,
        id: &LobbyId,
        wallet: &WalletAddress,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Members of a lobby in join order.
    fn memberships(
        &self,
        id: &LobbyId,
    ) -> impl Future<Output = Result<Vec<Membership>, StoreError>> + Send;

    /// The open lobby (if any) where `wallet` already has stake at `wager`.
    fn open_commitment(
        &self,
        wallet: &WalletAddress,
        wager: Amount,
    ) -> impl Future<Output = Result<Option<LobbyId>, StoreError>> + Send;

    /// Atomically reuses or creates a joinable lobby.
    ///
    /// If a `waiting`/`starting` lobby with the same wager and game type
    /// and a free slot exists, returns it with `false`. Otherwise inserts
    /// `candidate` and returns it with `true`. Permanent lobbies are
    /// preferred when several qualify.
    fn create_if_absent(
        &self,
        candidate: Lobby,
    ) -> impl Future<Output = Result<(Lobby, bool), StoreError>> + Send;

    /// Inserts a settlement record. Fails with
    /// [`StoreError::AlreadySettled`] if the lobby has one.
    fn insert_settlement(
        &self,
        record: SettlementRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends one transfer outcome to an unsealed record.
    fn append_transfer_outcome(
        &self,
        id: &LobbyId,
        outcome: TransferOutcome,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Writes `record` as the final audit trail and seals it at `at`.
    ///
    /// An unsealed stored record, or a missing one, is replaced by
    /// `record`, so outcomes lost to failed appends are still persisted.
    /// A record that is already sealed is returned unchanged.
    fn seal_settlement(
        &self,
        record: SettlementRecord,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<SettlementRecord, StoreError>> + Send;

    fn settlement(
        &self,
        id: &LobbyId,
    ) -> impl Future<Output = Result<Option<SettlementRecord>, StoreError>> + Send;
}
