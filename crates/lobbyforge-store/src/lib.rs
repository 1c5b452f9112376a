//! Session storage for Lobbyforge.
//!
//! [`SessionStore`] is the authoritative record of lobbies, memberships,
//! and settlement records. Its conditional primitives
//! ([`transition_status`](SessionStore::transition_status),
//! [`insert_membership`](SessionStore::insert_membership),
//! [`create_if_absent`](SessionStore::create_if_absent),
//! [`insert_settlement`](SessionStore::insert_settlement)) are what the
//! lifecycle and settlement layers build their invariants on.
//!
//! [`InMemoryStore`] implements the contract in-process.

mod error;
mod memory;
mod models;
mod store;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use models::{
    Lobby, LobbyFilter, Membership, PlannedTransfer, RecordedResult, SettlementRecord,
};
pub use store::SessionStore;
