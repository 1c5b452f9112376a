//! # Lobbyforge
//!
//! Wagered lobby matchmaking for multiplayer games.
//!
//! Players browse and join lobbies at fixed wager tiers; a lobby counts
//! down once enough players are seated, the game runs elsewhere, and the
//! submitted results are settled exactly once by moving stakes between
//! custodial wallets. Permanent lobbies keep every configured tier
//! available.
//!
//! [`LobbyService`] is the entry point. Bring your own
//! [`SessionStore`](lobbyforge_store::SessionStore) and
//! [`WalletGateway`](lobbyforge_wallet::WalletGateway), or use the
//! in-memory ones.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lobbyforge::prelude::*;
//!
//! # async fn run() -> Result<(), LobbyforgeError> {
//! lobbyforge::init_tracing();
//!
//! let service = LobbyService::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryWallet::new()),
//!     ServiceConfig::default(),
//! )?;
//! service.start().await;
//!
//! let lobbies = service.list_lobbies(None, Some(GameType::Duel)).await?;
//! # let _ = lobbies;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod service;

pub use config::ServiceConfig;
pub use error::LobbyforgeError;
pub use handler::encode_event;
pub use service::LobbyService;

/// Installs a `tracing` subscriber that logs to stderr.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Does nothing if
/// a subscriber is already installed. Libraries never call this; binaries
/// and tests do.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything a service host usually needs.
pub mod prelude {
    pub use crate::{LobbyService, LobbyforgeError, ServiceConfig, encode_event};
    pub use lobbyforge_lobby::{LobbyConfig, PermanentSlot, WatchdogConfig};
    pub use lobbyforge_protocol::{
        Amount, ClientRequest, Codec, Envelope, ErrorDetail, GameType, JsonCodec, LobbyEvent,
        LobbyId, LobbyStatus, LobbySummary, MatchOutcome, Payload, PlayerResult,
        ServerResponse, SettlementSummary, Side, TransferResult, WalletAddress,
    };
    pub use lobbyforge_settlement::{SettlementConfig, TiePolicy};
    pub use lobbyforge_store::{InMemoryStore, SessionStore};
    pub use lobbyforge_wallet::{BalanceCacheConfig, InMemoryWallet, WalletGateway};
}
