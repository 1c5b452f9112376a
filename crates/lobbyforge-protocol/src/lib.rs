//! Wire-level vocabulary for Lobbyforge.
//!
//! - **Types** ([`LobbyId`], [`WalletAddress`], [`Amount`], [`GameType`],
//!   [`LobbyStatus`]): the values every other layer passes around.
//! - **Messages** ([`ClientRequest`], [`ServerResponse`], [`LobbyEvent`],
//!   [`Envelope`]): the request surface and the event stream.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, frames out.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about storage, wallets, or timers.

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientRequest, Envelope, ErrorDetail, LobbyEvent, LobbySummary, MatchOutcome,
    MemberSummary, Payload, PlayerPayout, PlayerResult, ServerResponse, SettlementSummary,
    Side, TransferOutcome, TransferResult,
};
pub use types::{Amount, GameType, LobbyId, LobbyStatus, WalletAddress};
