//! Settlement for Lobbyforge.
//!
//! - [`plan_settlement`] decides the outcome and builds a [`PayoutPlan`].
//! - [`TransferExecutor`] runs the plan against a wallet gateway.
//! - [`SettlementEngine`] ties both to the lobby lifecycle so each lobby
//!   is settled exactly once.

mod config;
mod engine;
mod error;
mod executor;
mod plan;

pub use config::{SettlementConfig, TiePolicy};
pub use engine::{SettlementEngine, summarize};
pub use error::SettlementError;
pub use executor::TransferExecutor;
pub use plan::{PayoutPlan, SettlementPlan, plan_settlement, side_of};
