//! Core value types shared by every Lobbyforge layer.
//!
//! These are the nouns of the system: who is playing (`WalletAddress`),
//! where they play (`LobbyId`, `GameType`), what is at stake (`Amount`),
//! and how far along a lobby is (`LobbyStatus`). Every type here is
//! serializable because it either travels to clients or is persisted.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque unique identifier for a lobby.
///
/// Newtype over `String` so a lobby id can never be confused with a wallet
/// address in a function signature. Serialized as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(String);

impl LobbyId {
    /// Wraps an existing id (e.g., one read back from storage).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id (`lob_` + 64 random bits in hex).
    pub fn generate() -> Self {
        let bits: u64 = rand::rng().random();
        Self(format!("lob_{bits:016x}"))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wallet address, either a player's own wallet or a custodial one.
///
/// The core never interprets the contents; it is an opaque key handed to
/// the wallet gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Wraps an address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Wraps an address string, rejecting blank input.
    pub fn parse(address: &str) -> Result<Self, ProtocolError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "wallet address must not be empty".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A non-negative quantity of the wager currency, in integer base units.
///
/// One whole unit is `10^DECIMALS` base units. Using integers keeps the
/// settlement arithmetic exact: `3 × 0.05` is exactly `0.15`.
///
/// On the wire an `Amount` is a decimal string in whole units, e.g.
/// `"0.05"`. Negative values, signs, and more than [`Amount::DECIMALS`]
/// fractional digits are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(u64);

impl Amount {
    /// Fractional digits of one whole unit.
    pub const DECIMALS: u32 = 9;

    /// Base units in one whole unit.
    pub const SCALE: u64 = 1_000_000_000;

    /// The zero amount (free lobbies).
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw base units.
    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    /// Raw base units.
    pub const fn base_units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Multiplies by a count (e.g., number of losing players).
    pub fn checked_mul(self, count: u64) -> Option<Self> {
        self.0.checked_mul(count).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl FromStr for Amount {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| ProtocolError::InvalidAmount(format!("{s:?}: {why}"));

        let s = s.trim();
        if s.is_empty() {
            return Err(invalid("empty"));
        }
        if s.starts_with('-') {
            return Err(invalid("amount must not be negative"));
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("no digits"));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(invalid("expected a decimal number"));
        }
        if frac.len() > Self::DECIMALS as usize {
            return Err(invalid("too many fractional digits"));
        }

        let whole_units: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("out of range"))?
        };
        let frac_units: u64 = if frac.is_empty() {
            0
        } else {
            let digits: u64 = frac.parse().map_err(|_| invalid("out of range"))?;
            digits * 10u64.pow(Self::DECIMALS - frac.len() as u32)
        };

        whole_units
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Self)
            .ok_or_else(|| invalid("out of range"))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = self.0 % Self::SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:09}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// GameType
// ---------------------------------------------------------------------------

/// The kind of match a lobby hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// One against one.
    Duel,
    /// Two teams; members are balanced into team 0 and team 1 on join.
    TeamDeathmatch,
    /// Everyone for themselves.
    FreeForAll,
}

impl GameType {
    /// Every game type, in declaration order.
    pub const ALL: [GameType; 3] = [Self::Duel, Self::TeamDeathmatch, Self::FreeForAll];

    /// Capacity used when a lobby is created without an explicit size.
    pub fn default_max_players(self) -> usize {
        match self {
            Self::Duel => 2,
            Self::TeamDeathmatch => 4,
            Self::FreeForAll => 8,
        }
    }

    /// Whether joining players are assigned a team.
    pub fn is_team_based(self) -> bool {
        matches!(self, Self::TeamDeathmatch)
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duel => f.write_str("duel"),
            Self::TeamDeathmatch => f.write_str("team_deathmatch"),
            Self::FreeForAll => f.write_str("free_for_all"),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a lobby.
///
/// ```text
///            ┌──────── rollback ────────┐
///            ▼                          │
/// Waiting ──────→ Starting ──────→ Active ──────→ Completed
///    │               │               │
///    └───────────────┴───────────────┴──────────→ Cancelled
/// ```
///
/// The rollback edge is `Starting → Waiting`. `Completed` and `Cancelled`
/// are terminal. Persisted as the lowercase strings
/// `waiting|starting|active|completed|cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Waiting,
    Starting,
    Active,
    Completed,
    Cancelled,
}

impl LobbyStatus {
    /// Statuses in which a membership counts as a commitment of stake.
    pub const OPEN: [LobbyStatus; 3] = [Self::Waiting, Self::Starting, Self::Active];

    /// `true` while members may still join or leave.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting | Self::Starting)
    }

    /// `true` for every non-terminal status.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns `true` if moving to `target` follows the allowed graph.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Waiting, Self::Starting)
            | (Self::Starting, Self::Active)
            | (Self::Starting, Self::Waiting)
            | (Self::Active, Self::Completed) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// The persisted string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
