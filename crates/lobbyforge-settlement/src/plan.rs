//! Payout planning.
//!
//! Turns submitted results into an explicit plan before any money moves.
//! Planning is pure: it reads results and memberships and returns data,
//! so every rule here is testable without a wallet or a store.
//!
//! Stakes move pairwise. Each loser sends the wager to each winner, so a
//! decided match with `L` losers and `W` winners plans `L × W` transfers
//! and moves `L × W × wager` in total.

use std::collections::{BTreeMap, HashMap, HashSet};

use lobbyforge_protocol::{Amount, MatchOutcome, PlayerResult, Side, WalletAddress};
use lobbyforge_store::{Membership, PlannedTransfer, RecordedResult};

use crate::{SettlementError, TiePolicy};

/// What the executor has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutPlan {
    /// Free lobby; nothing to move.
    NoStake,
    /// Tied match under [`TiePolicy::NoPayout`]; everyone keeps their stake.
    Tie,
    /// One transfer per `(loser, winner)` pair.
    SinglePot(Vec<PlannedTransfer>),
}

impl PayoutPlan {
    pub fn transfers(&self) -> &[PlannedTransfer] {
        match self {
            Self::SinglePot(transfers) => transfers,
            Self::NoStake | Self::Tie => &[],
        }
    }
}

/// Outcome and payouts for one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub outcome: MatchOutcome,
    /// Total score per side.
    pub side_scores: BTreeMap<Side, u64>,
    pub results: Vec<RecordedResult>,
    pub payout: PayoutPlan,
}

impl SettlementPlan {
    pub fn winners(&self) -> impl Iterator<Item = &WalletAddress> {
        self.results.iter().filter(|r| r.won).map(|r| &r.wallet)
    }

    /// Players on a losing side. Empty for a tie.
    pub fn losers(&self) -> impl Iterator<Item = &WalletAddress> {
        let decided = matches!(self.outcome, MatchOutcome::Decided { .. });
        self.results
            .iter()
            .filter(move |r| decided && !r.won)
            .map(|r| &r.wallet)
    }
}

/// The side a player's score counts for.
///
/// Membership teams win over whatever the client reported; players
/// without a team are their own side.
pub fn side_of(wallet: &WalletAddress, team: Option<u8>) -> Side {
    match team {
        Some(t) => Side::Team(t),
        None => Side::Player(wallet.clone()),
    }
}

/// Checks results against the lobby's members and builds the plan.
///
/// Every member must report exactly once, and nobody else may.
pub fn plan_settlement(
    wager: Amount,
    members: &[Membership],
    results: &[PlayerResult],
    tie_policy: TiePolicy,
) -> Result<SettlementPlan, SettlementError> {
    if results.is_empty() {
        return Err(SettlementError::Validation("no results submitted".into()));
    }

    let teams: HashMap<&WalletAddress, Option<u8>> =
        members.iter().map(|m| (&m.wallet, m.team)).collect();
    let mut seen = HashSet::new();
    for r in results {
        if !teams.contains_key(&r.wallet) {
            return Err(SettlementError::Validation(format!(
                "{} is not a member of this lobby",
                r.wallet
            )));
        }
        if !seen.insert(&r.wallet) {
            return Err(SettlementError::Validation(format!(
                "duplicate result for {}",
                r.wallet
            )));
        }
    }
    if let Some(missing) = members.iter().find(|m| !seen.contains(&m.wallet)) {
        return Err(SettlementError::Validation(format!(
            "missing result for {}",
            missing.wallet
        )));
    }

    let sides: Vec<(Side, &PlayerResult)> = results
        .iter()
        .map(|r| {
            let team = teams.get(&r.wallet).copied().flatten().or(r.team);
            (side_of(&r.wallet, team), r)
        })
        .collect();

    let mut side_scores: BTreeMap<Side, u64> = BTreeMap::new();
    for (side, r) in &sides {
        let total = side_scores.entry(side.clone()).or_default();
        *total = total.saturating_add(r.score);
    }

    let outcome = decide(&side_scores, tie_policy);
    let winner = match &outcome {
        MatchOutcome::Decided { winner } => Some(winner),
        MatchOutcome::Tie => None,
    };

    let won: Vec<bool> = sides.iter().map(|(side, _)| Some(side) == winner).collect();
    let winner_count = won.iter().filter(|w| **w).count() as u64;
    let loser_count = if winner.is_some() {
        sides.len() as u64 - winner_count
    } else {
        0
    };

    let per_winner = wager
        .checked_mul(loser_count)
        .ok_or_else(|| SettlementError::Validation("payout overflows".into()))?;

    let results: Vec<RecordedResult> = sides
        .iter()
        .zip(&won)
        .map(|((side, r), won)| RecordedResult {
            wallet: r.wallet.clone(),
            team: match side {
                Side::Team(t) => Some(*t),
                Side::Player(_) => None,
            },
            score: r.score,
            won: *won,
            intended_payout: if *won { per_winner } else { Amount::ZERO },
        })
        .collect();

    let payout = if wager.is_zero() {
        PayoutPlan::NoStake
    } else if winner.is_none() {
        PayoutPlan::Tie
    } else {
        let winners: Vec<&RecordedResult> = results.iter().filter(|r| r.won).collect();
        let transfers = results
            .iter()
            .filter(|r| !r.won)
            .flat_map(|loser| {
                winners.iter().map(move |w| PlannedTransfer {
                    from: loser.wallet.clone(),
                    to: w.wallet.clone(),
                    amount: wager,
                })
            })
            .collect();
        PayoutPlan::SinglePot(transfers)
    };

    Ok(SettlementPlan {
        outcome,
        side_scores,
        results,
        payout,
    })
}

fn decide(side_scores: &BTreeMap<Side, u64>, tie_policy: TiePolicy) -> MatchOutcome {
    let Some(top) = side_scores.values().max().copied() else {
        return MatchOutcome::Tie;
    };
    let mut leaders = side_scores
        .iter()
        .filter(|(_, score)| **score == top)
        .map(|(side, _)| side);

    // BTreeMap iteration is ordered, so the first leader is the lowest side.
    let Some(first) = leaders.next() else {
        return MatchOutcome::Tie;
    };
    let tied = leaders.next().is_some();
    match (tied, tie_policy) {
        (false, _) | (true, TiePolicy::FirstSideWins) => MatchOutcome::Decided {
            winner: first.clone(),
        },
        (true, TiePolicy::NoPayout) => MatchOutcome::Tie,
    }
}
