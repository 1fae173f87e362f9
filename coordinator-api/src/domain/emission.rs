// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! The emission pipeline: token-weighted voter multipliers, per-pool emission shares,
//! Gaussian position scoring, per-pool normalization and the final per-miner weight vector.
//! All functions are pure over their snapshots.

use crate::domain::{
    holders::HolderSnapshot,
    position::{MinerPositions, Position},
    storage::StoredVote,
    vote::TOTAL_WEIGHT,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Peak of the Gaussian scoring curve.
pub const GAUSSIAN_AMPLITUDE: f64 = 10.0;

/// Per-miner weights below this are zeroed before renormalization.
pub const MIN_MINER_WEIGHT: f64 = 1e-9;

const LIQUIDITY_SCALE: f64 = 1e9;

/// Standard deviation of the scoring curve per fee tier; wider tiers tolerate wider ranges.
pub fn fee_tier_sigma(fee_tier: u32) -> f64 {
    match fee_tier {
        100 => 10.0,
        500 => 50.0,
        3000 => 200.0,
        10000 => 500.0,
        _ => 200.0,
    }
}

/// Step A: alpha-weighted multiplier per voter. Voters without alpha are dropped; a single
/// surviving voter gets multiplier 1.
pub fn voter_multipliers(
    votes: &[StoredVote],
    holders: &HolderSnapshot,
) -> HashMap<String, f64> {
    let holding = votes
        .iter()
        .filter_map(|vote| {
            let alpha = holders.alpha_of(&vote.voter);
            (alpha > 0).then(|| (vote.voter.clone(), alpha as f64))
        })
        .collect::<Vec<_>>();

    if holding.len() == 1 {
        let (voter, _) = holding.into_iter().next().expect("one voter is present");
        return HashMap::from([(voter, 1.0)]);
    }

    let total = holding.iter().map(|(_, alpha)| alpha).sum::<f64>();
    if total <= 0.0 {
        return HashMap::new();
    }

    holding
        .into_iter()
        .map(|(voter, alpha)| (voter, alpha / total))
        .collect()
}

/// Step B: per-pool emission share, `E[p] = Σ w·μᵥ / 10000`.
pub fn pool_emissions(
    votes: &[StoredVote],
    multipliers: &HashMap<String, f64>,
) -> HashMap<String, f64> {
    let mut emissions = HashMap::new();

    for vote in votes {
        let Some(multiplier) = multipliers.get(&vote.voter) else {
            continue;
        };
        for pool in &vote.pools {
            *emissions.entry(pool.address.clone()).or_insert(0.0) +=
                pool.weight as f64 * multiplier / TOTAL_WEIGHT as f64;
        }
    }

    emissions
}

/// Step C: raw Gaussian score of a single position, Simpson-averaged over the range bounds
/// and midpoint. Inactive positions and non-finite inputs score zero.
pub fn position_score(position: &Position) -> f64 {
    if !position.is_active() {
        return 0.0;
    }

    let sigma = fee_tier_sigma(position.pool.fee_tier);
    let current = position.pool.current_tick as f64;
    let lower = position.tick_lower as f64;
    let upper = position.tick_upper as f64;
    let midpoint = (lower + upper) / 2.0;

    let gauss =
        |distance: f64| GAUSSIAN_AMPLITUDE * (-distance * distance / (2.0 * sigma * sigma)).exp();

    let mu = (gauss((current - lower).abs())
        + 4.0 * gauss((current - midpoint).abs())
        + gauss((current - upper).abs()))
        / 6.0;
    let score = mu * position.liquidity / LIQUIDITY_SCALE;

    if score.is_finite() { score } else { 0.0 }
}

/// A position together with its scoring breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPosition {
    #[serde(flatten)]
    pub position: Position,
    pub raw_score: f64,
    pub pool_share: f64,
    pub emission: f64,
}

/// All scored positions of one miner.
#[derive(Debug, Clone, Serialize)]
pub struct MinerScores {
    pub miner: String,
    pub positions: Vec<ScoredPosition>,
}

/// Steps C and D over the whole snapshot: raw scores plus per-pool normalized shares.
/// `emission` is the position's contribution to its miner's (pre-normalization) weight,
/// `pool_share · E[pool]`.
pub fn score_positions(
    miners: &[MinerPositions],
    emissions: &HashMap<String, f64>,
) -> Vec<MinerScores> {
    let mut pool_totals: HashMap<&str, f64> = HashMap::new();
    for miner in miners {
        for position in &miner.positions {
            *pool_totals.entry(position.pool.address.as_str()).or_insert(0.0) +=
                position_score(position);
        }
    }

    miners
        .iter()
        .map(|miner| {
            let positions = miner
                .positions
                .iter()
                .map(|position| {
                    let raw_score = position_score(position);
                    let total = pool_totals
                        .get(position.pool.address.as_str())
                        .copied()
                        .unwrap_or_default();
                    let pool_share = if total > 0.0 { raw_score / total } else { 0.0 };
                    let emission = pool_share
                        * emissions
                            .get(&position.pool.address)
                            .copied()
                            .unwrap_or_default();

                    ScoredPosition {
                        position: position.clone(),
                        raw_score,
                        pool_share,
                        emission,
                    }
                })
                .collect();

            MinerScores {
                miner: miner.miner.clone(),
                positions,
            }
        })
        .collect()
}

/// Step E: the final per-miner weight vector. Sums to exactly 1, or is all zeros when no miner
/// earns anything.
pub fn miner_weights(
    miners: &[MinerPositions],
    emissions: &HashMap<String, f64>,
) -> BTreeMap<String, f64> {
    let mut weights = score_positions(miners, emissions)
        .into_iter()
        .map(|scores| {
            let weight = scores
                .positions
                .iter()
                .map(|position| position.emission)
                .sum::<f64>();
            (scores.miner, weight)
        })
        .collect::<BTreeMap<_, _>>();

    for weight in weights.values_mut() {
        if *weight < MIN_MINER_WEIGHT {
            *weight = 0.0;
        }
    }

    let total = weights.values().sum::<f64>();
    if total > 0.0 {
        for weight in weights.values_mut() {
            *weight /= total;
        }
    }

    weights
}

/// The whole pipeline over consistent snapshots of votes, holders and positions.
pub fn compute_weights(
    votes: &[StoredVote],
    holders: &HolderSnapshot,
    miners: &[MinerPositions],
) -> BTreeMap<String, f64> {
    let multipliers = voter_multipliers(votes, holders);
    let emissions = pool_emissions(votes, &multipliers);
    miner_weights(miners, &emissions)
}
