// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progressive cooldown on vote changes. The duration doubles with every change inside the
//! reset window, starting once the frequent-change threshold is reached, and is clamped to
//! `[BASE_COOLDOWN, MAX_COOLDOWN]`.

use crate::domain::storage::VoteChange;
use serde::Serialize;
use std::time::Duration;

pub const BASE_COOLDOWN: Duration = Duration::from_secs(72 * 60);
pub const COOLDOWN_MULTIPLIER: u64 = 2;
pub const MAX_COOLDOWN: Duration = Duration::from_secs(8 * 60 * 60);
pub const RESET_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
pub const FREQUENT_CHANGE_THRESHOLD: u32 = 2;

/// Outcome of the admission check for an intended vote change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The change is admitted; `next_count` is the change count the new history row gets and
    /// `duration` the cooldown it carries.
    Admit { next_count: u32, duration: Duration },

    /// A cooldown is still active.
    Reject { remaining: Duration },
}

/// Cooldown state reported to voters.
#[derive(Debug, Clone, Serialize)]
pub struct CooldownStatus {
    pub active: bool,
    pub remaining_seconds: u64,
    pub change_count: u32,
    pub next_cooldown_seconds: u64,
}

/// The cooldown incurred by the change that brings a voter's in-window change count to
/// `change_count`.
pub fn duration_for_count(change_count: u32) -> Duration {
    let exponent = (change_count + 1).saturating_sub(FREQUENT_CHANGE_THRESHOLD);
    let secs = BASE_COOLDOWN
        .as_secs()
        .saturating_mul(COOLDOWN_MULTIPLIER.saturating_pow(exponent));

    Duration::from_secs(secs.clamp(BASE_COOLDOWN.as_secs(), MAX_COOLDOWN.as_secs()))
}

/// The change count carried over from the latest history row; zero once the row is older than
/// the reset window.
pub fn effective_count(latest: Option<&VoteChange>, now: i64) -> u32 {
    match latest {
        Some(change) if now - change.change_timestamp <= RESET_WINDOW.as_secs() as i64 => {
            change.change_count
        }
        _ => 0,
    }
}

/// Decide whether a vote change is admitted right now and which cooldown it would incur.
pub fn evaluate(latest: Option<&VoteChange>, now: i64) -> Decision {
    if let Some(change) = latest
        && change.cooldown_until > now
    {
        return Decision::Reject {
            remaining: Duration::from_secs((change.cooldown_until - now) as u64),
        };
    }

    let next_count = effective_count(latest, now) + 1;

    Decision::Admit {
        next_count,
        duration: duration_for_count(next_count),
    }
}

/// Current cooldown state plus the duration the next change would incur.
pub fn status(latest: Option<&VoteChange>, now: i64) -> CooldownStatus {
    let remaining = latest
        .map(|change| (change.cooldown_until - now).max(0) as u64)
        .unwrap_or_default();
    let count = effective_count(latest, now);

    CooldownStatus {
        active: remaining > 0,
        remaining_seconds: remaining,
        change_count: count,
        next_cooldown_seconds: duration_for_count(count + 1).as_secs(),
    }
}

/// Whole minutes left, floored, but at least one for display purposes.
pub fn remaining_minutes(remaining: Duration) -> u64 {
    (remaining.as_secs() / 60).max(1)
}
