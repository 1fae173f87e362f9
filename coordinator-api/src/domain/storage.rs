// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::vote::PoolWeight;
use serde::Serialize;

/// The current vote of a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredVote {
    pub voter: String,
    pub pools: Vec<PoolWeight>,
    pub signature: String,
    pub message: String,
    pub block_number: u64,
    pub total_weight: u64,
    pub updated_at: i64,
}

/// One row of the append-only vote-change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteChange {
    pub voter: String,
    pub old_pools: Vec<PoolWeight>,
    pub new_pools: Vec<PoolWeight>,
    pub change_timestamp: i64,
    pub cooldown_until: i64,
    pub change_count: u32,
}

/// A voter's claimed EVM account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBinding {
    pub voter: String,
    pub evm_address: String,
    pub updated_at: i64,
}

/// Cached Uniswap V3 pool metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolMetadata {
    pub address: String,
    pub token0: String,
    pub token1: String,
    pub fee: u32,
    pub liquidity: String,
    pub symbol0: Option<String>,
    pub symbol1: Option<String>,
}

/// What a vote upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteUpsert {
    Inserted,
    Updated,
    /// Identical pools and block number; nothing was written (idempotent client retry).
    Unchanged,
}

/// Storage abstraction over the four relations.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    async fn vote(&self, voter: &str) -> Result<Option<StoredVote>, sqlx::Error>;

    async fn all_votes(&self) -> Result<Vec<StoredVote>, sqlx::Error>;

    /// Insert or update the voter's row; callers guard block staleness. Logs a NEW-VOTE line on
    /// insert and an OVERWRITE line on update.
    async fn upsert_vote(&self, vote: &StoredVote) -> Result<VoteUpsert, sqlx::Error>;

    async fn latest_vote_change(&self, voter: &str) -> Result<Option<VoteChange>, sqlx::Error>;

    async fn record_vote_change(&self, change: &VoteChange) -> Result<(), sqlx::Error>;

    /// Delete history rows whose cooldown has expired; returns the number of deleted rows.
    async fn delete_expired_cooldowns(&self, now: i64) -> Result<u64, sqlx::Error>;

    /// All history rows of a voter, latest first.
    async fn vote_history(&self, voter: &str) -> Result<Vec<VoteChange>, sqlx::Error>;

    async fn binding(&self, voter: &str) -> Result<Option<AddressBinding>, sqlx::Error>;

    async fn binding_for_address(
        &self,
        evm_address: &str,
    ) -> Result<Option<AddressBinding>, sqlx::Error>;

    async fn upsert_binding(
        &self,
        voter: &str,
        evm_address: &str,
        now: i64,
    ) -> Result<(), sqlx::Error>;

    async fn all_bindings(&self) -> Result<Vec<AddressBinding>, sqlx::Error>;

    async fn pool(&self, address: &str) -> Result<Option<PoolMetadata>, sqlx::Error>;

    async fn pools_by_addresses(
        &self,
        addresses: &[String],
    ) -> Result<Vec<PoolMetadata>, sqlx::Error>;

    async fn all_pools(&self) -> Result<Vec<PoolMetadata>, sqlx::Error>;

    async fn upsert_pool(&self, pool: &PoolMetadata) -> Result<(), sqlx::Error>;
}
