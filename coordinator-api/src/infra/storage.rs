// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::{
    storage::{AddressBinding, PoolMetadata, Storage, StoredVote, VoteChange, VoteUpsert},
    vote::PoolWeight,
};
use coordinator_common::infra::pool::sqlite::SqlitePool;
use indoc::indoc;
use log::info;
use sqlx::{QueryBuilder, types::Json};

type VoteRow = (String, Json<Vec<PoolWeight>>, String, String, i64, i64, i64);
type ChangeRow = (String, Json<Vec<PoolWeight>>, Json<Vec<PoolWeight>>, i64, i64, i64);
type PoolRow = (String, String, String, i64, String, Option<String>, Option<String>);

/// Sqlite based implementation of [Storage].
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new [SqliteStorage].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, e.g. for readiness probes.
    pub fn sqlite_pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Storage for SqliteStorage {
    async fn vote(&self, voter: &str) -> Result<Option<StoredVote>, sqlx::Error> {
        let query = indoc! {"
            SELECT voter, pools, signature, message, block_number, total_weight, updated_at
            FROM votes
            WHERE voter = $1
        "};

        sqlx::query_as::<_, VoteRow>(query)
            .bind(voter)
            .fetch_optional(&*self.pool)
            .await
            .map(|row| row.map(vote_from_row))
    }

    async fn all_votes(&self) -> Result<Vec<StoredVote>, sqlx::Error> {
        let query = indoc! {"
            SELECT voter, pools, signature, message, block_number, total_weight, updated_at
            FROM votes
            ORDER BY voter
        "};

        let rows = sqlx::query_as::<_, VoteRow>(query)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(vote_from_row).collect())
    }

    async fn upsert_vote(&self, vote: &StoredVote) -> Result<VoteUpsert, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, (Json<Vec<PoolWeight>>, i64)>(
            "SELECT pools, block_number FROM votes WHERE voter = $1",
        )
        .bind(&vote.voter)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                sqlx::query(indoc! {"
                    INSERT INTO votes (
                        voter, pools, signature, message, block_number, total_weight, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                "})
                .bind(&vote.voter)
                .bind(Json(&vote.pools))
                .bind(&vote.signature)
                .bind(&vote.message)
                .bind(vote.block_number as i64)
                .bind(vote.total_weight as i64)
                .bind(vote.updated_at)
                .execute(&mut *tx)
                .await?;

                info!(
                    voter = vote.voter.as_str(),
                    pools:? = vote.pools,
                    block_number = vote.block_number;
                    "NEW-VOTE"
                );

                VoteUpsert::Inserted
            }

            Some((Json(old_pools), old_block)) => {
                if old_pools == vote.pools && old_block as u64 == vote.block_number {
                    VoteUpsert::Unchanged
                } else {
                    sqlx::query(indoc! {"
                        UPDATE votes
                        SET pools = $2,
                            signature = $3,
                            message = $4,
                            block_number = $5,
                            total_weight = $6,
                            updated_at = $7
                        WHERE voter = $1
                    "})
                    .bind(&vote.voter)
                    .bind(Json(&vote.pools))
                    .bind(&vote.signature)
                    .bind(&vote.message)
                    .bind(vote.block_number as i64)
                    .bind(vote.total_weight as i64)
                    .bind(vote.updated_at)
                    .execute(&mut *tx)
                    .await?;

                    info!(
                        voter = vote.voter.as_str(),
                        old_pools:? = old_pools,
                        new_pools:? = vote.pools,
                        block_number = vote.block_number;
                        "OVERWRITE"
                    );

                    VoteUpsert::Updated
                }
            }
        };

        tx.commit().await?;

        Ok(outcome)
    }

    async fn latest_vote_change(&self, voter: &str) -> Result<Option<VoteChange>, sqlx::Error> {
        let query = indoc! {"
            SELECT voter, old_pools, new_pools, change_timestamp, cooldown_until, change_count
            FROM vote_changes
            WHERE voter = $1
            ORDER BY change_timestamp DESC, id DESC
            LIMIT 1
        "};

        sqlx::query_as::<_, ChangeRow>(query)
            .bind(voter)
            .fetch_optional(&*self.pool)
            .await
            .map(|row| row.map(change_from_row))
    }

    async fn record_vote_change(&self, change: &VoteChange) -> Result<(), sqlx::Error> {
        sqlx::query(indoc! {"
            INSERT INTO vote_changes (
                voter, old_pools, new_pools, change_timestamp, cooldown_until, change_count
            )
            VALUES ($1, $2, $3, $4, $5, $6)
        "})
        .bind(&change.voter)
        .bind(Json(&change.old_pools))
        .bind(Json(&change.new_pools))
        .bind(change.change_timestamp)
        .bind(change.cooldown_until)
        .bind(change.change_count as i64)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn delete_expired_cooldowns(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM vote_changes WHERE cooldown_until < $1")
            .bind(now)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn vote_history(&self, voter: &str) -> Result<Vec<VoteChange>, sqlx::Error> {
        let query = indoc! {"
            SELECT voter, old_pools, new_pools, change_timestamp, cooldown_until, change_count
            FROM vote_changes
            WHERE voter = $1
            ORDER BY change_timestamp DESC, id DESC
        "};

        let rows = sqlx::query_as::<_, ChangeRow>(query)
            .bind(voter)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(change_from_row).collect())
    }

    async fn binding(&self, voter: &str) -> Result<Option<AddressBinding>, sqlx::Error> {
        sqlx::query_as::<_, (String, String, i64)>(
            "SELECT voter, evm_address, updated_at FROM address_bindings WHERE voter = $1",
        )
        .bind(voter)
        .fetch_optional(&*self.pool)
        .await
        .map(|row| row.map(binding_from_row))
    }

    async fn binding_for_address(
        &self,
        evm_address: &str,
    ) -> Result<Option<AddressBinding>, sqlx::Error> {
        sqlx::query_as::<_, (String, String, i64)>(
            "SELECT voter, evm_address, updated_at FROM address_bindings WHERE evm_address = $1",
        )
        .bind(evm_address)
        .fetch_optional(&*self.pool)
        .await
        .map(|row| row.map(binding_from_row))
    }

    async fn upsert_binding(
        &self,
        voter: &str,
        evm_address: &str,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(indoc! {"
            INSERT INTO address_bindings (voter, evm_address, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (voter) DO UPDATE SET
                evm_address = excluded.evm_address,
                updated_at = excluded.updated_at
        "})
        .bind(voter)
        .bind(evm_address)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn all_bindings(&self) -> Result<Vec<AddressBinding>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT voter, evm_address, updated_at FROM address_bindings ORDER BY voter",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(binding_from_row).collect())
    }

    async fn pool(&self, address: &str) -> Result<Option<PoolMetadata>, sqlx::Error> {
        let query = indoc! {"
            SELECT address, token0, token1, fee, liquidity, symbol0, symbol1
            FROM pools
            WHERE address = $1
        "};

        sqlx::query_as::<_, PoolRow>(query)
            .bind(address)
            .fetch_optional(&*self.pool)
            .await
            .map(|row| row.map(pool_from_row))
    }

    async fn pools_by_addresses(
        &self,
        addresses: &[String],
    ) -> Result<Vec<PoolMetadata>, sqlx::Error> {
        if addresses.is_empty() {
            return Ok(vec![]);
        }

        let mut query = QueryBuilder::new(
            "SELECT address, token0, token1, fee, liquidity, symbol0, symbol1 FROM pools WHERE address IN (",
        );
        let mut separated = query.separated(", ");
        for address in addresses {
            separated.push_bind(address);
        }
        query.push(") ORDER BY address");

        let rows = query
            .build_query_as::<PoolRow>()
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(pool_from_row).collect())
    }

    async fn all_pools(&self) -> Result<Vec<PoolMetadata>, sqlx::Error> {
        let query = indoc! {"
            SELECT address, token0, token1, fee, liquidity, symbol0, symbol1
            FROM pools
            ORDER BY address
        "};

        let rows = sqlx::query_as::<_, PoolRow>(query)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(pool_from_row).collect())
    }

    async fn upsert_pool(&self, pool: &PoolMetadata) -> Result<(), sqlx::Error> {
        sqlx::query(indoc! {"
            INSERT INTO pools (address, token0, token1, fee, liquidity, symbol0, symbol1, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, unixepoch())
            ON CONFLICT (address) DO UPDATE SET
                liquidity = excluded.liquidity,
                symbol0 = excluded.symbol0,
                symbol1 = excluded.symbol1,
                updated_at = excluded.updated_at
        "})
        .bind(&pool.address)
        .bind(&pool.token0)
        .bind(&pool.token1)
        .bind(pool.fee as i64)
        .bind(&pool.liquidity)
        .bind(&pool.symbol0)
        .bind(&pool.symbol1)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}

fn vote_from_row(row: VoteRow) -> StoredVote {
    let (voter, Json(pools), signature, message, block_number, total_weight, updated_at) = row;
    StoredVote {
        voter,
        pools,
        signature,
        message,
        block_number: block_number as u64,
        total_weight: total_weight as u64,
        updated_at,
    }
}

fn change_from_row(row: ChangeRow) -> VoteChange {
    let (voter, Json(old_pools), Json(new_pools), change_timestamp, cooldown_until, change_count) =
        row;
    VoteChange {
        voter,
        old_pools,
        new_pools,
        change_timestamp,
        cooldown_until,
        change_count: change_count as u32,
    }
}

fn binding_from_row(row: (String, String, i64)) -> AddressBinding {
    let (voter, evm_address, updated_at) = row;
    AddressBinding {
        voter,
        evm_address,
        updated_at,
    }
}

fn pool_from_row(row: PoolRow) -> PoolMetadata {
    let (address, token0, token1, fee, liquidity, symbol0, symbol1) = row;
    PoolMetadata {
        address,
        token0,
        token1,
        fee: fee as u32,
        liquidity,
        symbol0,
        symbol1,
    }
}
