// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::{
    dex::PositionSource,
    error::ApiError,
    position::{MinerPositions, Position},
    roster::SharedRoster,
    storage::Storage,
};
use log::debug;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

/// How long a fetched position set is served from memory.
pub const POSITION_CACHE_TTL: Duration = Duration::from_secs(60);

/// Fetches the active positions of all bound miners, grouped per miner, with a short-lived
/// cache. Inactive positions are dropped before the cache is populated, so consumers never
/// see a position whose pool trades outside its range.
#[derive(Clone)]
pub struct PositionFetcher<S, P> {
    storage: S,
    source: P,
    roster: SharedRoster,
    cache: Arc<RwLock<Option<CachedPositions>>>,
    ttl: Duration,
}

#[derive(Clone)]
struct CachedPositions {
    fetched_at: Instant,
    miners: Arc<Vec<MinerPositions>>,
}

impl<S, P> PositionFetcher<S, P>
where
    S: Storage,
    P: PositionSource,
{
    pub fn new(storage: S, source: P, roster: SharedRoster) -> Self {
        Self {
            storage,
            source,
            roster,
            cache: Arc::new(RwLock::new(None)),
            ttl: POSITION_CACHE_TTL,
        }
    }

    /// The current per-miner active positions, refreshed at most once per TTL.
    pub async fn active_positions(&self) -> Result<Arc<Vec<MinerPositions>>, ApiError> {
        if let Some(cached) = self.cache.read().clone()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(cached.miners);
        }

        let miners = Arc::new(self.fetch().await?);
        *self.cache.write() = Some(CachedPositions {
            fetched_at: Instant::now(),
            miners: miners.clone(),
        });

        Ok(miners)
    }

    async fn fetch(&self) -> Result<Vec<MinerPositions>, ApiError> {
        // Target pools: referenced by any current vote AND present in the metadata cache.
        let votes = self.storage.all_votes().await?;
        let voted = votes
            .iter()
            .flat_map(|vote| vote.pools.iter().map(|pool| pool.address.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let target_pools = self
            .storage
            .pools_by_addresses(&voted)
            .await?
            .into_iter()
            .map(|pool| pool.address)
            .collect::<Vec<_>>();

        // Owners are the EVM accounts bound to currently registered miners.
        let roster = self.roster.load();
        let owner_to_miner = self
            .storage
            .all_bindings()
            .await?
            .into_iter()
            .filter(|binding| roster.contains(&binding.voter))
            .map(|binding| (binding.evm_address.to_ascii_lowercase(), binding.voter))
            .collect::<HashMap<_, _>>();
        let owners = owner_to_miner.keys().cloned().collect::<Vec<_>>();

        let mut by_miner: BTreeMap<String, Vec<Position>> = BTreeMap::new();
        if !owners.is_empty() && !target_pools.is_empty() {
            let positions = self
                .source
                .positions(&owners, &target_pools)
                .await
                .map_err(|error| ApiError::Upstream(error.to_string()))?;

            let total = positions.len();
            let mut active = 0usize;
            for position in positions {
                if !position.is_active() {
                    continue;
                }
                let Some(miner) = owner_to_miner.get(&position.owner.to_ascii_lowercase()) else {
                    continue;
                };
                active += 1;
                by_miner.entry(miner.clone()).or_default().push(position);
            }
            debug!(total, active; "fetched positions");
        }

        Ok(by_miner
            .into_iter()
            .map(|(miner, positions)| MinerPositions { miner, positions })
            .collect())
    }
}
