// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Startup sequence and background timers: the holder snapshot must be built before the API is
//! served (fatal on failure), the roster and the pool-metadata backfill are best-effort, and
//! three periodic jobs keep snapshots fresh and prune expired state.

use crate::domain::{
    Api, DexClient, HolderSnapshot, MinerRoster, RateLimiter, SharedHolders, SharedRoster,
    SubnetNode, storage::Storage,
};
use crate::infra::csv_log;
use anyhow::Context;
use chrono::Utc;
use log::{error, info, warn};
use metrics::counter;
use serde::Deserialize;
use std::{collections::BTreeSet, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    select,
    signal::unix::Signal,
    task,
    time::{interval, sleep},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub holders_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub roster_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub snapshot_check_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub cooldown_cleanup_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub rate_limit_prune_interval: Duration,

    pub pool_backfill_batch_size: usize,

    #[serde(with = "humantime_serde")]
    pub pool_backfill_delay: Duration,

    #[serde(default)]
    pub log_csv: bool,

    #[serde(default = "csv_dir_default")]
    pub csv_dir: PathBuf,
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: Config,
    api: impl Api,
    storage: impl Storage,
    node: impl SubnetNode,
    dex: impl DexClient,
    holders: SharedHolders,
    roster: SharedRoster,
    rate_limiter: Arc<RateLimiter>,
    mut sigterm: Signal,
) -> anyhow::Result<()> {
    // The holder snapshot gates every vote; without it the service must not come up.
    let balances = node
        .holder_balances()
        .await
        .context("build initial holder snapshot")?;
    info!(holder_count = balances.len(); "holder snapshot built");
    let snapshot = HolderSnapshot::new(balances);
    if config.log_csv {
        log_csv_snapshot(&config.csv_dir, &snapshot);
    }
    holders.replace(snapshot);

    match node.registered_miners().await {
        Ok(miners) => {
            info!(miner_count = miners.len(); "miner roster built");
            roster.replace(MinerRoster::new(miners));
        }
        Err(roster_error) => warn!(error:? = roster_error; "cannot build initial miner roster"),
    }

    backfill_pool_metadata(
        &storage,
        &dex,
        config.pool_backfill_batch_size,
        config.pool_backfill_delay,
    )
    .await;

    let refresh_task = task::spawn(refresh_snapshots(
        config.clone(),
        node.clone(),
        holders.clone(),
        roster.clone(),
    ));

    let cleanup_task = task::spawn({
        let storage = storage.clone();
        let cleanup_interval = config.cooldown_cleanup_interval;
        async move {
            let mut ticker = interval(cleanup_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match storage.delete_expired_cooldowns(Utc::now().timestamp()).await {
                    Ok(deleted) if deleted > 0 => info!(deleted; "expired cooldowns deleted"),
                    Ok(_) => {}
                    Err(cleanup_error) => {
                        error!(error:? = cleanup_error; "cannot delete expired cooldowns")
                    }
                }
            }
        }
    });

    let prune_task = task::spawn({
        let rate_limiter = rate_limiter.clone();
        let prune_interval = config.rate_limit_prune_interval;
        async move {
            let mut ticker = interval(prune_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                rate_limiter.prune();
            }
        }
    });

    let serve_api_task = task::spawn(async move {
        api.serve().await.context("serving coordinator API")
    });

    let result = select! {
        result = serve_api_task => result
            .context("serve_api_task panicked")
            .and_then(|result| result.context("serve_api_task failed")),

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            Ok(())
        }
    };

    // Stop the timers; the chain connection closes when the node client is dropped.
    refresh_task.abort();
    cleanup_task.abort();
    prune_task.abort();

    result
}

/// Periodically rebuild the holder snapshot and the miner roster once their TTLs expire.
async fn refresh_snapshots(
    config: Config,
    node: impl SubnetNode,
    holders: SharedHolders,
    roster: SharedRoster,
) {
    let mut ticker = interval(config.snapshot_check_interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if holders.is_stale(config.holders_ttl) {
            match node.holder_balances().await {
                Ok(balances) => {
                    let snapshot = HolderSnapshot::new(balances);
                    if config.log_csv {
                        log_csv_snapshot(&config.csv_dir, &snapshot);
                    }
                    holders.replace(snapshot);
                    counter!("coordinator_holder_refreshes_total").increment(1);
                }
                Err(refresh_error) => {
                    error!(error:? = refresh_error; "cannot refresh holder snapshot")
                }
            }
        }

        if roster.is_stale(config.roster_ttl) {
            match node.registered_miners().await {
                Ok(miners) => {
                    roster.replace(MinerRoster::new(miners));
                    counter!("coordinator_roster_refreshes_total").increment(1);
                }
                Err(refresh_error) => {
                    error!(error:? = refresh_error; "cannot refresh miner roster")
                }
            }
        }
    }
}

/// Fetch metadata for voted pools that are missing from the cache, in small batches with a
/// pause in between to go easy on the RPC endpoint.
async fn backfill_pool_metadata(
    storage: &impl Storage,
    dex: &impl DexClient,
    batch_size: usize,
    delay: Duration,
) {
    let referenced = match storage.all_votes().await {
        Ok(votes) => votes
            .iter()
            .flat_map(|vote| vote.pools.iter().map(|pool| pool.address.clone()))
            .collect::<BTreeSet<_>>(),
        Err(votes_error) => {
            error!(error:? = votes_error; "cannot read votes for pool backfill");
            return;
        }
    };

    let mut missing = Vec::new();
    for address in referenced {
        match storage.pool(&address).await {
            Ok(None) => missing.push(address),
            Ok(Some(_)) => {}
            Err(pool_error) => error!(error:? = pool_error; "cannot read cached pool"),
        }
    }

    if missing.is_empty() {
        return;
    }
    info!(missing = missing.len(); "backfilling pool metadata");

    for (index, batch) in missing.chunks(batch_size.max(1)).enumerate() {
        if index > 0 {
            sleep(delay).await;
        }
        for address in batch {
            match dex.validated_pool(address).await {
                Ok(Some(metadata)) => {
                    if let Err(upsert_error) = storage.upsert_pool(&metadata).await {
                        error!(error:? = upsert_error; "cannot cache pool metadata");
                    }
                }
                Ok(None) => warn!(address = address.as_str(); "voted pool no longer validates"),
                Err(dex_error) => {
                    error!(error:? = dex_error, address = address.as_str(); "cannot fetch pool metadata")
                }
            }
        }
    }
}

fn log_csv_snapshot(dir: &PathBuf, snapshot: &HolderSnapshot) {
    match csv_log::write_holders_csv(dir, snapshot) {
        Ok(path) => info!(path:? = path; "holder snapshot CSV written"),
        Err(csv_error) => warn!(error:? = csv_error; "cannot write holder snapshot CSV"),
    }
}

fn csv_dir_default() -> PathBuf {
    PathBuf::from("logs")
}
