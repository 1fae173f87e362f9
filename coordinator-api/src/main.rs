// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use coordinator_api::{
    application,
    config::Config,
    domain::{
        PositionFetcher, RateLimiter, SharedHolders, SharedRoster, VoteService, version::Version,
    },
    infra::{
        api::{AppState, AxumApi},
        oracle::HttpPriceOracle,
        storage::SqliteStorage,
        subgraph::SubgraphClient,
        subxt_node::SubtensorClient,
        uniswap::UniswapClient,
    },
};
use coordinator_common::{config::ConfigExt, infra::pool::sqlite::SqlitePool, telemetry};
use log::{error, info, warn};
use parking_lot::RwLock;
use std::{fs, panic, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};

const VERSION_FILE: &str = "VERSION";

#[tokio::main]
async fn main() {
    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler can be registered");
    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");

    let Config {
        application_config,
        infra_config,
        telemetry_config,
    } = config;

    telemetry::init_metrics(telemetry_config.metrics_config);

    let pool = SqlitePool::new(infra_config.storage_config)
        .await
        .context("create SQLite pool")?;
    let storage = SqliteStorage::new(pool);

    let node = SubtensorClient::new(infra_config.node_config)
        .await
        .context("create subtensor client")?;
    let dex = UniswapClient::new(infra_config.dex_config).context("create Uniswap client")?;
    let subgraph =
        SubgraphClient::new(infra_config.subgraph_config).context("create subgraph client")?;
    let oracle = infra_config
        .oracle_config
        .map(HttpPriceOracle::new)
        .transpose()
        .context("create price oracle")?;

    let server_version = read_server_version();
    info!(server_version:% = server_version; "server version");

    let holders = SharedHolders::empty();
    let roster = SharedRoster::empty();
    let rate_limiter = Arc::new(RateLimiter::new());

    let service = VoteService::new(
        storage.clone(),
        node.clone(),
        dex.clone(),
        holders.clone(),
        roster.clone(),
        rate_limiter.clone(),
        server_version,
    );
    let fetcher = PositionFetcher::new(storage.clone(), subgraph, roster.clone());

    let state = AppState {
        service,
        storage: storage.clone(),
        holders: holders.clone(),
        roster: roster.clone(),
        fetcher,
        oracle,
        all_votes_cache: Arc::new(RwLock::new(None)),
    };
    let api = AxumApi::new(infra_config.api_config, state);

    application::run(
        application_config,
        api,
        storage,
        node,
        dex,
        holders,
        roster,
        rate_limiter,
        sigterm,
    )
    .await
    .context("run coordinator application")
}

/// Read the server version from the `VERSION` file; fall back to the crate version.
fn read_server_version() -> Version {
    match fs::read_to_string(VERSION_FILE) {
        Ok(content) => match content.trim().parse() {
            Ok(version) => version,
            Err(parse_error) => {
                warn!(error:? = parse_error; "malformed VERSION file, using crate version");
                crate_version()
            }
        },
        Err(read_error) => {
            warn!(error:? = read_error; "cannot read VERSION file, using crate version");
            crate_version()
        }
    }
}

fn crate_version() -> Version {
    env!("CARGO_PKG_VERSION")
        .parse()
        .expect("crate version is valid")
}
