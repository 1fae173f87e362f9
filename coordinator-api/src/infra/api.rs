// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

mod handlers;

use crate::{
    domain::{Api, PositionFetcher, SharedHolders, SharedRoster, VoteService},
    infra::{
        oracle::HttpPriceOracle, storage::SqliteStorage, subgraph::SubgraphClient,
        subxt_node::SubtensorClient, uniswap::UniswapClient,
    },
};
use axum::{
    Router,
    routing::{get, post},
};
use log::info;
use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

/// The fully wired orchestrator used by the HTTP surface.
pub type CoordinatorService = VoteService<SqliteStorage, SubtensorClient, UniswapClient>;

/// Config for the API server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,
    pub request_body_limit: usize,
}

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: CoordinatorService,
    pub storage: SqliteStorage,
    pub holders: SharedHolders,
    pub roster: SharedRoster,
    pub fetcher: PositionFetcher<SqliteStorage, SubgraphClient>,
    pub oracle: Option<HttpPriceOracle>,
    pub all_votes_cache: Arc<RwLock<Option<(Instant, serde_json::Value)>>>,
}

/// An [Api] implementation based on axum.
pub struct AxumApi {
    config: Config,
    state: AppState,
}

impl AxumApi {
    pub fn new(config: Config, state: AppState) -> Self {
        Self { config, state }
    }
}

impl Api for AxumApi {
    type Error = AxumApiError;

    async fn serve(self) -> Result<(), Self::Error> {
        let Config {
            address,
            port,
            request_body_limit,
        } = self.config;

        let app = make_app(self.state, request_body_limit);

        let listener = TcpListener::bind((address, port))
            .await
            .map_err(AxumApiError::Bind)?;
        info!(address:?, port; "listening to TCP connections");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AxumApiError::Serve)
    }
}

/// Error possibly returned by [AxumApi::serve].
#[derive(Debug, Error)]
pub enum AxumApiError {
    #[error("cannot bind tcp listener")]
    Bind(#[source] io::Error),

    #[error("cannot serve API")]
    Serve(#[source] io::Error),
}

fn make_app(state: AppState, request_body_limit: usize) -> Router {
    Router::new()
        .route("/ready", get(handlers::ready))
        .route("/updateVotes", post(handlers::update_votes))
        .route("/claimAddress", post(handlers::claim_address))
        .route("/ping", post(handlers::ping))
        .route("/userVotes/{voter}", get(handlers::user_votes))
        .route("/allVotes", get(handlers::all_votes))
        .route("/allHolders", get(handlers::all_holders))
        .route("/allAddresses", get(handlers::all_addresses))
        .route("/allMiners", get(handlers::all_miners))
        .route("/pools", get(handlers::pools))
        .route("/positions", get(handlers::positions))
        .route("/positions/{miner}", get(handlers::miner_positions))
        .route("/weights", get(handlers::weights))
        .route("/voteCooldown/{voter}", get(handlers::vote_cooldown))
        .route("/voteHistory/{voter}", get(handlers::vote_history))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(request_body_limit))
                .layer(CorsLayer::permissive()),
        )
}

async fn shutdown_signal() {
    signal(SignalKind::terminate())
        .expect("install SIGTERM handler")
        .recv()
        .await;
}
