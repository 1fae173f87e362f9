// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batched position reads from the Uniswap V3 subgraph. Owners are queried in batches of 100
//! per request with a page cap of 1000 positions; dust positions are filtered server-side.

use crate::domain::{
    dex::PositionSource,
    position::{Position, PositionPool, PositionToken},
};
use indoc::indoc;
use itertools::Itertools;
use log::warn;
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const OWNER_BATCH_SIZE: usize = 100;
const PAGE_SIZE: usize = 1000;

const POSITIONS_QUERY: &str = indoc! {r#"
    query ($owners: [String!], $pools: [String!]) {
      positions(first: 1000, where: { owner_in: $owners, pool_in: $pools, liquidity_gt: 1 }) {
        id
        owner
        liquidity
        tickLower { tickIdx }
        tickUpper { tickIdx }
        pool { id feeTier tick }
        token0 { id symbol decimals }
        token1 { id symbol decimals }
      }
    }
"#};

/// Config for the subgraph connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// A [PositionSource] implementation backed by the subgraph's GraphQL endpoint.
#[derive(Clone)]
pub struct SubgraphClient {
    http: HttpClient,
    url: String,
    api_key: Option<SecretString>,
}

impl SubgraphClient {
    /// Create a new [SubgraphClient] with the given [Config].
    pub fn new(config: Config) -> Result<Self, SubgraphClientError> {
        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(SubgraphClientError::CreateClient)?;

        Ok(Self {
            http,
            url: config.url,
            api_key: config.api_key,
        })
    }
}

impl PositionSource for SubgraphClient {
    type Error = SubgraphClientError;

    async fn positions(
        &self,
        owners: &[String],
        pools: &[String],
    ) -> Result<Vec<Position>, Self::Error> {
        let mut all = Vec::new();

        for chunk in owners.chunks(OWNER_BATCH_SIZE) {
            let body = serde_json::json!({
                "query": POSITIONS_QUERY,
                "variables": { "owners": chunk, "pools": pools },
            });

            let mut request = self.http.post(&self.url).json(&body);
            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key.expose_secret());
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SubgraphClientError::Status(status.as_u16()));
            }

            let response = response.json::<GraphQlResponse>().await?;
            if let Some(errors) = response.errors
                && !errors.is_empty()
            {
                return Err(SubgraphClientError::GraphQl(
                    errors.into_iter().map(|error| error.message).join("; "),
                ));
            }

            let positions = response
                .data
                .map(|data| data.positions)
                .unwrap_or_default();
            if positions.len() >= PAGE_SIZE {
                warn!(owners = chunk.len(); "position page limit reached, results may be truncated");
            }

            for raw in positions {
                match raw.into_position() {
                    Some(position) => all.push(position),
                    None => warn!("skipping malformed subgraph position"),
                }
            }
        }

        Ok(all)
    }
}

/// Error possibly returned by [SubgraphClient] operations.
#[derive(Debug, Error)]
pub enum SubgraphClientError {
    #[error("cannot create HTTP client")]
    CreateClient(#[source] reqwest::Error),

    #[error("subgraph request failed")]
    Request(#[from] reqwest::Error),

    #[error("subgraph responded with status {0}")]
    Status(u16),

    #[error("subgraph returned errors: {0}")]
    GraphQl(String),
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PositionsData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    id: String,
    owner: String,
    liquidity: String,
    tick_lower: RawTick,
    tick_upper: RawTick,
    pool: RawPool,
    token0: RawToken,
    token1: RawToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTick {
    tick_idx: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPool {
    id: String,
    fee_tier: String,
    /// Absent for pools that have never traded.
    tick: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    id: String,
    symbol: String,
    decimals: String,
}

impl RawPosition {
    fn into_position(self) -> Option<Position> {
        let current_tick = self.pool.tick?.parse().ok()?;

        Some(Position {
            id: self.id,
            owner: self.owner.to_ascii_lowercase(),
            liquidity: self.liquidity.parse().ok()?,
            tick_lower: self.tick_lower.tick_idx.parse().ok()?,
            tick_upper: self.tick_upper.tick_idx.parse().ok()?,
            pool: PositionPool {
                address: self.pool.id.to_ascii_lowercase(),
                fee_tier: self.pool.fee_tier.parse().ok()?,
                current_tick,
            },
            token0: self.token0.into_token()?,
            token1: self.token1.into_token()?,
        })
    }
}

impl RawToken {
    fn into_token(self) -> Option<PositionToken> {
        Some(PositionToken {
            address: self.id.to_ascii_lowercase(),
            symbol: self.symbol,
            decimals: self.decimals.parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_position_deserialization() {
        let raw = serde_json::json!({
            "id": "123",
            "owner": "0xABCDEF",
            "liquidity": "123456789",
            "tickLower": { "tickIdx": "-100" },
            "tickUpper": { "tickIdx": "200" },
            "pool": { "id": "0xPOOL", "feeTier": "3000", "tick": "42" },
            "token0": { "id": "0xT0", "symbol": "WETH", "decimals": "18" },
            "token1": { "id": "0xT1", "symbol": "USDC", "decimals": "6" },
        });

        let raw = serde_json::from_value::<RawPosition>(raw).expect("position can be deserialized");
        let position = raw.into_position().expect("position can be converted");

        assert_eq!(position.id, "123");
        assert_eq!(position.owner, "0xabcdef");
        assert_eq!(position.tick_lower, -100);
        assert_eq!(position.tick_upper, 200);
        assert_eq!(position.pool.current_tick, 42);
        assert_eq!(position.pool.fee_tier, 3000);
        assert_eq!(position.token1.decimals, 6);
    }

    #[test]
    fn test_untraded_pool_is_dropped() {
        let raw = serde_json::json!({
            "id": "123",
            "owner": "0xabc",
            "liquidity": "1",
            "tickLower": { "tickIdx": "-100" },
            "tickUpper": { "tickIdx": "200" },
            "pool": { "id": "0xpool", "feeTier": "3000", "tick": null },
            "token0": { "id": "0xt0", "symbol": "A", "decimals": "18" },
            "token1": { "id": "0xt1", "symbol": "B", "decimals": "18" },
        });

        let raw = serde_json::from_value::<RawPosition>(raw).expect("position can be deserialized");
        assert!(raw.into_position().is_none());
    }
}
