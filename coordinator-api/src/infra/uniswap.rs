// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Uniswap V3 pool validation against the factory: a submitted pool address is accepted only
//! if `factory.getPool(token0, token1, fee)` resolves back to the very same address.

use crate::domain::{dex::DexClient, storage::PoolMetadata};
use alloy::{
    primitives::Address,
    providers::RootProvider,
    sol,
};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

sol! {
    #[sol(rpc)]
    interface IUniswapV3Pool {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function fee() external view returns (uint24);
        function liquidity() external view returns (uint128);
    }

    #[sol(rpc)]
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address);
    }

    #[sol(rpc)]
    interface IErc20Metadata {
        function symbol() external view returns (string);
    }
}

/// Config for the EVM connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    pub factory_address: String,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// A [DexClient] implementation based on alloy.
#[derive(Clone)]
pub struct UniswapClient {
    provider: RootProvider,
    factory: Address,
    request_timeout: Duration,
}

impl UniswapClient {
    /// Create a new [UniswapClient] with the given [Config].
    pub fn new(config: Config) -> Result<Self, UniswapClientError> {
        let url = config
            .url
            .parse()
            .map_err(|_| UniswapClientError::InvalidUrl(config.url.clone()))?;
        let factory = config
            .factory_address
            .parse()
            .map_err(|_| UniswapClientError::InvalidFactory(config.factory_address.clone()))?;

        Ok(Self {
            provider: RootProvider::new_http(url),
            factory,
            request_timeout: config.request_timeout,
        })
    }

    async fn fetch_validated(
        &self,
        pool_address: Address,
    ) -> Result<Option<PoolMetadata>, UniswapClientError> {
        let pool = IUniswapV3Pool::new(pool_address, self.provider.clone());

        let token0 = pool.token0().call().await?;
        let token1 = pool.token1().call().await?;
        let fee = pool.fee().call().await?;

        let factory = IUniswapV3Factory::new(self.factory, self.provider.clone());
        let canonical = factory.getPool(token0, token1, fee).call().await?;
        if canonical != pool_address {
            return Ok(None);
        }

        let liquidity = pool.liquidity().call().await?;
        // Non-standard tokens may not expose a readable symbol.
        let symbol0 = IErc20Metadata::new(token0, self.provider.clone())
            .symbol()
            .call()
            .await
            .ok();
        let symbol1 = IErc20Metadata::new(token1, self.provider.clone())
            .symbol()
            .call()
            .await
            .ok();

        Ok(Some(PoolMetadata {
            address: lowercase_address(pool_address),
            token0: lowercase_address(token0),
            token1: lowercase_address(token1),
            fee: fee.to::<u32>(),
            liquidity: liquidity.to_string(),
            symbol0,
            symbol1,
        }))
    }
}

impl DexClient for UniswapClient {
    type Error = UniswapClientError;

    async fn validated_pool(&self, address: &str) -> Result<Option<PoolMetadata>, Self::Error> {
        let Ok(pool_address) = address.parse::<Address>() else {
            return Ok(None);
        };

        tokio::time::timeout(self.request_timeout, self.fetch_validated(pool_address))
            .await
            .map_err(|_| UniswapClientError::Timeout)?
    }
}

/// Error possibly returned by [UniswapClient] operations.
#[derive(Debug, Error)]
pub enum UniswapClientError {
    #[error("invalid EVM RPC URL {0}")]
    InvalidUrl(String),

    #[error("invalid factory address {0}")]
    InvalidFactory(String),

    #[error("contract call failed")]
    Contract(#[from] alloy::contract::Error),

    #[error("EVM RPC request timed out")]
    Timeout,
}

fn lowercase_address(address: Address) -> String {
    address.to_string().to_ascii_lowercase()
}
