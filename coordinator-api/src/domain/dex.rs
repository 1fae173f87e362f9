// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::{position::Position, storage::PoolMetadata};
use std::{collections::HashMap, error::Error as StdError};

/// Uniswap V3 access used for vote validation: a pool is accepted only if the factory derives
/// the very same address from the pool's own token pair and fee.
#[trait_variant::make(Send)]
pub trait DexClient
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Validate `address` against the factory; `None` means it is not a factory-deployed pool.
    async fn validated_pool(&self, address: &str) -> Result<Option<PoolMetadata>, Self::Error>;
}

/// Source of concentrated-liquidity positions for a set of owners.
#[trait_variant::make(Send)]
pub trait PositionSource
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Positions of the given owners restricted to the given pools. Activity filtering is left
    /// to the caller.
    async fn positions(
        &self,
        owners: &[String],
        pools: &[String],
    ) -> Result<Vec<Position>, Self::Error>;
}

/// Optional USD price source, used only to enrich responses.
#[trait_variant::make(Send)]
pub trait PriceOracle
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// USD price per (lowercase) token address; tokens without a quote are absent.
    async fn usd_prices(
        &self,
        token_addresses: &[String],
    ) -> Result<HashMap<String, f64>, Self::Error>;
}
