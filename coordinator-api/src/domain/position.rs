// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

/// A concentrated-liquidity position as reported by the subgraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: String,
    pub owner: String,
    pub liquidity: f64,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub pool: PositionPool,
    pub token0: PositionToken,
    pub token1: PositionToken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPool {
    pub address: String,
    pub fee_tier: u32,
    pub current_tick: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionToken {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
}

/// All active positions of one miner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinerPositions {
    pub miner: String,
    pub positions: Vec<Position>,
}

impl Position {
    /// A position earns only while the pool trades strictly inside its range.
    pub fn is_active(&self) -> bool {
        self.liquidity > 0.0
            && self.tick_lower < self.pool.current_tick
            && self.pool.current_tick < self.tick_upper
    }

    /// Current token amounts held by the position, scaled by the token decimals. Derived from
    /// the liquidity and the sqrt-prices of the range bounds and the current tick.
    pub fn token_amounts(&self) -> (f64, f64) {
        let sqrt_price = |tick: i32| 1.0001_f64.powf(tick as f64 / 2.0);

        let lower = sqrt_price(self.tick_lower);
        let upper = sqrt_price(self.tick_upper);
        let current = sqrt_price(self.pool.current_tick);
        let liquidity = self.liquidity;

        let (amount0, amount1) = if self.pool.current_tick < self.tick_lower {
            (liquidity * (upper - lower) / (upper * lower), 0.0)
        } else if self.pool.current_tick >= self.tick_upper {
            (0.0, liquidity * (upper - lower))
        } else {
            (
                liquidity * (upper - current) / (upper * current),
                liquidity * (current - lower),
            )
        };

        (
            amount0 / 10_f64.powi(self.token0.decimals as i32),
            amount1 / 10_f64.powi(self.token1.decimals as i32),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(tick_lower: i32, tick_upper: i32, current_tick: i32, liquidity: f64) -> Position {
        Position {
            id: "1".to_owned(),
            owner: "0xowner".to_owned(),
            liquidity,
            tick_lower,
            tick_upper,
            pool: PositionPool {
                address: "0xpool".to_owned(),
                fee_tier: 3000,
                current_tick,
            },
            token0: PositionToken {
                address: "0xtoken0".to_owned(),
                symbol: "T0".to_owned(),
                decimals: 0,
            },
            token1: PositionToken {
                address: "0xtoken1".to_owned(),
                symbol: "T1".to_owned(),
                decimals: 0,
            },
        }
    }

    #[test]
    fn test_is_active() {
        assert!(position(10, 20, 15, 1.0).is_active());
        assert!(!position(10, 20, 25, 1.0).is_active());
        assert!(!position(10, 20, 10, 1.0).is_active());
        assert!(!position(10, 20, 20, 1.0).is_active());
        assert!(!position(10, 20, 15, 0.0).is_active());
    }

    #[test]
    fn test_token_amounts_below_range() {
        let (amount0, amount1) = position(100, 200, 50, 1_000.0).token_amounts();
        assert!(amount0 > 0.0);
        assert_eq!(amount1, 0.0);
    }

    #[test]
    fn test_token_amounts_above_range() {
        let (amount0, amount1) = position(100, 200, 300, 1_000.0).token_amounts();
        assert_eq!(amount0, 0.0);
        assert!(amount1 > 0.0);
    }

    #[test]
    fn test_token_amounts_in_range() {
        let (amount0, amount1) = position(-100, 100, 0, 1_000.0).token_amounts();
        assert!(amount0 > 0.0);
        assert!(amount1 > 0.0);
        // A symmetric range around the current tick splits the value roughly evenly.
        assert!((amount0 - amount1).abs() / amount0 < 0.02);
    }

    #[test]
    fn test_token_amounts_scaled_by_decimals() {
        let mut scaled = position(-100, 100, 0, 1_000.0);
        scaled.token0.decimals = 3;
        let (amount0, _) = scaled.token_amounts();
        let (raw0, _) = position(-100, 100, 0, 1_000.0).token_amounts();
        assert!((raw0 / amount0 - 1_000.0).abs() < 1e-9);
    }
}
