// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::LazyLock};
use thiserror::Error;

/// Maximum number of pool entries in a single vote.
pub const MAX_POOLS_PER_VOTE: usize = 10;

/// Normalized weights always sum to exactly this value.
pub const TOTAL_WEIGHT: u64 = 10_000;

static EVM_ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[0-9a-fA-F]{40}$").expect("EVM address regex is valid"));

/// One pool entry of a vote; addresses are lowercase 0x-prefixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolWeight {
    pub address: String,
    pub weight: u64,
}

/// Parsed vote message of the form `addr1,w1;addr2,w2|block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteMessage {
    pub pools: Vec<PoolWeight>,
    pub block_number: u64,
}

/// Error possibly returned by [VoteMessage::parse] and [normalize_weights].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseVoteError {
    #[error("vote message must have the form <pools>|<block>")]
    MissingBlockSeparator,

    #[error("invalid block number")]
    InvalidBlockNumber,

    #[error("vote must contain between 1 and {MAX_POOLS_PER_VOTE} pools")]
    InvalidPoolCount,

    #[error("pool entry must have the form <address>,<weight>")]
    MalformedPoolEntry,

    #[error("malformed pool address")]
    MalformedPoolAddress,

    #[error("pool weight must be a positive integer")]
    InvalidWeight,

    #[error("duplicate pool address")]
    DuplicatePoolAddress,

    #[error("weights cannot be normalized")]
    DegenerateWeights,
}

impl VoteMessage {
    /// Parse and structurally validate a vote message. Pool addresses are lowercased; weights
    /// are not yet normalized.
    pub fn parse(message: &str) -> Result<Self, ParseVoteError> {
        let (pools_part, block_part) = message
            .rsplit_once('|')
            .ok_or(ParseVoteError::MissingBlockSeparator)?;
        let block_number = block_part
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseVoteError::InvalidBlockNumber)?;

        let entries = pools_part
            .split(';')
            .filter(|entry| !entry.trim().is_empty())
            .collect::<Vec<_>>();
        if entries.is_empty() || entries.len() > MAX_POOLS_PER_VOTE {
            return Err(ParseVoteError::InvalidPoolCount);
        }

        let mut seen = HashSet::new();
        let mut pools = Vec::with_capacity(entries.len());
        for entry in entries {
            let (address, weight) = entry
                .trim()
                .split_once(',')
                .ok_or(ParseVoteError::MalformedPoolEntry)?;

            let address = address.trim();
            if !is_evm_address(address) {
                return Err(ParseVoteError::MalformedPoolAddress);
            }
            let address = address.to_ascii_lowercase();
            if !seen.insert(address.clone()) {
                return Err(ParseVoteError::DuplicatePoolAddress);
            }

            let weight = weight
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseVoteError::InvalidWeight)?;
            if weight == 0 {
                return Err(ParseVoteError::InvalidWeight);
            }

            pools.push(PoolWeight { address, weight });
        }

        Ok(Self {
            pools,
            block_number,
        })
    }
}

/// Whether `s` is a well-formed 0x-prefixed 20-byte hex address.
pub fn is_evm_address(s: &str) -> bool {
    EVM_ADDRESS_RE.is_match(s)
}

/// Scale the weights so they sum to exactly [TOTAL_WEIGHT]; any rounding difference is applied
/// to the last entry.
pub fn normalize_weights(pools: &mut [PoolWeight]) -> Result<(), ParseVoteError> {
    let sum = pools.iter().map(|pool| pool.weight as u128).sum::<u128>();
    if sum == 0 {
        return Err(ParseVoteError::DegenerateWeights);
    }

    for pool in pools.iter_mut() {
        let scaled = pool.weight as f64 * TOTAL_WEIGHT as f64 / sum as f64;
        pool.weight = scaled.round() as u64;
    }

    let normalized_sum = pools.iter().map(|pool| pool.weight as i64).sum::<i64>();
    let diff = TOTAL_WEIGHT as i64 - normalized_sum;
    if diff != 0 {
        let last = pools.last_mut().expect("pools are not empty");
        let adjusted = last.weight as i64 + diff;
        if adjusted < 0 {
            return Err(ParseVoteError::DegenerateWeights);
        }
        last.weight = adjusted as u64;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const POOL_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const POOL_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const POOL_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    #[test]
    fn test_parse() {
        let message = format!("{POOL_A},1;{POOL_B},3|12345");
        let vote = VoteMessage::parse(&message).expect("message can be parsed");

        assert_eq!(vote.block_number, 12345);
        assert_eq!(vote.pools.len(), 2);
        assert_eq!(vote.pools[0].address, POOL_A);
        assert_eq!(vote.pools[0].weight, 1);
        assert_eq!(vote.pools[1].weight, 3);
    }

    #[test]
    fn test_parse_lowercases_addresses() {
        let upper = POOL_A.to_uppercase().replace("0X", "0x");
        let message = format!("{upper},1|1");
        let vote = VoteMessage::parse(&message).expect("message can be parsed");
        assert_eq!(vote.pools[0].address, POOL_A);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_matches!(
            VoteMessage::parse("no-separator"),
            Err(ParseVoteError::MissingBlockSeparator)
        );
        assert_matches!(
            VoteMessage::parse(&format!("{POOL_A},1|notanumber")),
            Err(ParseVoteError::InvalidBlockNumber)
        );
        assert_matches!(
            VoteMessage::parse("0x1234,1|1"),
            Err(ParseVoteError::MalformedPoolAddress)
        );
        assert_matches!(
            VoteMessage::parse(&format!("{POOL_A},0|1")),
            Err(ParseVoteError::InvalidWeight)
        );
        assert_matches!(
            VoteMessage::parse(&format!("{POOL_A},1;{POOL_A},2|1")),
            Err(ParseVoteError::DuplicatePoolAddress)
        );
        assert_matches!(VoteMessage::parse("|1"), Err(ParseVoteError::InvalidPoolCount));
    }

    #[test]
    fn test_parse_rejects_too_many_pools() {
        let entries = (0..11)
            .map(|n| format!("0x{n:040x},1"))
            .collect::<Vec<_>>()
            .join(";");
        assert_matches!(
            VoteMessage::parse(&format!("{entries}|1")),
            Err(ParseVoteError::InvalidPoolCount)
        );
    }

    #[test]
    fn test_normalize_even_split() {
        let mut pools = vec![
            PoolWeight {
                address: POOL_A.to_owned(),
                weight: 1,
            },
            PoolWeight {
                address: POOL_B.to_owned(),
                weight: 1,
            },
        ];
        normalize_weights(&mut pools).expect("weights can be normalized");
        assert_eq!(pools[0].weight, 5000);
        assert_eq!(pools[1].weight, 5000);
    }

    #[test]
    fn test_normalize_rounding_goes_to_last_entry() {
        let mut pools = [POOL_A, POOL_B, POOL_C]
            .iter()
            .map(|address| PoolWeight {
                address: (*address).to_owned(),
                weight: 1,
            })
            .collect::<Vec<_>>();
        normalize_weights(&mut pools).expect("weights can be normalized");

        assert_eq!(pools[0].weight, 3333);
        assert_eq!(pools[1].weight, 3333);
        assert_eq!(pools[2].weight, 3334);
    }

    #[test]
    fn test_normalize_sum_is_exact() {
        let mut pools = vec![
            PoolWeight {
                address: POOL_A.to_owned(),
                weight: 7,
            },
            PoolWeight {
                address: POOL_B.to_owned(),
                weight: 13,
            },
            PoolWeight {
                address: POOL_C.to_owned(),
                weight: 29,
            },
        ];
        normalize_weights(&mut pools).expect("weights can be normalized");
        assert_eq!(pools.iter().map(|p| p.weight).sum::<u64>(), TOTAL_WEIGHT);
    }
}
