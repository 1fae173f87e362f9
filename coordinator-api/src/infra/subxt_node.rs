// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subtensor access over a reconnecting subxt RPC client. The holder snapshot and the miner
//! roster are built from raw storage scans: keys are enumerated page-wise under the hashed
//! pallet/entry prefix and values are SCALE-decoded manually.

use crate::domain::{holders::HolderBalances, node::SubnetNode, signature::SS58_PREFIX};
use coordinator_common::error::BoxError;
use log::warn;
use parity_scale_codec::{Decode, Encode};
use serde::Deserialize;
use sp_core::{
    crypto::{AccountId32, Ss58AddressFormat, Ss58Codec},
    hashing::{blake2_128, twox_128},
};
use std::{collections::HashMap, fmt::Display, future::Future, time::Duration};
use subxt::{
    PolkadotConfig,
    backend::{
        legacy::LegacyRpcMethods,
        rpc::reconnecting_rpc_client::{ExponentialBackoff, RpcClient},
    },
};
use thiserror::Error;

const PALLET: &str = "SubtensorModule";
const ALPHA_ENTRY: &str = "TotalHotkeyAlpha";
const STAKE_ENTRY: &str = "TotalHotkeyStake";
const KEYS_ENTRY: &str = "Keys";

const KEY_PAGE_SIZE: u32 = 1000;
const VALUE_BATCH_SIZE: usize = 500;

/// Config for the subtensor node connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    pub netuid: u16,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub reconnect_max_delay: Duration,

    pub reconnect_max_attempts: usize,
}

/// A [SubnetNode] implementation based on subxt.
#[derive(Clone)]
pub struct SubtensorClient {
    rpc_client: RpcClient,
    netuid: u16,
    request_timeout: Duration,
}

impl SubtensorClient {
    /// Create a new [SubtensorClient] with the given [Config].
    pub async fn new(config: Config) -> Result<Self, SubtensorClientError> {
        let retry_policy = ExponentialBackoff::from_millis(10)
            .max_delay(config.reconnect_max_delay)
            .take(config.reconnect_max_attempts);
        let rpc_client = RpcClient::builder()
            .retry_policy(retry_policy)
            .build(&config.url)
            .await
            .map_err(|error| SubtensorClientError::RpcClient(error.into()))?;

        Ok(Self {
            rpc_client,
            netuid: config.netuid,
            request_timeout: config.request_timeout,
        })
    }

    fn legacy(&self) -> LegacyRpcMethods<PolkadotConfig> {
        LegacyRpcMethods::new(self.rpc_client.clone().into())
    }

    async fn with_timeout<T, E, F>(&self, call: &'static str, fut: F) -> Result<T, SubtensorClientError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| SubtensorClientError::Timeout(call))?
            .map_err(|error| SubtensorClientError::RpcCall(call, error.to_string()))
    }

    /// All storage keys under `prefix`, paged.
    async fn paged_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, SubtensorClientError> {
        let legacy = self.legacy();
        let mut keys = Vec::new();
        let mut start_key: Option<Vec<u8>> = None;

        loop {
            let page = self
                .with_timeout(
                    "state_getKeysPaged",
                    legacy.state_get_keys_paged(prefix, KEY_PAGE_SIZE, start_key.as_deref(), None),
                )
                .await?;
            let page_len = page.len();
            keys.extend(page.into_iter().map(|key| key.0));

            if page_len < KEY_PAGE_SIZE as usize {
                break;
            }
            start_key = keys.last().cloned();
        }

        Ok(keys)
    }

    /// Storage values for the given keys, batched; missing values are skipped.
    async fn values_at(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<HashMap<Vec<u8>, Vec<u8>>, SubtensorClientError> {
        let legacy = self.legacy();
        let mut values = HashMap::new();

        for chunk in keys.chunks(VALUE_BATCH_SIZE) {
            let change_sets = self
                .with_timeout(
                    "state_queryStorageAt",
                    legacy.state_query_storage_at(chunk.iter().map(|key| key.as_slice()), None),
                )
                .await?;

            for change_set in change_sets {
                for (key, value) in change_set.changes {
                    if let Some(value) = value {
                        values.insert(key.0, value.0);
                    }
                }
            }
        }

        Ok(values)
    }
}

impl SubnetNode for SubtensorClient {
    type Error = SubtensorClientError;

    async fn block_number(&self) -> Result<u64, Self::Error> {
        let legacy = self.legacy();
        let header = self
            .with_timeout("chain_getHeader", legacy.chain_get_header(None))
            .await?
            .ok_or(SubtensorClientError::MissingHeader)?;

        Ok(header.number as u64)
    }

    async fn holder_balances(&self) -> Result<HashMap<String, HolderBalances>, Self::Error> {
        // Alpha is keyed by (hotkey, netuid); scan the whole map and keep our subnet.
        let alpha_prefix = storage_prefix(PALLET, ALPHA_ENTRY);
        let alpha_keys = self.paged_keys(&alpha_prefix).await?;

        let mut holders_by_key: HashMap<Vec<u8>, AccountId32> = HashMap::new();
        for key in alpha_keys {
            let Some((account, netuid)) = decode_account_netuid_key(&key, alpha_prefix.len())
            else {
                warn!(key_len = key.len(); "skipping undecodable alpha storage key");
                continue;
            };
            if netuid == self.netuid {
                holders_by_key.insert(key, account);
            }
        }

        let keys = holders_by_key.keys().cloned().collect::<Vec<_>>();
        let alpha_values = self.values_at(&keys).await?;

        let mut balances = HashMap::new();
        let stake_prefix = storage_prefix(PALLET, STAKE_ENTRY);
        let mut stake_keys = Vec::with_capacity(holders_by_key.len());
        let mut stake_key_to_address = HashMap::new();

        for (key, account) in &holders_by_key {
            let Some(value) = alpha_values.get(key) else {
                continue;
            };
            let Ok(alpha_raw) = u64::decode(&mut value.as_slice()) else {
                warn!("skipping undecodable alpha storage value");
                continue;
            };

            let address = to_ss58(account);
            let mut stake_key = stake_prefix.clone();
            stake_key.extend(blake2_128_concat(account.as_ref()));
            stake_key_to_address.insert(stake_key.clone(), address.clone());
            stake_keys.push(stake_key);

            balances.insert(
                address,
                HolderBalances {
                    alpha_raw,
                    tao_raw: 0,
                },
            );
        }

        let stake_values = self.values_at(&stake_keys).await?;
        for (key, value) in stake_values {
            let Some(address) = stake_key_to_address.get(&key) else {
                continue;
            };
            let Ok(tao_raw) = u64::decode(&mut value.as_slice()) else {
                continue;
            };
            if let Some(holder) = balances.get_mut(address) {
                holder.tao_raw = tao_raw;
            }
        }

        Ok(balances)
    }

    async fn registered_miners(&self) -> Result<Vec<String>, Self::Error> {
        // Keys is keyed by (netuid, uid), so the netuid can be folded into the prefix.
        let mut prefix = storage_prefix(PALLET, KEYS_ENTRY);
        prefix.extend(blake2_128_concat(&self.netuid.encode()));

        let keys = self.paged_keys(&prefix).await?;
        let values = self.values_at(&keys).await?;

        let mut miners = Vec::with_capacity(values.len());
        for value in values.values() {
            let Ok(raw) = <[u8; 32]>::decode(&mut value.as_slice()) else {
                warn!("skipping undecodable hotkey storage value");
                continue;
            };
            miners.push(to_ss58(&AccountId32::from(raw)));
        }
        miners.sort();

        Ok(miners)
    }
}

/// Error possibly returned by [SubtensorClient] operations.
#[derive(Debug, Error)]
pub enum SubtensorClientError {
    #[error("cannot create reconnecting subxt RPC client")]
    RpcClient(#[source] BoxError),

    #[error("RPC call {0} failed: {1}")]
    RpcCall(&'static str, String),

    #[error("RPC call {0} timed out")]
    Timeout(&'static str),

    #[error("no finalized head available")]
    MissingHeader,
}

fn storage_prefix(pallet: &str, entry: &str) -> Vec<u8> {
    let mut prefix = twox_128(pallet.as_bytes()).to_vec();
    prefix.extend(twox_128(entry.as_bytes()));
    prefix
}

fn blake2_128_concat(data: &[u8]) -> Vec<u8> {
    let mut key = blake2_128(data).to_vec();
    key.extend_from_slice(data);
    key
}

/// Decode the `(AccountId32, u16)` suffix of a double-map key where both hashers are
/// Blake2_128Concat.
fn decode_account_netuid_key(key: &[u8], prefix_len: usize) -> Option<(AccountId32, u16)> {
    let suffix = key.get(prefix_len..)?;
    if suffix.len() != 16 + 32 + 16 + 2 {
        return None;
    }

    let account: [u8; 32] = suffix[16..48].try_into().ok()?;
    let netuid = u16::from_le_bytes(suffix[64..66].try_into().ok()?);

    Some((AccountId32::from(account), netuid))
}

fn to_ss58(account: &AccountId32) -> String {
    account.to_ss58check_with_version(Ss58AddressFormat::custom(SS58_PREFIX))
}
