// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Request orchestration for vote submission, address claims and validator pings. Per-voter
//! write sequences (read current vote, cooldown check, upsert, history append) are serialized
//! through a keyed mutex map.

use crate::domain::{
    claim::ClaimMessage,
    cooldown::{self, Decision},
    error::ApiError,
    holders::SharedHolders,
    node::SubnetNode,
    ratelimit::{IP_LIMIT_PER_MINUTE, KEY_LIMIT_PER_MINUTE, RateLimiter},
    roster::SharedRoster,
    signature,
    storage::{Storage, StoredVote, VoteChange},
    version::{self, Compatibility, Version},
    vote::{self, PoolWeight, TOTAL_WEIGHT, VoteMessage},
    dex::DexClient,
};
use chrono::{SecondsFormat, TimeZone, Utc};
use dashmap::DashMap;
use log::{debug, error, info};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Submitted block numbers may trail the chain head by at most this many blocks.
pub const BLOCK_WINDOW: u64 = 10;

const MAX_ADDRESS_LEN: usize = 64;
const MAX_MESSAGE_LEN: usize = 4096;
const MAX_SIGNATURE_LEN: usize = 512;

/// A signed request as submitted to the write endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedRequest {
    pub address: String,
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub voter: String,
    pub pools: Vec<PoolWeight>,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimReceipt {
    pub voter: String,
    pub evm_address: String,
    pub already_linked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingReceipt {
    pub version_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Orchestrator for the authenticated write path.
#[derive(Clone)]
pub struct VoteService<S, N, D> {
    storage: S,
    node: N,
    dex: D,
    holders: SharedHolders,
    roster: SharedRoster,
    rate_limiter: Arc<RateLimiter>,
    voter_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    server_version: Version,
}

impl<S, N, D> VoteService<S, N, D>
where
    S: Storage,
    N: SubnetNode,
    D: DexClient,
{
    pub fn new(
        storage: S,
        node: N,
        dex: D,
        holders: SharedHolders,
        roster: SharedRoster,
        rate_limiter: Arc<RateLimiter>,
        server_version: Version,
    ) -> Self {
        Self {
            storage,
            node,
            dex,
            holders,
            roster,
            rate_limiter,
            voter_locks: Arc::new(DashMap::new()),
            server_version,
        }
    }

    /// Handle a vote submission end to end.
    pub async fn update_votes(
        &self,
        client_ip: &str,
        request: SignedRequest,
    ) -> Result<VoteReceipt, ApiError> {
        validate_lengths(&request)?;
        self.check_rate(client_ip, IP_LIMIT_PER_MINUTE)?;
        self.check_rate(&format!("vote_{}", request.address), KEY_LIMIT_PER_MINUTE)?;

        signature::verify_substrate(&request.message, &request.signature, &request.address)
            .map_err(|_| ApiError::Auth)?;

        let mut parsed = VoteMessage::parse(&request.message)
            .map_err(|error| ApiError::InvalidInput(error.to_string()))?;
        vote::normalize_weights(&mut parsed.pools)
            .map_err(|error| ApiError::InvalidInput(error.to_string()))?;

        // Every submitted pool must be derivable from the factory; metadata is cached lazily.
        for pool in &parsed.pools {
            let metadata = self
                .dex
                .validated_pool(&pool.address)
                .await
                .map_err(|error| upstream("validate pool", error))?;
            let Some(metadata) = metadata else {
                return Err(ApiError::InvalidPool);
            };
            if self.storage.pool(&pool.address).await?.is_none() {
                self.storage.upsert_pool(&metadata).await?;
            }
        }

        let current_block = self
            .node
            .block_number()
            .await
            .map_err(|error| upstream("fetch block number", error))?;
        check_block_window(parsed.block_number, current_block)?;

        if self.holders.load().alpha_of(&request.address) == 0 {
            return Err(ApiError::NotAHolder);
        }

        let lock = self.voter_lock(&request.address);
        let _guard = lock.lock().await;

        let now = Utc::now().timestamp();
        let current_vote = self.storage.vote(&request.address).await?;

        if let Some(existing) = &current_vote {
            let identical_retry =
                existing.block_number == parsed.block_number && existing.pools == parsed.pools;
            if existing.block_number >= parsed.block_number && !identical_retry {
                return Err(ApiError::StaleBlock);
            }
        }

        let has_change = current_vote
            .as_ref()
            .map(|existing| existing.pools != parsed.pools)
            .unwrap_or(true);

        let mut admitted = None;
        if has_change {
            // A failed history read must not block the vote; it only weakens this one cooldown
            // computation.
            let latest = match self.storage.latest_vote_change(&request.address).await {
                Ok(latest) => latest,
                Err(read_error) => {
                    error!(
                        voter = request.address.as_str(),
                        error:? = read_error;
                        "cannot read vote-change history, assuming none"
                    );
                    None
                }
            };
            match cooldown::evaluate(latest.as_ref(), now) {
                Decision::Reject { remaining } => {
                    return Err(ApiError::CooldownActive(cooldown_message(now, remaining)));
                }
                Decision::Admit {
                    next_count,
                    duration,
                } => admitted = Some((next_count, duration)),
            }
        }

        let stored = StoredVote {
            voter: request.address.clone(),
            pools: parsed.pools.clone(),
            signature: request.signature,
            message: request.message,
            block_number: parsed.block_number,
            total_weight: TOTAL_WEIGHT,
            updated_at: now,
        };
        self.storage.upsert_vote(&stored).await?;

        if has_change {
            if let (Some(previous), Some((next_count, duration))) = (current_vote, admitted) {
                let change = VoteChange {
                    voter: request.address.clone(),
                    old_pools: previous.pools,
                    new_pools: parsed.pools.clone(),
                    change_timestamp: now,
                    cooldown_until: now + duration.as_secs() as i64,
                    change_count: next_count,
                };
                // A lost history row only lowers the next effective count; the vote itself is
                // already durable.
                if let Err(change_error) = self.storage.record_vote_change(&change).await {
                    error!(
                        voter = request.address.as_str(),
                        error:? = change_error;
                        "cannot record vote change"
                    );
                }
            }
        }

        counter!("coordinator_votes_total").increment(1);

        Ok(VoteReceipt {
            voter: request.address,
            pools: parsed.pools,
            block_number: parsed.block_number,
        })
    }

    /// Handle an address claim: dual-signature proof of control over both identities.
    pub async fn claim_address(
        &self,
        client_ip: &str,
        request: SignedRequest,
    ) -> Result<ClaimReceipt, ApiError> {
        validate_lengths(&request)?;
        self.check_rate(client_ip, IP_LIMIT_PER_MINUTE)?;
        self.check_rate(&format!("claim_{}", request.address), KEY_LIMIT_PER_MINUTE)?;

        signature::verify_substrate(&request.message, &request.signature, &request.address)
            .map_err(|_| ApiError::Auth)?;

        let claim = ClaimMessage::parse(&request.message)
            .map_err(|error| ApiError::InvalidInput(error.to_string()))?;

        if !claim.eth_address.eq_ignore_ascii_case(&claim.eth_signer) {
            return Err(ApiError::InvalidInput(
                "EVM signer does not match the claimed address".to_owned(),
            ));
        }
        if claim.voter != request.address {
            return Err(ApiError::InvalidInput(
                "claimed voter does not match the signing address".to_owned(),
            ));
        }
        if !vote::is_evm_address(&claim.eth_signer) {
            return Err(ApiError::InvalidInput("malformed EVM address".to_owned()));
        }

        let current_block = self
            .node
            .block_number()
            .await
            .map_err(|error| upstream("fetch block number", error))?;
        check_block_window(claim.block_number, current_block)?;

        if !self.roster.load().contains(&claim.voter) {
            return Err(ApiError::NotRegisteredMiner);
        }

        signature::verify_evm(&claim.inner_message(), &claim.eth_signature, &claim.eth_signer)
            .map_err(|_| ApiError::Auth)?;

        let evm_address = claim.eth_address.to_ascii_lowercase();
        let now = Utc::now().timestamp();

        if let Some(existing) = self.storage.binding(&claim.voter).await?
            && existing.evm_address == evm_address
        {
            debug!(voter = claim.voter.as_str(); "identical binding already exists");
            return Ok(ClaimReceipt {
                voter: claim.voter,
                evm_address,
                already_linked: true,
            });
        }
        if let Some(other) = self.storage.binding_for_address(&evm_address).await?
            && other.voter != claim.voter
        {
            return Err(ApiError::InvalidInput(
                "EVM address is already linked to a different hotkey".to_owned(),
            ));
        }

        self.storage
            .upsert_binding(&claim.voter, &evm_address, now)
            .await?;
        info!(voter = claim.voter.as_str(), evm_address = evm_address.as_str(); "address claimed");
        counter!("coordinator_claims_total").increment(1);

        Ok(ClaimReceipt {
            voter: claim.voter,
            evm_address,
            already_linked: false,
        })
    }

    /// Handle a validator ping: signature, block freshness, registration and version check.
    pub async fn ping(
        &self,
        client_ip: &str,
        request: SignedRequest,
    ) -> Result<PingReceipt, ApiError> {
        validate_lengths(&request)?;
        self.check_rate(client_ip, IP_LIMIT_PER_MINUTE)?;
        self.check_rate(&format!("ping_{}", request.address), KEY_LIMIT_PER_MINUTE)?;

        signature::verify_substrate(&request.message, &request.signature, &request.address)
            .map_err(|_| ApiError::Auth)?;

        let (block_part, version_part) = request
            .message
            .split_once('|')
            .ok_or_else(|| ApiError::InvalidInput("ping message must be <block>|<version>".to_owned()))?;
        let block_number = block_part
            .trim()
            .parse::<u64>()
            .map_err(|_| ApiError::InvalidBlock)?;
        let client_version = version_part
            .trim()
            .parse::<Version>()
            .map_err(|error| ApiError::InvalidInput(error.to_string()))?;

        let current_block = self
            .node
            .block_number()
            .await
            .map_err(|error| upstream("fetch block number", error))?;
        check_block_window(block_number, current_block)?;

        if !self.roster.load().contains(&request.address) {
            return Err(ApiError::NotRegisteredMiner);
        }

        match version::check_client(self.server_version, client_version) {
            Compatibility::Compatible => Ok(PingReceipt {
                version_ok: true,
                message: None,
            }),
            Compatibility::NonMasterClient => Ok(PingReceipt {
                version_ok: true,
                message: Some("client is on a non-master branch".to_owned()),
            }),
            Compatibility::Incompatible => Err(ApiError::VersionIncompatible(format!(
                "validator version {client_version} is incompatible with server version {}",
                self.server_version
            ))),
        }
    }

    /// Cooldown state of a voter, including the duration the next change would incur.
    pub async fn cooldown_status(
        &self,
        voter: &str,
    ) -> Result<cooldown::CooldownStatus, ApiError> {
        let latest = self.storage.latest_vote_change(voter).await?;
        Ok(cooldown::status(latest.as_ref(), Utc::now().timestamp()))
    }

    fn check_rate(&self, key: &str, limit: u32) -> Result<(), ApiError> {
        self.rate_limiter
            .check(key, limit)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })
    }

    fn voter_lock(&self, voter: &str) -> Arc<Mutex<()>> {
        self.voter_locks
            .entry(voter.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn validate_lengths(request: &SignedRequest) -> Result<(), ApiError> {
    if request.address.is_empty()
        || request.address.len() > MAX_ADDRESS_LEN
        || request.message.is_empty()
        || request.message.len() > MAX_MESSAGE_LEN
        || request.signature.is_empty()
        || request.signature.len() > MAX_SIGNATURE_LEN
    {
        return Err(ApiError::InvalidInput("malformed request".to_owned()));
    }
    Ok(())
}

fn check_block_window(block_number: u64, current_block: u64) -> Result<(), ApiError> {
    if block_number > current_block {
        return Err(ApiError::InvalidBlock);
    }
    if block_number + BLOCK_WINDOW < current_block {
        return Err(ApiError::StaleBlock);
    }
    Ok(())
}

fn cooldown_message(now: i64, remaining: std::time::Duration) -> String {
    let resume_at = Utc
        .timestamp_opt(now + remaining.as_secs() as i64, 0)
        .single()
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    format!(
        "Vote change not allowed. Please wait {} more minutes before changing your vote (voting resumes at {resume_at})",
        cooldown::remaining_minutes(remaining)
    )
}

fn upstream(context: &str, error: impl std::error::Error) -> ApiError {
    error!(error:? = error.to_string(), context; "upstream call failed");
    ApiError::Upstream(format!("{context}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            holders::{HolderBalances, HolderSnapshot},
            roster::MinerRoster,
            storage::PoolMetadata,
        },
        infra::storage::SqliteStorage,
    };
    use alloy::signers::{SignerSync, local::PrivateKeySigner};
    use assert_matches::assert_matches;
    use coordinator_common::infra::pool::sqlite::{Config as PoolConfig, SqlitePool};
    use sp_core::{
        Pair,
        crypto::{Ss58AddressFormat, Ss58Codec},
        sr25519,
    };
    use std::collections::{HashMap, HashSet};

    const POOL_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const POOL_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const BLOCK: u64 = 1_000;

    #[derive(Debug, Clone)]
    struct FakeNode {
        block: u64,
    }

    impl crate::domain::node::SubnetNode for FakeNode {
        type Error = std::convert::Infallible;

        async fn block_number(&self) -> Result<u64, Self::Error> {
            Ok(self.block)
        }

        async fn holder_balances(&self) -> Result<HashMap<String, HolderBalances>, Self::Error> {
            Ok(HashMap::new())
        }

        async fn registered_miners(&self) -> Result<Vec<String>, Self::Error> {
            Ok(vec![])
        }
    }

    #[derive(Debug, Clone)]
    struct FakeDex {
        valid: Arc<HashSet<String>>,
    }

    impl DexClient for FakeDex {
        type Error = std::convert::Infallible;

        async fn validated_pool(
            &self,
            address: &str,
        ) -> Result<Option<PoolMetadata>, Self::Error> {
            Ok(self.valid.contains(address).then(|| PoolMetadata {
                address: address.to_owned(),
                token0: "0x1111111111111111111111111111111111111111".to_owned(),
                token1: "0x2222222222222222222222222222222222222222".to_owned(),
                fee: 3000,
                liquidity: "1000".to_owned(),
                symbol0: Some("T0".to_owned()),
                symbol1: Some("T1".to_owned()),
            }))
        }
    }

    struct Harness {
        service: VoteService<SqliteStorage, FakeNode, FakeDex>,
        storage: SqliteStorage,
        pair: sr25519::Pair,
        address: String,
        _dir: tempfile::TempDir,
    }

    async fn harness(alpha: u64) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir can be created");
        let pool = SqlitePool::new(PoolConfig {
            db_file: dir.path().join("test.db"),
            max_connections: 1,
        })
        .await
        .expect("pool can be created");
        let storage = SqliteStorage::new(pool);

        let pair = sr25519::Pair::from_string("//Alice", None).expect("dev pair can be derived");
        let address = pair
            .public()
            .to_ss58check_with_version(Ss58AddressFormat::custom(signature::SS58_PREFIX));

        let holders = SharedHolders::empty();
        holders.replace(HolderSnapshot::new(HashMap::from([(
            address.clone(),
            HolderBalances {
                alpha_raw: alpha,
                tao_raw: 0,
            },
        )])));

        let roster = SharedRoster::empty();
        roster.replace(MinerRoster::new(vec![address.clone()]));

        let service = VoteService::new(
            storage.clone(),
            FakeNode { block: BLOCK },
            FakeDex {
                valid: Arc::new(HashSet::from([POOL_A.to_owned(), POOL_B.to_owned()])),
            },
            holders,
            roster,
            Arc::new(RateLimiter::new()),
            "1.2.0".parse().expect("version can be parsed"),
        );

        Harness {
            service,
            storage,
            pair,
            address,
            _dir: dir,
        }
    }

    impl Harness {
        fn signed(&self, message: String) -> SignedRequest {
            let signature = hex::encode(self.pair.sign(message.as_bytes()));
            SignedRequest {
                address: self.address.clone(),
                message,
                signature,
            }
        }

        fn vote_request(&self, pools: &str, block: u64) -> SignedRequest {
            self.signed(format!("{pools}|{block}"))
        }
    }

    #[tokio::test]
    async fn test_first_vote_fresh_voter() {
        let harness = harness(100).await;
        let request = harness.vote_request(&format!("{POOL_A},1;{POOL_B},1"), BLOCK);

        let receipt = harness
            .service
            .update_votes("1.2.3.4", request)
            .await
            .expect("vote is accepted");

        assert_eq!(receipt.pools.len(), 2);
        assert!(receipt.pools.iter().all(|pool| pool.weight == 5_000));

        let stored = harness
            .storage
            .vote(&harness.address)
            .await
            .expect("vote can be read")
            .expect("vote exists");
        assert_eq!(stored.pools.iter().map(|p| p.weight).sum::<u64>(), 10_000);
        assert_eq!(stored.block_number, BLOCK);

        // No change history for a first vote.
        assert!(
            harness
                .storage
                .vote_history(&harness.address)
                .await
                .expect("history can be read")
                .is_empty()
        );

        // The voted pools got cached.
        assert!(
            harness
                .storage
                .pool(POOL_A)
                .await
                .expect("pool can be read")
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_progressive_cooldown() {
        let harness = harness(100).await;

        harness
            .service
            .update_votes("ip", harness.vote_request(&format!("{POOL_A},10000"), BLOCK))
            .await
            .expect("first vote is accepted");

        harness
            .service
            .update_votes("ip", harness.vote_request(&format!("{POOL_B},10000"), BLOCK + 1))
            .await
            .expect("vote change is accepted");

        let change = harness
            .storage
            .latest_vote_change(&harness.address)
            .await
            .expect("latest change can be read")
            .expect("change was recorded");
        assert_eq!(change.change_count, 1);
        assert_eq!(
            change.cooldown_until - change.change_timestamp,
            cooldown::BASE_COOLDOWN.as_secs() as i64
        );
        assert_eq!(change.old_pools[0].address, POOL_A);
        assert_eq!(change.new_pools[0].address, POOL_B);

        // An immediate flip back is rejected with the remaining time.
        let rejected = harness
            .service
            .update_votes("ip", harness.vote_request(&format!("{POOL_A},10000"), BLOCK + 2))
            .await;
        assert_matches!(
            rejected,
            Err(ApiError::CooldownActive(message)) if message.contains("71 more minutes")
        );
    }

    #[tokio::test]
    async fn test_resubmit_same_pools_updates_block_only() {
        let harness = harness(100).await;
        let pools = format!("{POOL_A},10000");

        harness
            .service
            .update_votes("ip", harness.vote_request(&pools, BLOCK - 1))
            .await
            .expect("first vote is accepted");
        harness
            .service
            .update_votes("ip", harness.vote_request(&pools, BLOCK))
            .await
            .expect("resubmission is accepted");

        let stored = harness
            .storage
            .vote(&harness.address)
            .await
            .expect("vote can be read")
            .expect("vote exists");
        assert_eq!(stored.block_number, BLOCK);
        assert!(
            harness
                .storage
                .vote_history(&harness.address)
                .await
                .expect("history can be read")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_non_holder_is_rejected_without_writes() {
        let harness = harness(0).await;
        let request = harness.vote_request(&format!("{POOL_A},10000"), BLOCK);

        let rejected = harness
            .service
            .update_votes("ip", request)
            .await
            .expect_err("non-holder is rejected");
        assert_eq!(rejected.user_message(), "Address does not hold alpha tokens");
        assert_matches!(rejected, ApiError::NotAHolder);

        assert!(
            harness
                .storage
                .vote(&harness.address)
                .await
                .expect("vote can be read")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invalid_pool_is_rejected_without_writes() {
        let harness = harness(100).await;
        let unknown = "0xdddddddddddddddddddddddddddddddddddddddd";
        let request = harness.vote_request(&format!("{unknown},10000"), BLOCK);

        let rejected = harness
            .service
            .update_votes("ip", request)
            .await
            .expect_err("unknown pool is rejected");
        assert_eq!(rejected.user_message(), "Invalid Uniswap V3 pools");
        assert_matches!(rejected, ApiError::InvalidPool);

        assert!(
            harness
                .storage
                .vote(&harness.address)
                .await
                .expect("vote can be read")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_block_window_boundaries() {
        let harness = harness(100).await;
        let pools = format!("{POOL_A},10000");

        // Oldest admissible block.
        harness
            .service
            .update_votes("ip", harness.vote_request(&pools, BLOCK - BLOCK_WINDOW))
            .await
            .expect("block at window edge is accepted");

        assert_matches!(
            harness
                .service
                .update_votes("ip", harness.vote_request(&pools, BLOCK - BLOCK_WINDOW - 1))
                .await,
            Err(ApiError::StaleBlock)
        );
        assert_matches!(
            harness
                .service
                .update_votes("ip", harness.vote_request(&pools, BLOCK + 1))
                .await,
            Err(ApiError::InvalidBlock)
        );
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let harness = harness(100).await;
        let mut request = harness.vote_request(&format!("{POOL_A},10000"), BLOCK);
        request.message = format!("{POOL_B},10000|{BLOCK}");

        assert_matches!(
            harness.service.update_votes("ip", request).await,
            Err(ApiError::Auth)
        );
    }

    #[tokio::test]
    async fn test_rate_limit_per_voter() {
        let harness = harness(100).await;
        let pools = format!("{POOL_A},10000");

        for _ in 0..KEY_LIMIT_PER_MINUTE {
            // Identical retries all succeed and count against the voter key.
            let _ = harness
                .service
                .update_votes("ip", harness.vote_request(&pools, BLOCK))
                .await;
        }

        assert_matches!(
            harness
                .service
                .update_votes("ip", harness.vote_request(&pools, BLOCK))
                .await,
            Err(ApiError::RateLimited { .. })
        );
    }

    fn claim_request(harness: &Harness, signer: &PrivateKeySigner, block: u64) -> SignedRequest {
        let eth_address = format!("{:#x}", signer.address());
        let inner = format!("{eth_address}|{}|{block}", harness.address);
        let eth_signature = hex::encode(
            signer
                .sign_message_sync(inner.as_bytes())
                .expect("message can be signed")
                .as_bytes(),
        );
        harness.signed(format!(
            "{eth_signature}|{eth_address}|{}|{block}|{eth_address}",
            harness.address
        ))
    }

    #[tokio::test]
    async fn test_claim_address() {
        let harness = harness(100).await;
        let signer = PrivateKeySigner::random();

        let receipt = harness
            .service
            .claim_address("ip", claim_request(&harness, &signer, BLOCK))
            .await
            .expect("claim is accepted");
        assert!(!receipt.already_linked);
        assert_eq!(receipt.evm_address, format!("{:#x}", signer.address()));

        let binding = harness
            .storage
            .binding(&harness.address)
            .await
            .expect("binding can be read")
            .expect("binding exists");
        assert_eq!(binding.evm_address, receipt.evm_address);

        // An identical claim is a successful no-op.
        let again = harness
            .service
            .claim_address("ip", claim_request(&harness, &signer, BLOCK))
            .await
            .expect("identical claim succeeds");
        assert!(again.already_linked);
    }

    #[tokio::test]
    async fn test_claim_rejects_wrong_evm_signer() {
        let harness = harness(100).await;
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();

        // The message claims `other` but the inner signature comes from `signer`.
        let eth_address = format!("{:#x}", other.address());
        let inner = format!("{eth_address}|{}|{BLOCK}", harness.address);
        let eth_signature = hex::encode(
            signer
                .sign_message_sync(inner.as_bytes())
                .expect("message can be signed")
                .as_bytes(),
        );
        let request = harness.signed(format!(
            "{eth_signature}|{eth_address}|{}|{BLOCK}|{eth_address}",
            harness.address
        ));

        assert_matches!(
            harness.service.claim_address("ip", request).await,
            Err(ApiError::Auth)
        );
    }

    #[tokio::test]
    async fn test_ping_version_check() {
        let harness = harness(100).await;

        let ok = harness
            .service
            .ping("ip", harness.signed(format!("{BLOCK}|1.2.0")))
            .await
            .expect("ping succeeds");
        assert!(ok.version_ok);
        assert_eq!(ok.message, None);

        let ahead = harness
            .service
            .ping("ip", harness.signed(format!("{BLOCK}|1.2.1")))
            .await
            .expect("ping succeeds for non-master client");
        assert_eq!(
            ahead.message.as_deref(),
            Some("client is on a non-master branch")
        );

        assert_matches!(
            harness
                .service
                .ping("ip", harness.signed(format!("{BLOCK}|1.3.0")))
                .await,
            Err(ApiError::VersionIncompatible(_))
        );
    }
}
