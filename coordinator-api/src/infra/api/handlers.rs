// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use super::AppState;
use crate::domain::{
    ApiError, MinerPositions, PriceOracle, SignedRequest,
    emission::{self, MinerScores},
    storage::{Storage, StoredVote},
};
use axum::{
    Json,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::{
    collections::{BTreeSet, HashMap},
    net::SocketAddr,
    time::{Duration, Instant},
};

const ALL_VOTES_CACHE_TTL: Duration = Duration::from_secs(30);

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&**state.storage.sqlite_pool())
        .await
    {
        Ok(_) => StatusCode::OK.into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "database not ready").into_response(),
    }
}

pub async fn update_votes(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SignedRequest>,
) -> Json<Value> {
    let client_ip = client_ip(&headers, &addr);
    respond(state.service.update_votes(&client_ip, request).await)
}

pub async fn claim_address(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SignedRequest>,
) -> Json<Value> {
    let client_ip = client_ip(&headers, &addr);
    respond(state.service.claim_address(&client_ip, request).await)
}

pub async fn ping(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SignedRequest>,
) -> Json<Value> {
    let client_ip = client_ip(&headers, &addr);
    respond(state.service.ping(&client_ip, request).await)
}

pub async fn user_votes(
    State(state): State<AppState>,
    Path(voter): Path<String>,
) -> Json<Value> {
    let result = async {
        let vote = state.storage.vote(&voter).await?;
        Ok(json!({ "vote": vote.map(|vote| vote_view(&vote)) }))
    }
    .await;

    respond(result)
}

pub async fn all_votes(State(state): State<AppState>) -> Json<Value> {
    if let Some((cached_at, payload)) = state.all_votes_cache.read().clone()
        && cached_at.elapsed() < ALL_VOTES_CACHE_TTL
    {
        return respond(Ok::<_, ApiError>(payload));
    }

    let result = async {
        let votes = state.storage.all_votes().await?;
        let holders = state.holders.load();
        let multipliers = emission::voter_multipliers(&votes, &holders);

        let votes = votes
            .iter()
            .map(|vote| {
                let mut view = vote_view(vote);
                view.insert("alpha_raw".to_owned(), json!(holders.alpha_of(&vote.voter)));
                view.insert(
                    "multiplier".to_owned(),
                    json!(multipliers.get(&vote.voter).copied().unwrap_or_default()),
                );
                Value::Object(view)
            })
            .collect::<Vec<_>>();

        let payload = json!({ "votes": votes });
        *state.all_votes_cache.write() = Some((Instant::now(), payload.clone()));

        Ok(payload)
    }
    .await;

    respond(result)
}

pub async fn all_holders(State(state): State<AppState>) -> Json<Value> {
    let holders = state.holders.load();
    respond(Ok::<_, ApiError>(json!({
        "count": holders.balances.len(),
        "holders": &holders.balances,
    })))
}

pub async fn all_addresses(State(state): State<AppState>) -> Json<Value> {
    let result = async {
        let roster = state.roster.load();
        let addresses = state
            .storage
            .all_bindings()
            .await?
            .into_iter()
            .filter(|binding| roster.contains(&binding.voter))
            .map(|binding| json!({ "hotkey": binding.voter, "evm_address": binding.evm_address }))
            .collect::<Vec<_>>();

        Ok(json!({ "addresses": addresses }))
    }
    .await;

    respond(result)
}

pub async fn all_miners(State(state): State<AppState>) -> Json<Value> {
    let result = async {
        let roster = state.roster.load();
        let bindings = state
            .storage
            .all_bindings()
            .await?
            .into_iter()
            .map(|binding| (binding.voter, binding.evm_address))
            .collect::<HashMap<_, _>>();

        let miners = roster
            .hotkeys
            .iter()
            .map(|hotkey| json!({ "hotkey": hotkey, "evm_address": bindings.get(hotkey) }))
            .collect::<Vec<_>>();

        Ok(json!({ "miners": miners }))
    }
    .await;

    respond(result)
}

pub async fn pools(State(state): State<AppState>) -> Json<Value> {
    let result = async {
        let votes = state.storage.all_votes().await?;
        let holders = state.holders.load();
        let multipliers = emission::voter_multipliers(&votes, &holders);
        let emissions = emission::pool_emissions(&votes, &multipliers);

        let voted = votes
            .iter()
            .flat_map(|vote| vote.pools.iter().map(|pool| pool.address.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let metadata = state
            .storage
            .pools_by_addresses(&voted)
            .await?
            .into_iter()
            .map(|pool| (pool.address.clone(), pool))
            .collect::<HashMap<_, _>>();

        let mut pools = voted
            .iter()
            .map(|address| {
                let voters = votes
                    .iter()
                    .filter_map(|vote| {
                        vote.pools
                            .iter()
                            .find(|pool| &pool.address == address)
                            .map(|pool| {
                                json!({
                                    "voter": vote.voter,
                                    "weight": pool.weight,
                                    "alpha_raw": holders.alpha_of(&vote.voter),
                                    "multiplier": multipliers
                                        .get(&vote.voter)
                                        .copied()
                                        .unwrap_or_default(),
                                })
                            })
                    })
                    .collect::<Vec<_>>();

                json!({
                    "address": address,
                    "emission": emissions.get(address).copied().unwrap_or_default(),
                    "metadata": metadata.get(address),
                    "voters": voters,
                })
            })
            .collect::<Vec<_>>();

        // Highest emission first.
        pools.sort_by(|a, b| {
            let emission = |pool: &Value| pool["emission"].as_f64().unwrap_or_default();
            emission(b).total_cmp(&emission(a))
        });

        Ok(json!({ "pools": pools }))
    }
    .await;

    respond(result)
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub hotkey: Option<String>,
    pub pool: Option<String>,
}

pub async fn positions(
    State(state): State<AppState>,
    Query(query): Query<PositionsQuery>,
) -> Json<Value> {
    respond(miner_position_views(&state, query.hotkey.as_deref(), query.pool.as_deref()).await)
}

pub async fn miner_positions(
    State(state): State<AppState>,
    Path(miner): Path<String>,
) -> Json<Value> {
    respond(miner_position_views(&state, Some(&miner), None).await)
}

pub async fn weights(State(state): State<AppState>) -> Json<Value> {
    let result = async {
        let votes = state.storage.all_votes().await?;
        let holders = state.holders.load();
        let miners = state.fetcher.active_positions().await?;

        let weights = emission::compute_weights(&votes, &holders, &miners);
        Ok(json!({ "weights": weights }))
    }
    .await;

    respond(result)
}

pub async fn vote_cooldown(
    State(state): State<AppState>,
    Path(voter): Path<String>,
) -> Json<Value> {
    let result = state
        .service
        .cooldown_status(&voter)
        .await
        .map(|status| json!({ "cooldown": status }));

    respond(result)
}

pub async fn vote_history(
    State(state): State<AppState>,
    Path(voter): Path<String>,
) -> Json<Value> {
    let result = async {
        let history = state.storage.vote_history(&voter).await?;
        let current = state.storage.vote(&voter).await?;

        Ok(json!({
            "history": history,
            "current_vote": current.map(|vote| vote_view(&vote)),
        }))
    }
    .await;

    respond(result)
}

/// Scored position views per miner, optionally restricted to one hotkey and/or one pool.
async fn miner_position_views(
    state: &AppState,
    hotkey: Option<&str>,
    pool: Option<&str>,
) -> Result<Value, ApiError> {
    let votes = state.storage.all_votes().await?;
    let holders = state.holders.load();
    let multipliers = emission::voter_multipliers(&votes, &holders);
    let emissions = emission::pool_emissions(&votes, &multipliers);

    let miners = state.fetcher.active_positions().await?;
    // Scores and weights are computed over the full snapshot; filters only shape the view.
    let scored = emission::score_positions(&miners, &emissions);
    let weights = emission::miner_weights(&miners, &emissions);
    let prices = fetch_prices(state, &miners).await;

    let pool = pool.map(str::to_ascii_lowercase);
    let views = scored
        .iter()
        .filter(|scores| hotkey.is_none_or(|hotkey| scores.miner == hotkey))
        .map(|scores| miner_view(scores, &weights, pool.as_deref(), &prices))
        .collect::<Vec<_>>();

    Ok(json!({ "miners": views }))
}

fn miner_view(
    scores: &MinerScores,
    weights: &std::collections::BTreeMap<String, f64>,
    pool: Option<&str>,
    prices: &HashMap<String, f64>,
) -> Value {
    let positions = scores
        .positions
        .iter()
        .filter(|scored| pool.is_none_or(|pool| scored.position.pool.address == pool))
        .map(|scored| {
            let position = &scored.position;
            let (amount0, amount1) = position.token_amounts();

            let price0 = prices.get(&position.token0.address).copied();
            let price1 = prices.get(&position.token1.address).copied();
            let usd_value = match (price0, price1) {
                (None, None) => None,
                _ => Some(
                    amount0 * price0.unwrap_or_default() + amount1 * price1.unwrap_or_default(),
                ),
            };

            json!({
                "id": position.id,
                "pool": position.pool.address,
                "fee_tier": position.pool.fee_tier,
                "current_tick": position.pool.current_tick,
                "tick_lower": position.tick_lower,
                "tick_upper": position.tick_upper,
                "liquidity": position.liquidity,
                "token0": { "address": position.token0.address, "symbol": position.token0.symbol, "usd_price": price0 },
                "token1": { "address": position.token1.address, "symbol": position.token1.symbol, "usd_price": price1 },
                "amount0": amount0,
                "amount1": amount1,
                "raw_score": scored.raw_score,
                "pool_share": scored.pool_share,
                "emission": scored.emission,
                "usd_value": usd_value,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "miner": scores.miner,
        "weight": weights.get(&scores.miner).copied().unwrap_or_default(),
        "positions": positions,
    })
}

/// USD prices for every token referenced by the positions; empty on oracle failure.
async fn fetch_prices(state: &AppState, miners: &[MinerPositions]) -> HashMap<String, f64> {
    let Some(oracle) = &state.oracle else {
        return HashMap::new();
    };

    let tokens = miners
        .iter()
        .flat_map(|miner| miner.positions.iter())
        .flat_map(|position| {
            [
                position.token0.address.clone(),
                position.token1.address.clone(),
            ]
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();

    match oracle.usd_prices(&tokens).await {
        Ok(prices) => prices,
        Err(oracle_error) => {
            warn!(error:? = oracle_error; "cannot fetch USD prices");
            HashMap::new()
        }
    }
}

fn vote_view(vote: &StoredVote) -> Map<String, Value> {
    let mut view = Map::new();
    view.insert("voter".to_owned(), json!(vote.voter));
    view.insert("pools".to_owned(), json!(vote.pools));
    view.insert("block_number".to_owned(), json!(vote.block_number));
    view.insert("updated_at".to_owned(), json!(vote.updated_at));
    view
}

fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

/// Wrap a handler result in the `{success, ...}` envelope; internal errors are logged verbatim
/// and surfaced as their stable category string only.
fn respond<T: Serialize>(result: Result<T, ApiError>) -> Json<Value> {
    match result {
        Ok(payload) => {
            let payload = match serde_json::to_value(payload) {
                Ok(Value::Object(object)) => object,
                Ok(other) => {
                    let mut object = Map::new();
                    object.insert("data".to_owned(), other);
                    object
                }
                Err(serialize_error) => {
                    error!(error:? = serialize_error; "cannot serialize response payload");
                    return error_body(&ApiError::Internal("serialization failed".to_owned()));
                }
            };

            let mut object = payload;
            object.insert("success".to_owned(), Value::Bool(true));
            Json(Value::Object(object))
        }

        Err(api_error) => error_body(&api_error),
    }
}

fn error_body(api_error: &ApiError) -> Json<Value> {
    if api_error.is_internal() {
        error!(error:? = api_error; "request failed");
    } else {
        debug!(error:? = api_error; "request rejected");
    }

    Json(json!({ "success": false, "error": api_error.user_message() }))
}
