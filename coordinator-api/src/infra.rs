// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod api;
pub mod csv_log;
pub mod oracle;
pub mod storage;
pub mod subgraph;
pub mod subxt_node;
pub mod uniswap;

use coordinator_common::infra::pool;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "api")]
    pub api_config: api::Config,

    #[serde(rename = "storage")]
    pub storage_config: pool::sqlite::Config,

    #[serde(rename = "node")]
    pub node_config: subxt_node::Config,

    #[serde(rename = "dex")]
    pub dex_config: uniswap::Config,

    #[serde(rename = "subgraph")]
    pub subgraph_config: subgraph::Config,

    #[serde(rename = "oracle", default)]
    pub oracle_config: Option<oracle::Config>,
}
