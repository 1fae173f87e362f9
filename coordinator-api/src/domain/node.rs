// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::holders::HolderBalances;
use std::{collections::HashMap, error::Error as StdError};

/// Subnet chain abstraction: block height plus the storage scans backing the holder snapshot
/// and the miner roster.
#[trait_variant::make(Send)]
pub trait SubnetNode
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// The current finalized block height.
    async fn block_number(&self) -> Result<u64, Self::Error>;

    /// Alpha and TAO balances of every hotkey on the configured subnet.
    async fn holder_balances(&self) -> Result<HashMap<String, HolderBalances>, Self::Error>;

    /// Hotkeys currently registered on the configured subnet.
    async fn registered_miners(&self) -> Result<Vec<String>, Self::Error>;
}
