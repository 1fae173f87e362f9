// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Raw on-chain balances of one holder; alpha gates voting, TAO is informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HolderBalances {
    pub alpha_raw: u64,
    pub tao_raw: u64,
}

/// Immutable snapshot of all holder balances of the subnet.
#[derive(Debug)]
pub struct HolderSnapshot {
    pub balances: HashMap<String, HolderBalances>,
    pub updated_at: Instant,
}

impl HolderSnapshot {
    pub fn new(balances: HashMap<String, HolderBalances>) -> Self {
        Self {
            balances,
            updated_at: Instant::now(),
        }
    }

    pub fn alpha_of(&self, voter: &str) -> u64 {
        self.balances
            .get(voter)
            .map(|balances| balances.alpha_raw)
            .unwrap_or_default()
    }
}

/// Shared handle to the current [HolderSnapshot]; snapshots are replaced whole, readers never
/// observe partial updates.
#[derive(Debug, Clone)]
pub struct SharedHolders(Arc<RwLock<Arc<HolderSnapshot>>>);

impl SharedHolders {
    /// An empty snapshot, to be replaced by the startup build.
    pub fn empty() -> Self {
        Self(Arc::new(RwLock::new(Arc::new(HolderSnapshot::new(
            HashMap::new(),
        )))))
    }

    pub fn load(&self) -> Arc<HolderSnapshot> {
        self.0.read().clone()
    }

    pub fn replace(&self, snapshot: HolderSnapshot) {
        *self.0.write() = Arc::new(snapshot);
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.load().updated_at.elapsed() > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_is_atomic_for_readers() {
        let holders = SharedHolders::empty();
        let before = holders.load();
        assert!(before.balances.is_empty());

        holders.replace(HolderSnapshot::new(HashMap::from([(
            "voter".to_owned(),
            HolderBalances {
                alpha_raw: 7,
                tao_raw: 3,
            },
        )])));

        // The old handle still sees the old snapshot, new reads see the new one.
        assert!(before.balances.is_empty());
        assert_eq!(holders.load().alpha_of("voter"), 7);
    }
}
