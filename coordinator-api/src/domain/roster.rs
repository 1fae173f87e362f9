// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use parking_lot::RwLock;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

/// Immutable snapshot of the miner hotkeys currently registered on the subnet.
#[derive(Debug)]
pub struct MinerRoster {
    pub hotkeys: Vec<String>,
    lookup: HashSet<String>,
    pub updated_at: Instant,
}

impl MinerRoster {
    pub fn new(hotkeys: Vec<String>) -> Self {
        let lookup = hotkeys.iter().cloned().collect();
        Self {
            hotkeys,
            lookup,
            updated_at: Instant::now(),
        }
    }

    pub fn contains(&self, hotkey: &str) -> bool {
        self.lookup.contains(hotkey)
    }
}

/// Shared handle to the current [MinerRoster], replaced whole on refresh.
#[derive(Debug, Clone)]
pub struct SharedRoster(Arc<RwLock<Arc<MinerRoster>>>);

impl SharedRoster {
    pub fn empty() -> Self {
        Self(Arc::new(RwLock::new(Arc::new(MinerRoster::new(vec![])))))
    }

    pub fn load(&self) -> Arc<MinerRoster> {
        self.0.read().clone()
    }

    pub fn replace(&self, roster: MinerRoster) {
        *self.0.write() = Arc::new(roster);
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.load().updated_at.elapsed() > ttl
    }
}
