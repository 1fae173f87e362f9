// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use thiserror::Error;

/// Request-level error. Each variant maps to a stable user-facing string via [user_message];
/// internal detail (database, upstream) stays in the logs.
///
/// [user_message]: ApiError::user_message
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid signature")]
    Auth,

    #[error("invalid Uniswap V3 pools")]
    InvalidPool,

    #[error("invalid block number")]
    InvalidBlock,

    #[error("stale block number")]
    StaleBlock,

    #[error("address does not hold alpha tokens")]
    NotAHolder,

    #[error("rate limited, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("{0}")]
    CooldownActive(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("hotkey is not registered on the subnet")]
    NotRegisteredMiner,

    #[error("{0}")]
    VersionIncompatible(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The stable string returned to clients.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(message) => message.clone(),
            Self::Auth => "Invalid signature".to_owned(),
            Self::InvalidPool => "Invalid Uniswap V3 pools".to_owned(),
            Self::InvalidBlock => "Invalid block number".to_owned(),
            Self::StaleBlock => "Block number is stale".to_owned(),
            Self::NotAHolder => "Address does not hold alpha tokens".to_owned(),
            Self::RateLimited { .. } => "Rate limit exceeded".to_owned(),
            Self::CooldownActive(message) => message.clone(),
            Self::Database(_) => "Database error".to_owned(),
            Self::Upstream(_) => "Upstream service error".to_owned(),
            Self::NotRegisteredMiner => "Hotkey is not registered on the subnet".to_owned(),
            Self::VersionIncompatible(message) => message.clone(),
            Self::Internal(_) => "Internal server error".to_owned(),
        }
    }

    /// Whether the variant stems from our own infrastructure rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Upstream(_) | Self::Internal(_)
        )
    }
}
