// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{ops::Deref, path::PathBuf, time::Duration};
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Config for the SQLite pool.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_file: PathBuf,

    #[serde(default = "max_connections_default")]
    pub max_connections: u32,
}

/// SQLite connection pool; the database file is created on demand and migrations are applied
/// during construction.
#[derive(Debug, Clone)]
pub struct SqlitePool(sqlx::SqlitePool);

impl SqlitePool {
    /// Create a new [SqlitePool] with the given [Config].
    pub async fn new(config: Config) -> Result<Self, CreatePoolError> {
        if let Some(parent) = config.db_file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CreatePoolError::CreateDir)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.db_file)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(CreatePoolError::Connect)?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self(pool))
    }
}

impl Deref for SqlitePool {
    type Target = sqlx::SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Error possibly returned by [SqlitePool::new].
#[derive(Debug, Error)]
pub enum CreatePoolError {
    #[error("cannot create database directory")]
    CreateDir(#[source] std::io::Error),

    #[error("cannot connect to SQLite database")]
    Connect(#[source] sqlx::Error),

    #[error("cannot run database migrations")]
    Migrate(#[from] MigrateError),
}

fn max_connections_default() -> u32 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new() {
        let dir = tempfile::tempdir().expect("tempdir can be created");
        let config = Config {
            db_file: dir.path().join("test.db"),
            max_connections: 2,
        };

        let pool = SqlitePool::new(config).await.expect("pool can be created");

        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM votes")
            .fetch_one(&*pool)
            .await
            .expect("votes table exists");
        assert_eq!(count, 0);
    }
}
