// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::domain::dex::PriceOracle;
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

const API_KEY_HEADER: &str = "x-api-key";

/// Config for the optional USD price oracle.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// A [PriceOracle] implementation over a simple token-price HTTP endpoint. Responses enrich
/// position views only; callers degrade gracefully on failure.
#[derive(Clone)]
pub struct HttpPriceOracle {
    http: HttpClient,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpPriceOracle {
    /// Create a new [HttpPriceOracle] with the given [Config].
    pub fn new(config: Config) -> Result<Self, PriceOracleError> {
        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(PriceOracleError::CreateClient)?;

        Ok(Self {
            http,
            url: config.url,
            api_key: config.api_key,
        })
    }
}

impl PriceOracle for HttpPriceOracle {
    type Error = PriceOracleError;

    async fn usd_prices(
        &self,
        token_addresses: &[String],
    ) -> Result<HashMap<String, f64>, Self::Error> {
        if token_addresses.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}?contract_addresses={}&vs_currencies=usd",
            self.url,
            token_addresses.join(",")
        );
        let mut request = self.http.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key.expose_secret());
        }

        let quotes = request
            .send()
            .await?
            .error_for_status()?
            .json::<HashMap<String, HashMap<String, f64>>>()
            .await?;

        Ok(quotes
            .into_iter()
            .filter_map(|(token, quote)| {
                quote
                    .get("usd")
                    .map(|usd| (token.to_ascii_lowercase(), *usd))
            })
            .collect())
    }
}

/// Error possibly returned by [HttpPriceOracle] operations.
#[derive(Debug, Error)]
pub enum PriceOracleError {
    #[error("cannot create HTTP client")]
    CreateClient(#[source] reqwest::Error),

    #[error("price oracle request failed")]
    Request(#[from] reqwest::Error),
}
