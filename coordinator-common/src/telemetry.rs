// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use log::{LevelFilter, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

/// Telemetry configuration; currently only an optional Prometheus listener.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "metrics", default)]
    pub metrics_config: Option<MetricsConfig>,
}

/// Config for the Prometheus exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub address: IpAddr,
    pub port: u16,
}

/// Initialize logging to stderr; the level is taken from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    logforth::builder()
        .dispatch(|dispatch| {
            dispatch
                .filter(level)
                .append(logforth::append::Stderr::default())
        })
        .apply();
}

/// Install the Prometheus metrics exporter if configured. Failures are logged but not fatal.
pub fn init_metrics(config: Option<MetricsConfig>) {
    let Some(MetricsConfig { address, port }) = config else {
        return;
    };

    if let Err(error) = PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(address, port))
        .install()
    {
        warn!(error:?; "cannot install Prometheus metrics exporter");
    }
}
