// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;
use std::env;

const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "APP__";
const ENV_SEPARATOR: &str = "__";

/// Extension methods for configurations to be loaded from a YAML file with an environment
/// variable overlay. The file defaults to `config.yaml` and can be changed via `CONFIG_FILE`;
/// overrides use the `APP__` prefix with `__` as section separator, e.g. `APP__INFRA__API__PORT`.
pub trait ConfigExt
where
    Self: DeserializeOwned,
{
    fn load() -> Result<Self, figment::Error> {
        let config_file =
            env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()
    }
}

impl<T> ConfigExt for T where T: DeserializeOwned {}
