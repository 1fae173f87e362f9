// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Validator version compatibility for the ping endpoint: `major` and `minor` must match the
//! server, the client `patch` may trail; a client ahead on `patch` is accepted with a note.

use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("version must have the form <major>.<minor>.<patch>")]
pub struct ParseVersionError;

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let mut next = || {
            parts
                .next()
                .and_then(|part| part.parse::<u32>().ok())
                .ok_or(ParseVersionError)
        };

        Ok(Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    /// Client patch exceeds the server's; accepted, but the client is on a non-master branch.
    NonMasterClient,
    Incompatible,
}

pub fn check_client(server: Version, client: Version) -> Compatibility {
    if client.major != server.major || client.minor != server.minor {
        Compatibility::Incompatible
    } else if client.patch > server.patch {
        Compatibility::NonMasterClient
    } else {
        Compatibility::Compatible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> Version {
        s.parse().expect("version can be parsed")
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            version("1.2.3"),
            Version {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn test_check_client_equal() {
        assert_eq!(
            check_client(version("1.2.3"), version("1.2.3")),
            Compatibility::Compatible
        );
    }

    #[test]
    fn test_check_client_trailing_patch() {
        assert_eq!(
            check_client(version("1.2.3"), version("1.2.1")),
            Compatibility::Compatible
        );
    }

    #[test]
    fn test_check_client_ahead_patch() {
        assert_eq!(
            check_client(version("1.2.3"), version("1.2.4")),
            Compatibility::NonMasterClient
        );
    }

    #[test]
    fn test_check_client_mismatch() {
        assert_eq!(
            check_client(version("1.2.3"), version("1.3.3")),
            Compatibility::Incompatible
        );
        assert_eq!(
            check_client(version("1.2.3"), version("2.2.3")),
            Compatibility::Incompatible
        );
    }
}
