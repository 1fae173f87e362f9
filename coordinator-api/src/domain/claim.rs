// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Parsed claim message: `ethSig|ethAddr|voter|block|ethSigner`. The outer substrate signature
/// covers the whole message; `eth_signature` covers [ClaimMessage::inner_message].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMessage {
    pub eth_signature: String,
    pub eth_address: String,
    pub voter: String,
    pub block_raw: String,
    pub block_number: u64,
    pub eth_signer: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseClaimError {
    #[error("claim message must have exactly 5 pipe-separated fields")]
    WrongFieldCount,

    #[error("claim message contains an empty field")]
    EmptyField,

    #[error("invalid block number")]
    InvalidBlockNumber,
}

impl ClaimMessage {
    pub fn parse(message: &str) -> Result<Self, ParseClaimError> {
        let fields = message.split('|').collect::<Vec<_>>();
        let [eth_signature, eth_address, voter, block_raw, eth_signer] = fields[..] else {
            return Err(ParseClaimError::WrongFieldCount);
        };

        if [eth_signature, eth_address, voter, block_raw, eth_signer]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(ParseClaimError::EmptyField);
        }

        let block_number = block_raw
            .parse::<u64>()
            .map_err(|_| ParseClaimError::InvalidBlockNumber)?;

        Ok(Self {
            eth_signature: eth_signature.to_owned(),
            eth_address: eth_address.to_owned(),
            voter: voter.to_owned(),
            block_raw: block_raw.to_owned(),
            block_number,
            eth_signer: eth_signer.to_owned(),
        })
    }

    /// The message the EVM key signed, reassembled from the original fields.
    pub fn inner_message(&self) -> String {
        format!("{}|{}|{}", self.eth_address, self.voter, self.block_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse() {
        let message = "0xsig|0xabc|5Fvoter|123|0xabc";
        let claim = ClaimMessage::parse(message).expect("message can be parsed");

        assert_eq!(claim.eth_signature, "0xsig");
        assert_eq!(claim.eth_address, "0xabc");
        assert_eq!(claim.voter, "5Fvoter");
        assert_eq!(claim.block_number, 123);
        assert_eq!(claim.eth_signer, "0xabc");
        assert_eq!(claim.inner_message(), "0xabc|5Fvoter|123");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_matches!(
            ClaimMessage::parse("a|b|c|1"),
            Err(ParseClaimError::WrongFieldCount)
        );
        assert_matches!(
            ClaimMessage::parse("a|b|c|1|d|e"),
            Err(ParseClaimError::WrongFieldCount)
        );
        assert_matches!(
            ClaimMessage::parse("a||c|1|d"),
            Err(ParseClaimError::EmptyField)
        );
        assert_matches!(
            ClaimMessage::parse("a|b|c|x|d"),
            Err(ParseClaimError::InvalidBlockNumber)
        );
    }
}
