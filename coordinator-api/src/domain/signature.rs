// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signature verification for both identity systems: sr25519 over SS58 subnet addresses and
//! EIP-191 personal-sign over EVM accounts.

use alloy::primitives::{Address, Signature as EvmSignature};
use sp_core::{
    Pair as _,
    crypto::{Ss58AddressFormat, Ss58Codec},
    sr25519,
};
use thiserror::Error;

/// The subnet uses the generic substrate SS58 prefix.
pub const SS58_PREFIX: u16 = 42;

/// Marker bytes of the raw-bytes signature framing produced by some wallet extensions.
const RAW_SIGNATURE_MARKER: [u8; 2] = [0x01, 0x01];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed address")]
    MalformedAddress,

    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature verification failed")]
    Invalid,
}

/// Verify an sr25519 signature over `message` for the SS58 `address`.
///
/// Two framings are accepted: when the signature payload starts with the `0x01 0x01` marker,
/// those four hex characters are stripped, the remainder must be exactly 64 bytes and is
/// verified against the raw-byte form of the message (hex-decoded when the message itself is
/// 0x-hex); otherwise the string form is verified. Both framings also accept the
/// `<Bytes>…</Bytes>` wrapping applied by browser signers.
pub fn verify_substrate(
    message: &str,
    signature: &str,
    address: &str,
) -> Result<(), SignatureError> {
    let (public, format) = sr25519::Public::from_ss58check_with_version(address)
        .map_err(|_| SignatureError::MalformedAddress)?;
    if format != Ss58AddressFormat::custom(SS58_PREFIX)
        || public.to_ss58check_with_version(Ss58AddressFormat::custom(SS58_PREFIX)) != address
    {
        return Err(SignatureError::MalformedAddress);
    }

    let signature_hex = signature.strip_prefix("0x").unwrap_or(signature);
    let signature_bytes =
        hex::decode(signature_hex).map_err(|_| SignatureError::MalformedSignature)?;

    let (payload_bytes, raw_framing) =
        if signature_bytes.len() > 2 && signature_bytes[..2] == RAW_SIGNATURE_MARKER {
            (&signature_bytes[2..], true)
        } else {
            (&signature_bytes[..], false)
        };
    let payload_bytes: [u8; 64] = payload_bytes
        .try_into()
        .map_err(|_| SignatureError::MalformedSignature)?;
    let signature = sr25519::Signature::from_raw(payload_bytes);

    let message_bytes = if raw_framing {
        match message.strip_prefix("0x") {
            Some(hex_message) => {
                hex::decode(hex_message).map_err(|_| SignatureError::MalformedSignature)?
            }
            None => message.as_bytes().to_vec(),
        }
    } else {
        message.as_bytes().to_vec()
    };

    let verified = sr25519::Pair::verify(&signature, &message_bytes, &public)
        || sr25519::Pair::verify(&signature, wrap_bytes(&message_bytes), &public);

    if verified {
        Ok(())
    } else {
        Err(SignatureError::Invalid)
    }
}

/// Verify an EIP-191 personal-sign signature over `message` for the EVM `address`
/// (case-insensitive).
pub fn verify_evm(message: &str, signature: &str, address: &str) -> Result<(), SignatureError> {
    let expected = address
        .parse::<Address>()
        .map_err(|_| SignatureError::MalformedAddress)?;

    let signature_hex = signature.strip_prefix("0x").unwrap_or(signature);
    let signature_bytes =
        hex::decode(signature_hex).map_err(|_| SignatureError::MalformedSignature)?;
    let signature = EvmSignature::try_from(signature_bytes.as_slice())
        .map_err(|_| SignatureError::MalformedSignature)?;

    let recovered = signature
        .recover_address_from_msg(message)
        .map_err(|_| SignatureError::Invalid)?;

    if recovered == expected {
        Ok(())
    } else {
        Err(SignatureError::Invalid)
    }
}

fn wrap_bytes(payload: &[u8]) -> Vec<u8> {
    let mut wrapped = Vec::with_capacity(payload.len() + 15);
    wrapped.extend_from_slice(b"<Bytes>");
    wrapped.extend_from_slice(payload);
    wrapped.extend_from_slice(b"</Bytes>");
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::{SignerSync, local::PrivateKeySigner};
    use assert_matches::assert_matches;
    use sp_core::Pair;

    fn test_pair() -> (sr25519::Pair, String) {
        let pair = sr25519::Pair::from_string("//Alice", None).expect("dev pair can be derived");
        let address = pair
            .public()
            .to_ss58check_with_version(Ss58AddressFormat::custom(SS58_PREFIX));
        (pair, address)
    }

    #[test]
    fn test_verify_substrate() {
        let (pair, address) = test_pair();
        let message = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa,1|42";
        let signature = hex::encode(pair.sign(message.as_bytes()));

        assert!(verify_substrate(message, &signature, &address).is_ok());
        assert!(verify_substrate(message, &format!("0x{signature}"), &address).is_ok());
    }

    #[test]
    fn test_verify_substrate_wrapped_payload() {
        let (pair, address) = test_pair();
        let message = "hello";
        let wrapped = format!("<Bytes>{message}</Bytes>");
        let signature = hex::encode(pair.sign(wrapped.as_bytes()));

        assert!(verify_substrate(message, &signature, &address).is_ok());
    }

    #[test]
    fn test_verify_substrate_raw_framing() {
        let (pair, address) = test_pair();
        let message = "hello";
        let signature = format!("0101{}", hex::encode(pair.sign(message.as_bytes())));

        assert!(verify_substrate(message, &signature, &address).is_ok());
    }

    #[test]
    fn test_verify_substrate_rejects_tampering() {
        let (pair, address) = test_pair();
        let signature = hex::encode(pair.sign(b"message"));

        assert_matches!(
            verify_substrate("other message", &signature, &address),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn test_verify_substrate_rejects_foreign_prefix() {
        let (pair, _) = test_pair();
        let message = "message";
        let signature = hex::encode(pair.sign(message.as_bytes()));
        let polkadot_address = pair
            .public()
            .to_ss58check_with_version(Ss58AddressFormat::custom(0));

        assert_matches!(
            verify_substrate(message, &signature, &polkadot_address),
            Err(SignatureError::MalformedAddress)
        );
    }

    #[test]
    fn test_verify_substrate_rejects_short_signature() {
        let (_, address) = test_pair();
        assert_matches!(
            verify_substrate("message", "0101abcdef", &address),
            Err(SignatureError::MalformedSignature)
        );
    }

    #[test]
    fn test_verify_evm() {
        let signer = PrivateKeySigner::random();
        let message = "0xabc|5Fvoter|123";
        let signature = signer
            .sign_message_sync(message.as_bytes())
            .expect("message can be signed");
        let signature = hex::encode(signature.as_bytes());

        let address = format!("{:#x}", signer.address());
        assert!(verify_evm(message, &signature, &address).is_ok());
        // Case-insensitive comparison.
        assert!(verify_evm(message, &signature, &address.to_uppercase().replace("0X", "0x")).is_ok());
    }

    #[test]
    fn test_verify_evm_rejects_wrong_signer() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let message = "message";
        let signature = signer
            .sign_message_sync(message.as_bytes())
            .expect("message can be signed");
        let signature = hex::encode(signature.as_bytes());

        assert_matches!(
            verify_evm(message, &signature, &format!("{:#x}", other.address())),
            Err(SignatureError::Invalid)
        );
    }
}
