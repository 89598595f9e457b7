// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum SignatureError {
    #[error("COSE algorithm missing from protected header")]
    MissingAlgorithm,
    #[error("COSE algorithm must be an integer, found {0}")]
    NonIntegerAlgorithm(String),
    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("kid missing from protected header")]
    MissingKid,
    #[error("meta missing from protected header")]
    MissingMeta,
    #[error("no signature to verify; decode a signed CoRIM first")]
    NotSigned,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("key error: {0}")]
    Key(String),
    #[error("verification error")]
    Verification,
}

impl From<openssl::error::ErrorStack> for SignatureError {
    fn from(value: openssl::error::ErrorStack) -> Self {
        Self::Key(value.to_string())
    }
}
