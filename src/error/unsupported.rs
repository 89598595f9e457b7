// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum UnsupportedError {
    #[error("unknown {kind} variant {variant}")]
    Variant { kind: String, variant: String },
    #[error("unsupported numeric type {0}")]
    NumericType(String),
    #[error("unsupported hash algorithm {0}")]
    HashAlgorithm(String),
}
