// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("malformed {format}: {detail}")]
    Malformed { format: &'static str, detail: String },
    #[error("missing mandatory field \"{name}\" ({key})")]
    MissingField { name: String, key: i64 },
    #[error("duplicate map key {0}")]
    DuplicateKey(String),
    #[error("expected CBOR tag {expected}, found {found}")]
    TagMismatch { expected: u64, found: String },
    #[error("content-type mismatch: expected \"{expected}\", found \"{found}\"")]
    ContentType { expected: String, found: String },
    #[error("{location}: {detail}")]
    Invalid { location: String, detail: String },
}

impl ParseError {
    pub fn cbor<D: std::fmt::Display>(detail: D) -> Self {
        Self::Malformed {
            format: "CBOR",
            detail: detail.to_string(),
        }
    }

    pub fn json<D: std::fmt::Display>(detail: D) -> Self {
        Self::Malformed {
            format: "JSON",
            detail: detail.to_string(),
        }
    }

    pub fn invalid<L: Into<String>, D: std::fmt::Display>(location: L, detail: D) -> Self {
        Self::Invalid {
            location: location.into(),
            detail: detail.to_string(),
        }
    }
}
