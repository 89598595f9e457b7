// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum RegistrationError {
    #[error("CBOR tag {0} is already registered")]
    DuplicateTag(u64),
    #[error("profile \"{0}\" is already registered")]
    DuplicateProfile(String),
    #[error("profile \"{0}\" is not registered")]
    UnknownProfile(String),
    #[error("unknown extension point \"{0}\"")]
    UnknownExtensionPoint(String),
    #[error("{kind} variant {detail} conflicts with an existing registration")]
    DuplicateVariant { kind: String, detail: String },
    #[error("extension field {key} (\"{name}\") is declared twice at {point}")]
    DuplicateField {
        point: String,
        key: i64,
        name: String,
    },
}
