// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Raised when a value cannot be encoded, e.g. an extension entry that only
/// carries a JSON name and no CBOR key.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("marshal error: {0}")]
pub struct MarshalError(pub String);
