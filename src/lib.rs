// SPDX-License-Identifier: MIT

//! # rats-corim
//!
//! Concise Reference Integrity Manifests (CoRIM) and the documents that
//! travel with them:
//! - CoRIM manifests, unsigned and wrapped in COSE_Sign1
//! - CoMID tags (Concise Module Identifiers)
//! - Concise Evidence
//!
//! Every type has two encodings. The CBOR form is the normative one and is
//! always written deterministically (shortest integers, sorted map keys). The
//! JSON form is meant for humans and tooling; choice types appear in it as
//! `{"type": ..., "value": ...}` envelopes.
//!
//! Documents may name a profile. A profile declares extension fields at
//! well-known points of the data model and adds validation rules on top of
//! the base model; see [`ProfileManifest`] and the built-in ones under
//! [`profiles`].
//!
//! Vectors in this library that the data model requires to be non-empty are
//! checked by the `valid()` methods, not by the type system.

/// Deterministic CBOR and JSON codecs, and the CBOR tag registry
pub mod cbor;

/// Tagged choices and the variant registry
pub mod choice;

/// CoMID tag types and structures
pub mod comid;

/// Core types and utilities used across the library
pub mod core;

/// CoRIM manifest types and structures
pub mod corim;

/// COSE_Sign1 envelope for CoRIM manifests
pub mod cose;

/// Concise Evidence types
pub mod evidence;

/// Numeric and set expressions used by profiles
pub mod expressions;

/// Extension fields and extension points
pub mod extensions;

/// Map codec helpers shared by the map-shaped types
pub(crate) mod fields;

/// Crypto keys and certificates
pub mod keys;

/// Measurements and measurement values
pub mod measurement;

/// OpenSSL backed signer and verifier
pub mod openssl;

/// Profile identifiers, manifests and the profile registry
pub mod profile;

/// Built-in profiles
pub mod profiles;

/// Triple types used in CoMID tags
pub mod triples;

/// Profile-aware validation
pub mod validate;

/// Fixed Bytes Arrays
pub mod fixed_bytes;

/// Macros for easier implementation definitions.
pub(crate) mod macros;

/// Errors for easily handling problems.
pub mod error;

/// Custom CoRIM Results.
pub mod result;

/// Provides the Empty Trait.
pub mod empty;

/// Test utilities
#[cfg(test)]
pub(crate) mod test;

pub use choice::*;
pub use comid::*;
pub use self::core::*;
pub use corim::*;
pub use cose::*;
pub use empty::*;
pub use error::*;
pub use evidence::*;
pub use expressions::*;
pub use extensions::*;
pub use fixed_bytes::*;
pub use keys::*;
pub use measurement::*;
pub use self::openssl::*;
pub use profile::*;
pub use result::*;
pub use triples::*;
pub use validate::*;
