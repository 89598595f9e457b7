// SPDX-License-Identifier: MIT

//! Built-in profiles.
//!
//! | Profile | Identifier |
//! |---|---|
//! | [`psa`] | `tag:arm.com,2025:psa#1.0.0` |
//! | [`cca_platform`] | `tag:arm.com,2025:cca_platform#1.0.0` |
//! | [`cca_realm`] | `tag:arm.com,2025:cca_realm#1.0.0` |
//! | [`tdx`] | `2.16.840.1.113741.1.16.1` |
//!
//! All four are registered the first time the profile registry is used.

pub mod cca_platform;
pub mod cca_realm;
pub mod psa;
pub mod tdx;

use std::collections::HashMap;

use crate::{
    choice::{ChoiceKind, VariantSpec},
    Bytes, ClassId, CryptoKey, Environment, Error, HashEntry, KeyTriple, Measurement, Mval,
    ProfileManifest, Result, ResultExt,
};

/// Choice variants introduced by the built-in profiles.
pub(crate) fn builtin_variants() -> HashMap<ChoiceKind, Vec<VariantSpec>> {
    let mut variants: HashMap<ChoiceKind, Vec<VariantSpec>> = HashMap::new();
    variants
        .entry(ChoiceKind::MeasurementKey)
        .or_default()
        .push(psa::refval_id_variant());
    variants
}

pub(crate) fn builtin_profiles() -> Vec<ProfileManifest> {
    vec![
        psa::manifest(),
        cca_platform::manifest(),
        cca_realm::manifest(),
        tdx::manifest(),
    ]
}

/// Lengths of the SHA-2 family digests the Arm profiles accept.
fn is_hash_len(len: usize) -> bool {
    matches!(len, 32 | 48 | 64)
}

/// The 32-byte implementation id carried as the class-id of Arm platform
/// environments.
fn implementation_id(environment: &Environment) -> Result<&Bytes> {
    match environment.class_id() {
        Some(ClassId::Bytes(b)) if b.len() == 32 => Ok(b),
        Some(ClassId::Bytes(b)) => Err(Error::validation(format!(
            "implementation id must be 32 bytes, got {}",
            b.len()
        ))),
        Some(other) => Err(Error::validation(format!(
            "implementation id must be of type bytes, found {}",
            other.type_name()
        ))),
        None => Err(Error::validation("missing implementation id")),
    }
}

/// The signer-id of a software component: exactly one `bytes` crypto-key.
fn signer_id(mval: &Mval) -> Result<&Bytes> {
    let keys = match mval.crypto_keys.as_deref() {
        None | Some([]) => return Err(Error::validation("missing signer-id crypto-key")),
        Some([key]) => key,
        Some(keys) => {
            return Err(Error::validation(format!(
                "expected exactly one signer-id crypto-key, found {}",
                keys.len()
            )))
        }
    };

    match keys {
        CryptoKey::Bytes(b) if is_hash_len(b.len()) => Ok(b),
        CryptoKey::Bytes(b) => Err(Error::validation(format!(
            "signer-id must be 32, 48, or 64 bytes, got {}",
            b.len()
        ))),
        other => Err(Error::validation(format!(
            "signer-id crypto-key must be of type bytes, found {}",
            other.type_name()
        ))),
    }
}

/// Exactly one digest, of a SHA-2 length.
fn single_digest(mval: &Mval) -> Result<&HashEntry> {
    match mval.digests.as_deref() {
        Some([digest]) if is_hash_len(digest.value.len()) => Ok(digest),
        Some([digest]) => Err(Error::validation(format!(
            "digest must be 32, 48, or 64 bytes, got {}",
            digest.value.len()
        ))),
        Some(digests) if !digests.is_empty() => Err(Error::validation(format!(
            "expected exactly one digest, found {}",
            digests.len()
        ))),
        _ => Err(Error::validation("missing digests")),
    }
}

/// The verification key of an attestation key triple must be one PEM public
/// key.
fn single_pkix_key(triple: &KeyTriple) -> Result<()> {
    match triple.verification_keys.as_slice() {
        [CryptoKey::PkixBase64Key(_)] => Ok(()),
        [other] => Err(Error::validation(format!(
            "verification key must be of type pkix-base64-key, found {}",
            other.type_name()
        ))),
        keys => Err(Error::validation(format!(
            "expected exactly one verification key, found {}",
            keys.len()
        ))),
    }
}

/// The text key of a measurement.
fn string_key(measurement: &Measurement) -> Result<&str> {
    match &measurement.key {
        Some(key) => key.as_str().ok_or_else(|| {
            Error::validation(format!(
                "measurement key must be of type string, found {}",
                key.type_name()
            ))
        }),
        None => Err(Error::validation("missing measurement key")),
    }
}

/// Runs `check` on every measurement of a triple, with index context.
fn each_measurement<F>(measurements: &[Measurement], mut check: F) -> Result<()>
where
    F: FnMut(&Measurement) -> Result<()>,
{
    measurements
        .iter()
        .enumerate()
        .try_for_each(|(i, m)| check(m).with_context(|| format!("measurement at index {i}")))
}
