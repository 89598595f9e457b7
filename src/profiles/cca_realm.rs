// SPDX-License-Identifier: MIT

//! Arm CCA realm endorsements profile (`tag:arm.com,2025:cca_realm#1.0.0`).
//!
//! A realm is identified by its Realm Initial Measurement (RIM), carried as
//! the `bytes` class-id of the reference-value environment. The measurements
//! repeat the RIM (`cca.rim`), list the extensible measurements
//! (`cca.rem0`..`cca.rem3`) and may state the Realm Personalization Value
//! (`cca.rpv`).

use std::sync::Arc;

use crate::{
    ClassId, Error, Extension, ExtensionPoint, ExtensionTarget, ProfileId, ProfileManifest,
    Result, ResultExt, Triples, ValueTriple,
};

use super::{each_measurement, is_hash_len, single_digest, string_key};

pub const PROFILE_ID: &str = "tag:arm.com,2025:cca_realm#1.0.0";

pub const RIM: &str = "cca.rim";
pub const REM: [&str; 4] = ["cca.rem0", "cca.rem1", "cca.rem2", "cca.rem3"];
pub const RPV: &str = "cca.rpv";

fn rim_class_id(triple: &ValueTriple) -> Result<()> {
    match triple.environment.class_id() {
        Some(ClassId::Bytes(b)) if is_hash_len(b.len()) => Ok(()),
        Some(ClassId::Bytes(b)) => Err(Error::validation(format!(
            "RIM must be 32, 48, or 64 bytes, got {}",
            b.len()
        ))),
        Some(other) => Err(Error::validation(format!(
            "RIM class-id must be of type bytes, found {}",
            other.type_name()
        ))),
        None => Err(Error::validation("missing RIM class-id")),
    }
}

fn reference_value(triple: &ValueTriple) -> Result<()> {
    rim_class_id(triple).context("environment")?;

    let mut has_rim = false;
    each_measurement(&triple.measurements, |m| {
        let key = string_key(m)?;
        if key == RIM {
            has_rim = true;
            single_digest(&m.value).map(|_| ())
        } else if REM.contains(&key) {
            single_digest(&m.value).map(|_| ())
        } else if key == RPV {
            match &m.value.raw_value {
                Some(_) => Ok(()),
                None => Err(Error::validation("missing raw-value")),
            }
        } else {
            Err(Error::validation(format!("unexpected measurement key \"{key}\"")))
        }
    })?;

    if !has_rim {
        return Err(Error::validation(format!("missing {RIM} measurement")));
    }
    Ok(())
}

/// Shape rules for CCA realm triples.
pub struct CcaRealmTriples;

impl Extension for CcaRealmTriples {
    fn constrain(&self, target: &ExtensionTarget<'_>) -> Result<()> {
        let ExtensionTarget::Triples(triples) = target else {
            return Ok(());
        };
        check_triples(triples)
    }
}

fn check_triples(triples: &Triples) -> Result<()> {
    for (i, t) in triples.reference_values.iter().enumerate() {
        reference_value(t).with_context(|| format!("reference value at index {i}"))?;
    }
    Ok(())
}

pub fn profile_id() -> ProfileId {
    ProfileId::uri(PROFILE_ID)
}

pub fn manifest() -> ProfileManifest {
    ProfileManifest::from_extension(profile_id(), ExtensionPoint::Triples, Arc::new(CcaRealmTriples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Comid, Environment, HashAlgorithm, HashEntry, Measurement, Mval, RawValue, UnsignedCorim,
    };

    fn digest(key: &str, len: usize) -> Measurement {
        let alg = match len {
            48 => HashAlgorithm::SHA384,
            64 => HashAlgorithm::SHA3_512,
            _ => HashAlgorithm::SHA256,
        };
        Measurement::new(Mval::new().with_digest(HashEntry::new(alg, vec![0x42; len]))).with_key(key)
    }

    fn realm_corim(rim_len: usize) -> UnsignedCorim {
        let mut comid = Comid::new("cca-realm");
        comid.add_reference_value(
            Environment::from_class_id(ClassId::Bytes(vec![0x42; rim_len].into())),
            vec![
                digest(RIM, 48),
                digest(REM[0], 48),
                digest(REM[3], 48),
                Measurement::new(Mval::new().with_raw_value(RawValue::Bytes(vec![0; 64].into())))
                    .with_key(RPV),
            ],
        );

        let mut corim = UnsignedCorim::new("realm").with_profile(profile_id());
        corim.add_comid(comid);
        corim
    }

    #[test]
    fn test_valid_realm() {
        let corim = realm_corim(48);
        corim.valid().unwrap();
        let decoded = UnsignedCorim::from_json(&corim.to_json().unwrap()).unwrap();
        decoded.valid().unwrap();
    }

    #[test]
    fn test_short_rim_is_rejected() {
        let corim = realm_corim(31);
        for comid in corim.comids() {
            comid.valid().unwrap();
        }

        let decoded = UnsignedCorim::from_cbor(&corim.to_cbor().unwrap()).unwrap();
        let err = decoded.valid().unwrap_err().to_string();
        assert!(err.contains("RIM must be 32, 48, or 64 bytes"), "{err}");
        assert_eq!(
            err,
            "tag at index 0, triples, reference value at index 0, environment: \
             RIM must be 32, 48, or 64 bytes, got 31"
        );
    }

    #[test]
    fn test_rim_measurement_is_mandatory() {
        let mut corim = realm_corim(32);
        corim.comids_mut().for_each(|c| {
            c.triples.reference_values[0].measurements.remove(0);
        });
        assert!(corim
            .valid()
            .unwrap_err()
            .to_string()
            .ends_with("missing cca.rim measurement"));
    }

    #[test]
    fn test_rem_needs_single_digest() {
        let mut corim = realm_corim(32);
        corim.comids_mut().for_each(|c| {
            let m = &mut c.triples.reference_values[0].measurements[1];
            m.value.digests = Some(vec![
                HashEntry::new(HashAlgorithm::SHA256, [1; 32]),
                HashEntry::new(HashAlgorithm::SHA256, [2; 32]),
            ]);
        });
        assert!(corim
            .valid()
            .unwrap_err()
            .to_string()
            .ends_with("measurement at index 1: expected exactly one digest, found 2"));
    }
}
