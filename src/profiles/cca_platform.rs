// SPDX-License-Identifier: MIT

//! Arm CCA platform endorsements profile
//! (`tag:arm.com,2025:cca_platform#1.0.0`).
//!
//! Builds on the PSA shapes. A platform reference-value triple lists the
//! firmware components (`cca.software-component`, each with digests and a
//! signer-id) and exactly one `cca.platform-config` measurement carrying the
//! masked configuration blob.

use std::sync::Arc;

use crate::{
    Error, Extension, ExtensionPoint, ExtensionTarget, Mval, ProfileId, ProfileManifest,
    RawValue, Result, ResultExt, Triples, ValueTriple,
};

use super::{each_measurement, implementation_id, signer_id, single_pkix_key, string_key};

pub const PROFILE_ID: &str = "tag:arm.com,2025:cca_platform#1.0.0";

pub const SOFTWARE_COMPONENT: &str = "cca.software-component";
pub const PLATFORM_CONFIG: &str = "cca.platform-config";

fn software_component(mval: &Mval) -> Result<()> {
    if mval.digests.as_ref().map_or(true, Vec::is_empty) {
        return Err(Error::validation("missing digests"));
    }
    signer_id(mval).map(|_| ())
}

fn platform_config(mval: &Mval) -> Result<()> {
    match (&mval.raw_value, &mval.raw_value_mask) {
        (Some(RawValue::Masked { .. }), _) | (Some(RawValue::Bytes(_)), Some(_)) => Ok(()),
        (Some(RawValue::Bytes(_)), None) => Err(Error::validation("missing raw-value-mask")),
        (None, _) => Err(Error::validation("missing raw-value")),
    }
}

fn reference_value(triple: &ValueTriple) -> Result<()> {
    implementation_id(&triple.environment).context("environment")?;

    let mut components = 0;
    let mut configs = 0;

    each_measurement(&triple.measurements, |m| match string_key(m)? {
        SOFTWARE_COMPONENT => {
            components += 1;
            software_component(&m.value)
        }
        PLATFORM_CONFIG => {
            configs += 1;
            platform_config(&m.value)
        }
        other => Err(Error::validation(format!("unexpected measurement key \"{other}\""))),
    })?;

    if components == 0 {
        return Err(Error::validation(format!(
            "at least one {SOFTWARE_COMPONENT} measurement required"
        )));
    }
    if configs != 1 {
        return Err(Error::validation(format!(
            "expected exactly one {PLATFORM_CONFIG} measurement, found {configs}"
        )));
    }

    Ok(())
}

/// Shape rules for CCA platform triples.
pub struct CcaPlatformTriples;

impl Extension for CcaPlatformTriples {
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
    for (i, t) in triples.attest_verif_keys.iter().enumerate() {
        implementation_id(&t.environment)
            .context("environment")
            .and_then(|_| single_pkix_key(t))
            .with_context(|| format!("attestation verification key at index {i}"))?;
    }
    Ok(())
}

pub fn profile_id() -> ProfileId {
    ProfileId::uri(PROFILE_ID)
}

pub fn manifest() -> ProfileManifest {
    ProfileManifest::from_extension(
        profile_id(),
        ExtensionPoint::Triples,
        Arc::new(CcaPlatformTriples),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ClassId, Comid, CryptoKey, Environment, HashAlgorithm, HashEntry, Measurement,
        UnsignedCorim,
    };

    fn component() -> Measurement {
        Measurement::new(
            Mval::new()
                .with_digest(HashEntry::new(HashAlgorithm::SHA256, [0x87; 32]))
                .with_crypto_key(CryptoKey::Bytes(vec![0xac; 32].into())),
        )
        .with_key(SOFTWARE_COMPONENT)
    }

    fn config() -> Measurement {
        Measurement::new(Mval::new().with_raw_value(RawValue::Masked {
            value: vec![0x01, 0x02].into(),
            mask: vec![0xff, 0x00].into(),
        }))
        .with_key(PLATFORM_CONFIG)
    }

    fn comid(measurements: Vec<Measurement>) -> Comid {
        let mut comid = Comid::new("cca-platform");
        comid.add_reference_value(
            Environment::from_class_id(ClassId::Bytes(vec![0x7f; 32].into())),
            measurements,
        );
        comid
    }

    #[test]
    fn test_valid_platform() {
        let mut corim = UnsignedCorim::new("cca").with_profile(profile_id());
        corim.add_comid(comid(vec![component(), component(), config()]));
        corim.valid().unwrap();
    }

    #[test]
    fn test_platform_config_is_required_once() {
        let err = check_triples(&comid(vec![component()]).triples).unwrap_err();
        assert_eq!(
            err.to_string(),
            "reference value at index 0: expected exactly one cca.platform-config measurement, found 0"
        );

        let err = check_triples(&comid(vec![component(), config(), config()]).triples).unwrap_err();
        assert!(err.to_string().ends_with("found 2"));
    }

    #[test]
    fn test_component_needs_signer_id() {
        let mut m = component();
        m.value.crypto_keys = None;
        assert_eq!(
            check_triples(&comid(vec![m, config()]).triples)
                .unwrap_err()
                .to_string(),
            "reference value at index 0, measurement at index 0: missing signer-id crypto-key"
        );
    }

    #[test]
    fn test_config_needs_mask() {
        let m = Measurement::new(Mval::new().with_raw_value(RawValue::Bytes(vec![1].into())))
            .with_key(PLATFORM_CONFIG);
        assert!(check_triples(&comid(vec![component(), m]).triples)
            .unwrap_err()
            .to_string()
            .ends_with("missing raw-value-mask"));
    }

    #[test]
    fn test_unknown_key() {
        let m = component().with_key("cca.other");
        assert!(check_triples(&comid(vec![m, config()]).triples)
            .unwrap_err()
            .to_string()
            .ends_with("unexpected measurement key \"cca.other\""));
    }
}
