// SPDX-License-Identifier: MIT

//! Arm PSA endorsements profile (`tag:arm.com,2025:psa#1.0.0`).
//!
//! PSA reference values describe software components of a platform
//! identified by its 32-byte implementation id. Each component measurement
//! is keyed by a [`PsaRefValId`] (CBOR tag 601) and carries the component's
//! signer-id as its single `bytes` crypto-key. Attestation verification keys
//! bind one PEM public key to an implementation id plus a 33-byte random
//! UEID instance id.

use std::sync::Arc;

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Serialize,
};

use crate::{
    cbor::{self, TAG_PSA_REFVAL_ID},
    choice::{ChoiceKind, RegisteredChoice, VariantSpec},
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    Bytes, Error, Extension, ExtensionPoint, ExtensionTarget, InstanceId, KeyTriple,
    MeasurementKey, ProfileId, ProfileManifest, Result, ResultExt, Triples, ValueTriple,
};

use super::{each_measurement, implementation_id, is_hash_len, signer_id, single_pkix_key};

pub const PROFILE_ID: &str = "tag:arm.com,2025:psa#1.0.0";

const REFVAL_ID_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(1, "label"),
    FieldDesc::optional(4, "version"),
    FieldDesc::mandatory(5, "signer-id"),
];

/// PSA software component identifier used as a measurement key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsaRefValId {
    pub label: Option<String>,
    pub version: Option<String>,
    pub signer_id: Bytes,
}

impl PsaRefValId {
    pub fn new<B: Into<Bytes>>(signer_id: B) -> Self {
        Self {
            label: None,
            version: None,
            signer_id: signer_id.into(),
        }
    }

    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn valid(&self) -> Result<()> {
        if !is_hash_len(self.signer_id.len()) {
            return Err(Error::validation(format!(
                "signer-id must be 32, 48, or 64 bytes, got {}",
                self.signer_id.len()
            )));
        }
        Ok(())
    }

    /// Wraps this identifier as a measurement key.
    pub fn to_measurement_key(&self) -> Result<MeasurementKey> {
        RegisteredChoice::new(ChoiceKind::MeasurementKey, TAG_PSA_REFVAL_ID, self)
            .map(MeasurementKey::Registered)
    }

    /// The identifier held by a measurement key, if it is one.
    pub fn from_measurement_key(key: &MeasurementKey) -> Option<Result<Self>> {
        match key {
            MeasurementKey::Registered(r) if r.tag == TAG_PSA_REFVAL_ID => Some(r.decode()),
            _ => None,
        }
    }
}

impl Serialize for PsaRefValId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = REFVAL_ID_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&f[0], &self.label)?;
        map.optional(&f[1], &self.version)?;
        map.field(&f[2], &self.signer_id)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for PsaRefValId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct RefValIdVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for RefValIdVisitor {
            type Value = PsaRefValId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a PSA refval-id map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<PsaRefValId, A::Error> {
                let mut reader = MapReader::new(REFVAL_ID_FIELDS, self.is_human_readable);
                let mut id = PsaRefValId::new(Bytes::default());

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(1) => id.label = Some(map.next_value()?),
                        FieldKey::Known(4) => id.version = Some(map.next_value()?),
                        FieldKey::Known(_) => id.signer_id = map.next_value()?,
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected refval-id field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(id)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(RefValIdVisitor { is_human_readable })
    }
}

fn check_refval_id(value: &ciborium::Value) -> Result<()> {
    cbor::from_value::<PsaRefValId>(value.clone())?.valid()
}

/// The `psa.refval-id` measurement-key variant.
pub(crate) fn refval_id_variant() -> VariantSpec {
    VariantSpec::new::<PsaRefValId, _>(TAG_PSA_REFVAL_ID, "psa.refval-id").with_check(check_refval_id)
}

/// Shape rules for PSA triples.
pub struct PsaTriples;

impl PsaTriples {
    fn reference_value(triple: &ValueTriple) -> Result<()> {
        implementation_id(&triple.environment).context("environment")?;

        each_measurement(&triple.measurements, |m| {
            signer_id(&m.value)?;
            if m.value.digests.as_ref().map_or(true, Vec::is_empty) {
                return Err(Error::validation("missing digests"));
            }
            Ok(())
        })
    }

    fn attest_verif_key(triple: &KeyTriple) -> Result<()> {
        implementation_id(&triple.environment).context("environment")?;
        instance_id(triple.environment.instance.as_ref()).context("environment")?;
        single_pkix_key(triple)
    }
}

/// The instance id of a PSA device: a 33-byte RAND UEID.
fn instance_id(instance: Option<&InstanceId>) -> Result<()> {
    match instance {
        Some(InstanceId::Ueid(ueid)) if ueid.0.len() == 33 && ueid.0[0] == 0x01 => Ok(()),
        Some(InstanceId::Ueid(ueid)) => Err(Error::validation(format!(
            "instance id must be a 33-byte UEID starting with 0x01, got {} bytes",
            ueid.0.len()
        ))),
        Some(other) => Err(Error::validation(format!(
            "instance id must be of type ueid, found {}",
            other.type_name()
        ))),
        None => Err(Error::validation("missing instance id")),
    }
}

impl Extension for PsaTriples {
    fn constrain(&self, target: &ExtensionTarget<'_>) -> Result<()> {
        let ExtensionTarget::Triples(triples) = target else {
            return Ok(());
        };
        check_triples(triples)
    }
}

fn check_triples(triples: &Triples) -> Result<()> {
    for (i, t) in triples.reference_values.iter().enumerate() {
        PsaTriples::reference_value(t).with_context(|| format!("reference value at index {i}"))?;
    }
    for (i, t) in triples.attest_verif_keys.iter().enumerate() {
        PsaTriples::attest_verif_key(t)
            .with_context(|| format!("attestation verification key at index {i}"))?;
    }
    Ok(())
}

pub fn profile_id() -> ProfileId {
    ProfileId::uri(PROFILE_ID)
}

pub fn manifest() -> ProfileManifest {
    ProfileManifest::from_extension(profile_id(), ExtensionPoint::Triples, Arc::new(PsaTriples))
        .with_variant(ChoiceKind::MeasurementKey, refval_id_variant())
}
