// SPDX-License-Identifier: MIT

//! Concise Evidence (CoEv).
//!
//! Evidence reuses the triple shapes of CoMID but describes what an attester
//! actually measured rather than what a supplier expects. It is carried
//! under CBOR tag 571.
//!
//! ```text
//! ConciseEvidence (tag 571)
//! ├── ev-triples        (0)
//! │   ├── evidence-triples    (0)  [environment, [+ measurement]]
//! │   ├── identity-triples    (1)  [environment, [+ key]]
//! │   ├── dependency-triples  (2)
//! │   ├── membership-triples  (3)
//! │   ├── coswid-triples      (4)
//! │   ├── attest-key-triples  (5)  [environment, [+ key]]
//! │   └── extensions
//! ├── evidence-id       (1)  UUID
//! ├── profile           (2)
//! └── extensions
//! ```

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Serialize,
};

use crate::{
    cbor::{self, TAG_CONCISE_EVIDENCE},
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    profile::lookup_for_decode,
    CoswidTriple, DomainDependencyTriple, DomainMembershipTriple, Environment, Error,
    ExtensionMap, KeyTriple, Measurement, ProfileId, Result, ResultExt, Uuid, ValueTriple,
};

const EV_TRIPLES_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "evidence-triples"),
    FieldDesc::optional(1, "identity-triples"),
    FieldDesc::optional(2, "dependency-triples"),
    FieldDesc::optional(3, "membership-triples"),
    FieldDesc::optional(4, "coswid-triples"),
    FieldDesc::optional(5, "attest-key-triples"),
];

/// The triple families of a Concise Evidence document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvTriples {
    pub evidence_triples: Vec<ValueTriple>,
    pub identity_triples: Vec<KeyTriple>,
    pub dependency_triples: Vec<DomainDependencyTriple>,
    pub membership_triples: Vec<DomainMembershipTriple>,
    pub coswid_triples: Vec<CoswidTriple>,
    pub attest_key_triples: Vec<KeyTriple>,
    pub extensions: ExtensionMap,
}

impl EvTriples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.evidence_triples.is_empty()
            && self.identity_triples.is_empty()
            && self.dependency_triples.is_empty()
            && self.membership_triples.is_empty()
            && self.coswid_triples.is_empty()
            && self.attest_key_triples.is_empty()
            && self.extensions.is_empty()
    }

    pub fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("no triples"));
        }

        for (i, t) in self.evidence_triples.iter().enumerate() {
            t.valid().with_context(|| format!("evidence triple at index {i}"))?;
        }
        for (i, t) in self.identity_triples.iter().enumerate() {
            t.valid().with_context(|| format!("identity triple at index {i}"))?;
        }
        for (i, t) in self.dependency_triples.iter().enumerate() {
            t.valid().with_context(|| format!("dependency triple at index {i}"))?;
        }
        for (i, t) in self.membership_triples.iter().enumerate() {
            t.valid().with_context(|| format!("membership triple at index {i}"))?;
        }
        for (i, t) in self.coswid_triples.iter().enumerate() {
            t.valid().with_context(|| format!("CoSWID triple at index {i}"))?;
        }
        for (i, t) in self.attest_key_triples.iter().enumerate() {
            t.valid().with_context(|| format!("attestation key triple at index {i}"))?;
        }

        Ok(())
    }
}

impl Serialize for EvTriples {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = EV_TRIPLES_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.non_empty(&f[0], &self.evidence_triples)?;
        map.non_empty(&f[1], &self.identity_triples)?;
        map.non_empty(&f[2], &self.dependency_triples)?;
        map.non_empty(&f[3], &self.membership_triples)?;
        map.non_empty(&f[4], &self.coswid_triples)?;
        map.non_empty(&f[5], &self.attest_key_triples)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for EvTriples {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EvTriplesVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for EvTriplesVisitor {
            type Value = EvTriples;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an evidence triples map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<EvTriples, A::Error> {
                let mut reader = MapReader::new(EV_TRIPLES_FIELDS, self.is_human_readable);
                let mut triples = EvTriples::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => triples.evidence_triples = map.next_value()?,
                        FieldKey::Known(1) => triples.identity_triples = map.next_value()?,
                        FieldKey::Known(2) => triples.dependency_triples = map.next_value()?,
                        FieldKey::Known(3) => triples.membership_triples = map.next_value()?,
                        FieldKey::Known(4) => triples.coswid_triples = map.next_value()?,
                        FieldKey::Known(_) => triples.attest_key_triples = map.next_value()?,
                        FieldKey::Unknown(k) => {
                            reader.extension(&mut map, k, &mut triples.extensions)?
                        }
                    }
                }

                reader.finish()?;
                Ok(triples)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(EvTriplesVisitor { is_human_readable })
    }
}

const EVIDENCE_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "ev-triples"),
    FieldDesc::optional(1, "evidence-id"),
    FieldDesc::optional(2, "profile"),
];

/// A Concise Evidence document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConciseEvidence {
    pub triples: EvTriples,
    pub evidence_id: Option<Uuid>,
    pub profile: Option<ProfileId>,
    pub extensions: ExtensionMap,
}

impl ConciseEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evidence_id(mut self, id: Uuid) -> Self {
        self.evidence_id = Some(id);
        self
    }

    pub fn with_profile(mut self, profile: ProfileId) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn add_evidence(&mut self, environment: Environment, measurements: Vec<Measurement>) -> &mut Self {
        self.triples
            .evidence_triples
            .push(ValueTriple::new(environment, measurements));
        self
    }

    pub fn add_identity_key(&mut self, environment: Environment, keys: Vec<crate::CryptoKey>) -> &mut Self {
        self.triples.identity_triples.push(KeyTriple::new(environment, keys));
        self
    }

    pub fn add_attest_key(&mut self, environment: Environment, keys: Vec<crate::CryptoKey>) -> &mut Self {
        self.triples.attest_key_triples.push(KeyTriple::new(environment, keys));
        self
    }

    /// Structural checks followed by the constraints of the named profile.
    pub fn valid(&self) -> Result<()> {
        crate::validate::Validator::for_profile(self.profile.as_ref()).evidence(self)
    }

    pub(crate) fn valid_structure(&self) -> Result<()> {
        if let Some(profile) = &self.profile {
            profile.valid().context("profile")?;
        }
        self.triples.valid().context("ev-triples")
    }

    /// Tag 571 followed by the evidence map.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = cbor::tag_prefix(TAG_CONCISE_EVIDENCE as u16).to_vec();
        bytes.extend(cbor::to_vec(self)?);
        Ok(bytes)
    }

    /// Decodes evidence with or without its tag and binds the extensions of
    /// its profile.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let body = cbor::strip_tag_prefix(bytes, TAG_CONCISE_EVIDENCE).unwrap_or(bytes);
        let mut evidence: Self = cbor::from_slice(body)?;
        evidence.apply_profile()?;
        Ok(evidence)
    }

    pub fn to_json(&self) -> Result<String> {
        cbor::to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut evidence: Self = cbor::from_json(json)?;
        evidence.apply_profile()?;
        Ok(evidence)
    }

    fn apply_profile(&mut self) -> Result<()> {
        match lookup_for_decode(self.profile.as_ref()) {
            Some(manifest) => manifest.apply_to_evidence(self),
            None => Ok(()),
        }
    }
}

impl Serialize for ConciseEvidence {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = EVIDENCE_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.field(&f[0], &self.triples)?;
        map.optional(&f[1], &self.evidence_id)?;
        map.optional(&f[2], &self.profile)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConciseEvidence {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EvidenceVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for EvidenceVisitor {
            type Value = ConciseEvidence;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a concise evidence map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<ConciseEvidence, A::Error> {
                let mut reader = MapReader::new(EVIDENCE_FIELDS, self.is_human_readable);
                let mut evidence = ConciseEvidence::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => evidence.triples = map.next_value()?,
                        FieldKey::Known(1) => evidence.evidence_id = Some(map.next_value()?),
                        FieldKey::Known(_) => evidence.profile = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            reader.extension(&mut map, k, &mut evidence.extensions)?
                        }
                    }
                }

                reader.finish()?;
                Ok(evidence)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(EvidenceVisitor { is_human_readable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassId, CryptoKey, HashAlgorithm, HashEntry, Mval};
    use hex_literal::hex;

    fn evidence() -> ConciseEvidence {
        let mut evidence = ConciseEvidence::new().with_evidence_id(Uuid::from([0x11; 16]));
        evidence.add_evidence(
            Environment::from_class_id(ClassId::Bytes(vec![0xaa; 4].into())),
            vec![Measurement::new(
                Mval::new().with_digest(HashEntry::new(HashAlgorithm::SHA256, [0x5a; 32])),
            )
            .with_key("BL")],
        );
        evidence
    }

    #[test]
    fn test_evidence_round_trip() {
        let evidence = evidence();
        evidence.valid().unwrap();

        let bytes = evidence.to_cbor().unwrap();
        assert_eq!(&bytes[..3], &hex!("d9 02 3b"));

        let decoded = ConciseEvidence::from_cbor(&bytes).unwrap();
        assert_eq!(decoded, evidence);
        assert_eq!(decoded.to_cbor().unwrap(), bytes);

        let json = evidence.to_json().unwrap();
        assert!(json.starts_with(r#"{"ev-triples":{"evidence-triples":[{"environment":"#));
        assert_eq!(ConciseEvidence::from_json(&json).unwrap(), evidence);
    }

    #[test]
    fn test_untagged_evidence_is_accepted() {
        let evidence = evidence();
        let bytes = cbor::to_vec(&evidence).unwrap();
        assert_eq!(ConciseEvidence::from_cbor(&bytes).unwrap(), evidence);
    }

    #[test]
    fn test_empty_evidence_is_invalid() {
        assert_eq!(
            ConciseEvidence::new().valid().unwrap_err().to_string(),
            "ev-triples: no triples"
        );
    }

    #[test]
    fn test_identity_triple_without_keys() {
        let mut evidence = evidence();
        evidence.add_identity_key(
            Environment::from_class_id(ClassId::Bytes(vec![0xbb].into())),
            vec![],
        );
        assert_eq!(
            evidence.valid().unwrap_err().to_string(),
            "ev-triples, identity triple at index 0: no keys"
        );

        evidence.triples.identity_triples[0]
            .verification_keys
            .push(CryptoKey::Bytes(vec![1, 2, 3].into()));
        evidence.valid().unwrap();
    }

    #[test]
    fn test_unknown_ev_triples_key_is_kept() {
        // 571({0: {0: [...], -1: "x"}})
        let mut evidence = evidence();
        evidence
            .triples
            .extensions
            .insert(-1, ciborium::Value::Text("x".into()).into());

        let bytes = evidence.to_cbor().unwrap();
        let decoded = ConciseEvidence::from_cbor(&bytes).unwrap();
        assert_eq!(decoded.triples.extensions.field_cache().len(), 1);
        assert_eq!(decoded.to_cbor().unwrap(), bytes);
    }
}
