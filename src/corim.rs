// SPDX-License-Identifier: MIT

//! # Concise Reference Integrity Manifest (CoRIM) Implementation
//!
//! An unsigned CoRIM bundles tags (CoMID, CoSWID, CoTS), the entities
//! responsible for the manifest, an optional profile identifier and an
//! optional validity period. On the wire it is preceded by CBOR tag 501.
//! The signed form wraps its encoding in COSE_Sign1 (see [`crate::cose`]).
//!
//! ## Data Model
//!
//! ```text
//! UnsignedCorim (tag 501)
//! ├── id                (0)
//! ├── tags              (1)  506 CoMID | 505 CoSWID | 508 CoTS
//! ├── dependent-rims    (2)  Locator { href, thumbprint }
//! ├── profile           (3)  URI (tag 32) | OID (tag 111)
//! ├── rim-validity      (4)
//! ├── entities          (5)
//! └── extensions
//!
//! Meta (COSE protected header 8)
//! ├── signer            (0)  Signer { name, uri } + extensions
//! └── signature-validity (1)
//! ```
//!
//! Decoding binds the extension entries of a document to the fields of the
//! profile it names, when that profile is registered.
//!
//! ## Example Usage
//!
//! ```rust
//! use rats_corim::{Comid, CryptoKey, Environment, InstanceId, UnsignedCorim, Uuid};
//!
//! let mut comid = Comid::new("vendor.example/prod/1");
//! comid.add_attest_verif_key(
//!     Environment::new().with_instance(InstanceId::Uuid(Uuid::from([0x31; 16]))),
//!     vec![CryptoKey::Bytes(vec![0xcc; 4].into())],
//! );
//!
//! let mut corim = UnsignedCorim::new("test corim id");
//! corim.add_comid(comid);
//!
//! let bytes = corim.to_cbor().unwrap();
//! assert_eq!(&bytes[..3], &[0xd9, 0x01, 0xf5]);
//! assert_eq!(UnsignedCorim::from_cbor(&bytes).unwrap(), corim);
//! ```

use ciborium::Value;
use serde::{
    de::{MapAccess, Visitor},
    ser, Deserialize, Serialize,
};

use crate::{
    cbor::{self, TAG_COMID, TAG_COSWID, TAG_COTS, TAG_LEGACY_CORIM, TAG_UNSIGNED_CORIM},
    choice::{de_error, from_json, serialize_envelope, split_envelope, Peeked},
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    profile::lookup_for_decode,
    Bytes, Comid, CorimEntity, CorimRole, EntityName, Error, ExtensionMap, HashEntry, ParseError,
    ProfileId, ProfileManifest, Result, ResultExt, TagId, TaggedUri, UnsupportedError, Validity,
};

/// A tag carried by a CoRIM.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Comid(Box<Comid>),
    /// Opaque CoSWID body
    Coswid(Bytes),
    /// Opaque CoTS body
    Cots(Bytes),
}

impl Tag {
    pub fn number(&self) -> u64 {
        match self {
            Self::Comid(_) => TAG_COMID,
            Self::Coswid(_) => TAG_COSWID,
            Self::Cots(_) => TAG_COTS,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Comid(_) => "comid",
            Self::Coswid(_) => "coswid",
            Self::Cots(_) => "cots",
        }
    }

    pub fn as_comid(&self) -> Option<&Comid> {
        match self {
            Self::Comid(c) => Some(c),
            _ => None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Comid(comid) => comid.valid(),
            Self::Coswid(body) | Self::Cots(body) if body.is_empty() => {
                Err(Error::validation(format!("empty {} body", self.type_name())))
            }
            _ => Ok(()),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        match peeked {
            Peeked::Cbor(Value::Tag(tag, inner)) => {
                let Value::Bytes(body) = *inner else {
                    return Err(ParseError::invalid(
                        format!("tag {tag}"),
                        "body must be a byte string",
                    )
                    .into());
                };
                match tag {
                    TAG_COMID => Comid::from_cbor(&body).map(|c| Self::Comid(Box::new(c))),
                    TAG_COSWID => Ok(Self::Coswid(body.into())),
                    TAG_COTS => Ok(Self::Cots(body.into())),
                    other => Err(UnsupportedError::Variant {
                        kind: "concise-tag".to_string(),
                        variant: format!("tag {other}"),
                    }
                    .into()),
                }
            }
            Peeked::Cbor(_) => Err(ParseError::cbor("a CoRIM tag must be a tagged byte string").into()),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "comid" => Ok(Self::Comid(Box::new(from_json(value)?))),
                    "coswid" => Ok(Self::Coswid(from_json(value)?)),
                    "cots" => Ok(Self::Cots(from_json(value)?)),
                    other => Err(UnsupportedError::Variant {
                        kind: "concise-tag".to_string(),
                        variant: format!("\"{other}\""),
                    }
                    .into()),
                }
            }
        }
    }
}

impl From<Comid> for Tag {
    fn from(value: Comid) -> Self {
        Self::Comid(Box::new(value))
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            return match self {
                Self::Comid(comid) => serialize_envelope(serializer, self.type_name(), comid),
                Self::Coswid(body) | Self::Cots(body) => {
                    serialize_envelope(serializer, self.type_name(), body)
                }
            };
        }

        let body = match self {
            Self::Comid(comid) => cbor::to_vec(comid).map_err(ser::Error::custom)?,
            Self::Coswid(body) | Self::Cots(body) => body.0.clone(),
        };
        Value::Tag(self.number(), Box::new(Value::Bytes(body))).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

/// Thumbprints inside a locator use `:` between algorithm and value in
/// JSON.
struct LocatorThumbprint<'a>(&'a HashEntry);

impl Serialize for LocatorThumbprint<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_text(':'))
        } else {
            self.0.serialize(serializer)
        }
    }
}

const LOCATOR_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "href"),
    FieldDesc::optional(1, "thumbprint"),
];

/// Where to find a dependent RIM, and optionally its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub href: TaggedUri,
    pub thumbprint: Option<HashEntry>,
}

impl Locator {
    pub fn new<U: Into<String>>(href: U, thumbprint: Option<HashEntry>) -> Self {
        Self {
            href: TaggedUri::new(href),
            thumbprint,
        }
    }

    pub fn valid(&self) -> Result<()> {
        self.href.valid().context("href")?;
        if let Some(thumbprint) = &self.thumbprint {
            thumbprint.valid().context("thumbprint")?;
        }
        Ok(())
    }
}

impl Serialize for Locator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&LOCATOR_FIELDS[0], &self.href)?;
        map.optional(&LOCATOR_FIELDS[1], &self.thumbprint.as_ref().map(LocatorThumbprint))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct LocatorVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for LocatorVisitor {
            type Value = Locator;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a locator map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Locator, A::Error> {
                let mut reader = MapReader::new(LOCATOR_FIELDS, self.is_human_readable);
                let mut locator = Locator::new("", None);

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => locator.href = map.next_value()?,
                        FieldKey::Known(_) => locator.thumbprint = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected locator field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(locator)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(LocatorVisitor { is_human_readable })
    }
}

const SIGNER_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "name"),
    FieldDesc::optional(1, "uri"),
];

/// The entity that signed a CoRIM.
#[derive(Debug, Clone, PartialEq)]
pub struct Signer {
    pub name: EntityName,
    pub uri: Option<TaggedUri>,
    pub extensions: ExtensionMap,
}

impl Signer {
    pub fn new<N: Into<EntityName>>(name: N) -> Self {
        Self {
            name: name.into(),
            uri: None,
            extensions: ExtensionMap::new(),
        }
    }

    pub fn with_uri<U: Into<String>>(mut self, uri: U) -> Self {
        self.uri = Some(TaggedUri::new(uri));
        self
    }

    pub fn valid(&self) -> Result<()> {
        self.name.valid()?;
        if let Some(uri) = &self.uri {
            uri.valid().context("uri")?;
        }
        Ok(())
    }
}

impl Serialize for Signer {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&SIGNER_FIELDS[0], &self.name)?;
        map.optional(&SIGNER_FIELDS[1], &self.uri)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Signer {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct SignerVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for SignerVisitor {
            type Value = Signer;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a signer map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Signer, A::Error> {
                let mut reader = MapReader::new(SIGNER_FIELDS, self.is_human_readable);
                let mut signer = Signer::new("");

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => signer.name = map.next_value()?,
                        FieldKey::Known(_) => signer.uri = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            reader.extension(&mut map, k, &mut signer.extensions)?
                        }
                    }
                }

                reader.finish()?;
                Ok(signer)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(SignerVisitor { is_human_readable })
    }
}

const META_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "signer"),
    FieldDesc::optional(1, "validity"),
];

/// Signature metadata carried in the COSE protected header.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub signer: Signer,
    pub validity: Option<Validity>,
}

impl Meta {
    pub fn new(signer: Signer) -> Self {
        Self {
            signer,
            validity: None,
        }
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn valid(&self) -> Result<()> {
        self.signer.valid().context("signer")?;
        if let Some(validity) = &self.validity {
            validity.valid().context("validity")?;
        }
        Ok(())
    }
}

impl Serialize for Meta {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&META_FIELDS[0], &self.signer)?;
        map.optional(&META_FIELDS[1], &self.validity)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Meta {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct MetaVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for MetaVisitor {
            type Value = Meta;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a CoRIM meta map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Meta, A::Error> {
                let mut reader = MapReader::new(META_FIELDS, self.is_human_readable);
                let mut meta = Meta::new(Signer::new(""));

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => meta.signer = map.next_value()?,
                        FieldKey::Known(_) => meta.validity = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected meta field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(meta)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(MetaVisitor { is_human_readable })
    }
}

const CORIM_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "corim-id"),
    FieldDesc::mandatory(1, "tags"),
    FieldDesc::optional(2, "dependent-rims"),
    FieldDesc::optional(3, "profile"),
    FieldDesc::optional(4, "rim-validity"),
    FieldDesc::optional(5, "entities"),
];

/// An unsigned CoRIM.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedCorim {
    pub id: TagId,
    pub tags: Vec<Tag>,
    pub dependent_rims: Vec<Locator>,
    pub profile: Option<ProfileId>,
    pub rim_validity: Option<Validity>,
    pub entities: Vec<CorimEntity>,
    pub extensions: ExtensionMap,
}

impl UnsignedCorim {
    pub fn new<T: Into<TagId>>(id: T) -> Self {
        Self {
            id: id.into(),
            tags: vec![],
            dependent_rims: vec![],
            profile: None,
            rim_validity: None,
            entities: vec![],
            extensions: ExtensionMap::new(),
        }
    }

    pub fn with_profile(mut self, profile: ProfileId) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.rim_validity = Some(validity);
        self
    }

    pub fn add_comid(&mut self, comid: Comid) -> &mut Self {
        self.tags.push(Tag::Comid(Box::new(comid)));
        self
    }

    pub fn add_coswid<B: Into<Bytes>>(&mut self, body: B) -> &mut Self {
        self.tags.push(Tag::Coswid(body.into()));
        self
    }

    pub fn add_cots<B: Into<Bytes>>(&mut self, body: B) -> &mut Self {
        self.tags.push(Tag::Cots(body.into()));
        self
    }

    pub fn add_entity<N: Into<EntityName>>(
        &mut self,
        name: N,
        regid: Option<TaggedUri>,
        roles: Vec<CorimRole>,
    ) -> &mut Self {
        self.entities.push(CorimEntity::new(name, regid, roles));
        self
    }

    pub fn add_dependent_rim<U: Into<String>>(
        &mut self,
        href: U,
        thumbprint: Option<HashEntry>,
    ) -> &mut Self {
        self.dependent_rims.push(Locator::new(href, thumbprint));
        self
    }

    pub fn comids(&self) -> impl Iterator<Item = &Comid> {
        self.tags.iter().filter_map(Tag::as_comid)
    }

    pub fn comids_mut(&mut self) -> impl Iterator<Item = &mut Comid> {
        self.tags.iter_mut().filter_map(|t| match t {
            Tag::Comid(c) => Some(c.as_mut()),
            _ => None,
        })
    }

    /// The registered manifest of the profile this CoRIM names.
    pub fn profile_manifest(&self) -> Option<std::sync::Arc<ProfileManifest>> {
        self.profile.as_ref().and_then(crate::get_profile_manifest)
    }

    /// Structural checks of the whole tree, followed by the constraints of
    /// the CoRIM's profile when it is registered.
    pub fn valid(&self) -> Result<()> {
        crate::validate::Validator::for_profile(self.profile.as_ref()).corim(self)
    }

    /// Structural checks only.
    pub(crate) fn valid_structure(&self) -> Result<()> {
        self.id.valid().context("corim-id")?;

        if self.tags.is_empty() {
            return Err(Error::validation("no tags"));
        }
        for (i, tag) in self.tags.iter().enumerate() {
            tag.valid().with_context(|| format!("tag at index {i}"))?;
        }

        for (i, locator) in self.dependent_rims.iter().enumerate() {
            locator
                .valid()
                .with_context(|| format!("dependent RIM at index {i}"))?;
        }

        if let Some(profile) = &self.profile {
            profile.valid().context("profile")?;
        }

        if let Some(validity) = &self.rim_validity {
            validity.valid().context("validity")?;
        }

        for (i, entity) in self.entities.iter().enumerate() {
            entity.valid().with_context(|| format!("entity at index {i}"))?;
        }

        Ok(())
    }

    /// Tag 501 followed by the CoRIM map.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = cbor::tag_prefix(TAG_UNSIGNED_CORIM as u16).to_vec();
        bytes.extend(cbor::to_vec(self)?);
        Ok(bytes)
    }

    /// Decodes a CoRIM (tag 501, legacy tag 500 or no tag) and binds the
    /// extensions of its profile.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let body = cbor::strip_tag_prefix(bytes, TAG_UNSIGNED_CORIM)
            .or_else(|| cbor::strip_tag_prefix(bytes, TAG_LEGACY_CORIM))
            .unwrap_or(bytes);

        let mut corim: Self = cbor::from_slice(body)?;
        corim.apply_profile()?;
        Ok(corim)
    }

    pub fn to_json(&self) -> Result<String> {
        cbor::to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut corim: Self = cbor::from_json(json)?;
        corim.apply_profile()?;
        Ok(corim)
    }

    fn apply_profile(&mut self) -> Result<()> {
        match lookup_for_decode(self.profile.as_ref()) {
            Some(manifest) => manifest.apply_to_corim(self),
            None => Ok(()),
        }
    }
}

impl Serialize for UnsignedCorim {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = CORIM_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.field(&f[0], &self.id)?;
        map.field(&f[1], &self.tags)?;
        map.non_empty(&f[2], &self.dependent_rims)?;
        map.optional(&f[3], &self.profile)?;
        map.optional(&f[4], &self.rim_validity)?;
        map.non_empty(&f[5], &self.entities)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for UnsignedCorim {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct CorimVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for CorimVisitor {
            type Value = UnsignedCorim;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a CoRIM map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<UnsignedCorim, A::Error> {
                let mut reader = MapReader::new(CORIM_FIELDS, self.is_human_readable);
                let mut corim = UnsignedCorim::new("");

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => corim.id = map.next_value()?,
                        FieldKey::Known(1) => corim.tags = map.next_value()?,
                        FieldKey::Known(2) => corim.dependent_rims = map.next_value()?,
                        FieldKey::Known(3) => corim.profile = Some(map.next_value()?),
                        FieldKey::Known(4) => corim.rim_validity = Some(map.next_value()?),
                        FieldKey::Known(_) => corim.entities = map.next_value()?,
                        FieldKey::Unknown(k) => {
                            reader.extension(&mut map, k, &mut corim.extensions)?
                        }
                    }
                }

                reader.finish()?;
                Ok(corim)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(CorimVisitor { is_human_readable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        register_profile, test, unregister_profile, ExtensionField, ExtensionPoint, FieldExtension,
        FieldKind, HashAlgorithm, Time,
    };
    use hex_literal::hex;
    use std::sync::Arc;

    #[test]
    fn test_minimal_corim_round_trip() {
        let corim = test::minimal_corim();
        corim.valid().unwrap();

        let bytes = corim.to_cbor().unwrap();
        assert_eq!(&bytes[..3], &hex!("d9 01 f5"));

        let decoded = UnsignedCorim::from_cbor(&bytes).unwrap();
        decoded.valid().unwrap();
        assert_eq!(decoded, corim);
        assert_eq!(decoded.to_cbor().unwrap(), bytes);

        let json = corim.to_json().unwrap();
        assert_eq!(UnsignedCorim::from_json(&json).unwrap(), corim);
    }

    #[test]
    fn test_rim_validity_from_now_round_trips() {
        let corim = test::minimal_corim()
            .with_validity(Validity::new(None, Time::now()).unwrap());

        let bytes = corim.to_cbor().unwrap();
        assert_eq!(UnsignedCorim::from_cbor(&bytes).unwrap(), corim);

        let json = corim.to_json().unwrap();
        assert!(json.contains(r#""rim-validity":{"not-after":"#));
        assert_eq!(UnsignedCorim::from_json(&json).unwrap(), corim);
    }

    #[test]
    fn test_oversized_profile_oid_is_rejected() {
        let json = test::minimal_corim().to_json().unwrap();
        let json = json.replacen('{', r#"{"profile":"2.18446744073709551615","#, 1);
        assert!(UnsignedCorim::from_json(&json).is_err());
    }

    #[test]
    fn test_top_level_key_order() {
        let mut corim = test::minimal_corim()
            .with_profile(ProfileId::uri("http://example.com/unregistered-order"))
            .with_validity(Validity::new(None, Time::from_timestamp(1_700_000_000).unwrap()).unwrap());
        corim
            .add_dependent_rim("https://example.com/dep.cbor", None)
            .add_entity("ACME", None, vec![CorimRole::ManifestCreator]);
        corim
            .extensions
            .insert(-1, Value::Text("foo".into()).into());

        let bytes = corim.to_cbor().unwrap();
        let Value::Map(entries) = cbor::value_from_slice(&bytes[3..]).unwrap() else {
            panic!("expected a map");
        };
        let keys: Vec<i128> = entries
            .iter()
            .map(|(k, _)| i128::from(k.as_integer().unwrap()))
            .collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4, 5, -1]);
    }

    #[test]
    fn test_unknown_extension_round_trips_without_profile() {
        let id = ProfileId::uri("http://example.com/extension-round-trip");
        let field = ExtensionField::new(-1, "Extension1", FieldKind::text());
        register_profile(
            ProfileManifest::new(id.clone())
                .with_extension(
                    ExtensionPoint::UnsignedCorim,
                    Arc::new(FieldExtension::new(vec![field.clone()])),
                )
                .unwrap(),
        )
        .unwrap();

        let mut corim = test::minimal_corim().with_profile(id.clone());
        corim.extensions.set(&field, "foo").unwrap();
        let bytes = corim.to_cbor().unwrap();

        let resolved = UnsignedCorim::from_cbor(&bytes).unwrap();
        assert_eq!(resolved.extensions.get_as::<String>(&field).unwrap().as_deref(), Some("foo"));
        assert!(resolved.extensions.field_cache().is_empty());

        assert!(unregister_profile(&id));

        let plain = UnsignedCorim::from_cbor(&bytes).unwrap();
        assert_eq!(plain.extensions.field_cache().len(), 1);
        assert_eq!(plain.to_cbor().unwrap(), bytes);
    }

    #[test]
    fn test_legacy_tag_is_accepted() {
        let corim = test::minimal_corim();
        let mut bytes = cbor::tag_prefix(500).to_vec();
        bytes.extend(cbor::to_vec(&corim).unwrap());
        assert_eq!(UnsignedCorim::from_cbor(&bytes).unwrap(), corim);
    }

    #[test]
    fn test_no_tags_is_invalid() {
        let corim = UnsignedCorim::new("x");
        assert_eq!(corim.valid().unwrap_err().to_string(), "no tags");
    }

    #[test]
    fn test_empty_id_is_invalid() {
        let mut corim = test::minimal_corim();
        corim.id = TagId::from("");
        assert_eq!(corim.valid().unwrap_err().to_string(), "corim-id: empty tag id");
    }

    #[test]
    fn test_coswid_and_cots_are_opaque() {
        let mut corim = UnsignedCorim::new("opaque");
        corim.add_coswid(vec![0xa0]).add_cots(vec![0xa1, 0x00, 0x00]);
        corim.valid().unwrap();

        let bytes = corim.to_cbor().unwrap();
        // tags: [505(h'a0'), 508(h'a10000')]
        assert!(bytes
            .windows(12)
            .any(|w| w == hex!("82 d9 01 f9 41 a0 d9 01 fc 43 a1 00")));
        assert_eq!(UnsignedCorim::from_cbor(&bytes).unwrap(), corim);
    }

    #[test]
    fn test_locator_thumbprint_separator() {
        let locator = Locator::new(
            "https://example.com/rim.cbor",
            Some(HashEntry::new(HashAlgorithm::SHA256, [0u8; 32])),
        );
        locator.valid().unwrap();

        let json = cbor::to_json(&locator).unwrap();
        assert_eq!(
            json,
            r#"{"href":"https://example.com/rim.cbor","thumbprint":"sha-256:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}"#
        );
        assert_eq!(cbor::from_json::<Locator>(&json).unwrap(), locator);

        let semicolon = json.replace("sha-256:", "sha-256;");
        assert_eq!(cbor::from_json::<Locator>(&semicolon).unwrap(), locator);
    }

    #[test]
    fn test_relative_locator_is_invalid() {
        let mut corim = test::minimal_corim();
        corim.add_dependent_rim("rim.cbor", None);
        assert!(corim
            .valid()
            .unwrap_err()
            .to_string()
            .starts_with("dependent RIM at index 0, href: invalid URI"));
    }

    #[test]
    fn test_meta_round_trip() {
        let meta = Meta::new(Signer::new("ACME Ltd.").with_uri("https://acme.example"))
            .with_validity(
                Validity::new(
                    Some(Time::from_timestamp(1_600_000_000).unwrap()),
                    Time::from_timestamp(1_700_000_000).unwrap(),
                )
                .unwrap(),
            );
        meta.valid().unwrap();

        let bytes = cbor::to_vec(&meta).unwrap();
        assert_eq!(cbor::from_slice::<Meta>(&bytes).unwrap(), meta);

        let json = cbor::to_json(&meta).unwrap();
        assert_eq!(
            json,
            r#"{"signer":{"name":"ACME Ltd.","uri":"https://acme.example"},"validity":{"not-before":"2020-09-13T12:26:40Z","not-after":"2023-11-14T22:13:20Z"}}"#
        );
    }

    #[test]
    fn test_malformed_comid_body_is_a_parse_error() {
        // 501({0: "x", 1: [506(h'a0')]}): the CoMID map lacks its mandatory fields
        let bytes = hex!("d9 01 f5 a2 00 61 78 01 81 d9 01 fa 41 a0");
        let err = UnsignedCorim::from_cbor(&bytes).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("missing mandatory field \"tag-identity\" (1)"));
    }
}
