// SPDX-License-Identifier: MIT

//! Concise Module Identifier (CoMID) Implementation
//!
//! A CoMID tag names a module (through its [`TagIdentity`]), the entities
//! responsible for it, and a set of [`Triples`] carrying reference values,
//! endorsed values, keys and domain relations. Inside a CoRIM it travels as
//! a byte string under CBOR tag 506.
//!
//! # Example
//!
//! ```rust
//! use rats_corim::{ComidRole, Comid, CryptoKey, Environment, InstanceId, Uuid};
//!
//! let mut comid = Comid::new("vendor.example/prod/1");
//! comid
//!     .add_entity("ACME Ltd.", None, vec![ComidRole::TagCreator])
//!     .add_attest_verif_key(
//!         Environment::new().with_instance(InstanceId::Uuid(Uuid::from([0x11; 16]))),
//!         vec![CryptoKey::Bytes(vec![1, 2, 3].into())],
//!     );
//!
//! assert!(comid.valid().is_ok());
//! let bytes = comid.to_cbor().unwrap();
//! assert_eq!(Comid::from_cbor(&bytes).unwrap(), comid);
//! ```

use std::fmt::Debug;

use ciborium::Value;
use serde::{
    de::{DeserializeOwned, MapAccess, Visitor},
    Deserialize, Serialize,
};
use serde_json::Value as JsonValue;

use crate::{
    cbor,
    choice::{de_error, split_envelope, unexpected_cbor, ChoiceKind, Peeked, RegisteredChoice},
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    macros::entity_roles,
    CoswidTriple, CryptoKey, DomainDependencyTriple, DomainMembershipTriple, Environment, Error,
    ExtensionMap, KeyTriple, Measurement, ParseError, Result, ResultExt, TagId, TaggedUri,
    ValueTriple,
};

/// Behaviour shared by the CoRIM and CoMID entity-role enums.
pub trait Role: Copy + Debug + PartialEq + Serialize + DeserializeOwned {
    fn code(&self) -> i64;

    /// Registered name; `None` for unknown codes.
    fn name(&self) -> Option<&'static str>;
}

entity_roles!(
    /// Roles an entity can play towards a CoMID tag.
    ComidRole {
        TagCreator = 0 => "tagCreator",
        Creator = 1 => "creator",
        Maintainer = 2 => "maintainer",
    }
);

entity_roles!(
    /// Roles an entity can play towards a CoRIM.
    CorimRole {
        ManifestCreator = 1 => "manifestCreator",
        ManifestSigner = 2 => "manifestSigner",
    }
);

/// Name of an entity. The text variant is a plain string in both
/// encodings; registered variants use the usual tag and envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityName {
    String(String),
    Registered(RegisteredChoice),
}

impl EntityName {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Registered(_) => None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::String(s) if s.is_empty() => Err(Error::validation("empty entity name")),
            Self::String(_) => Ok(()),
            Self::Registered(r) => r.valid(),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        let kind = ChoiceKind::EntityName;
        match peeked {
            Peeked::Cbor(Value::Text(s)) => Ok(Self::String(s)),
            Peeked::Cbor(Value::Tag(tag, inner)) => {
                RegisteredChoice::from_cbor(kind, tag, *inner).map(Self::Registered)
            }
            Peeked::Cbor(other) => Err(unexpected_cbor(kind, &other)),
            Peeked::Json(JsonValue::String(s)) => Ok(Self::String(s)),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match (typ.as_str(), value) {
                    ("string", JsonValue::String(s)) => Ok(Self::String(s)),
                    ("string", other) => Err(ParseError::json(format!(
                        "entity name must be a string, found {other}"
                    ))
                    .into()),
                    (other, value) => {
                        RegisteredChoice::from_json(kind, other, value).map(Self::Registered)
                    }
                }
            }
        }
    }
}

impl From<&str> for EntityName {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EntityName {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl Serialize for EntityName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Registered(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EntityName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

const ENTITY_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "name"),
    FieldDesc::optional(1, "regid"),
    FieldDesc::mandatory(2, "roles"),
];

/// An entity (organisation or person) and the roles it plays.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<R> {
    pub name: EntityName,
    pub regid: Option<TaggedUri>,
    pub roles: Vec<R>,
    pub extensions: ExtensionMap,
}

pub type ComidEntity = Entity<ComidRole>;
pub type CorimEntity = Entity<CorimRole>;

impl<R: Role> Entity<R> {
    pub fn new<N: Into<EntityName>>(name: N, regid: Option<TaggedUri>, roles: Vec<R>) -> Self {
        Self {
            name: name.into(),
            regid,
            roles,
            extensions: ExtensionMap::new(),
        }
    }

    pub fn has_role(&self, role: R) -> bool {
        self.roles.contains(&role)
    }

    pub fn valid(&self) -> Result<()> {
        self.name.valid()?;

        if let Some(regid) = &self.regid {
            regid.valid().context("regid")?;
        }

        if self.roles.is_empty() {
            return Err(Error::validation("no roles"));
        }
        for role in &self.roles {
            if role.name().is_none() {
                return Err(Error::validation(format!("unknown role code {}", role.code())));
            }
        }

        Ok(())
    }
}

impl<R: Role> Serialize for Entity<R> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&ENTITY_FIELDS[0], &self.name)?;
        map.optional(&ENTITY_FIELDS[1], &self.regid)?;
        map.field(&ENTITY_FIELDS[2], &self.roles)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de, R: Role> Deserialize<'de> for Entity<R> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EntityVisitor<R> {
            is_human_readable: bool,
            marker: std::marker::PhantomData<R>,
        }

        impl<'de, R: Role> Visitor<'de> for EntityVisitor<R> {
            type Value = Entity<R>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an entity map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Entity<R>, A::Error> {
                let mut reader = MapReader::new(ENTITY_FIELDS, self.is_human_readable);
                let mut entity = Entity::new("", None, vec![]);

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => entity.name = map.next_value()?,
                        FieldKey::Known(1) => entity.regid = Some(map.next_value()?),
                        FieldKey::Known(_) => entity.roles = map.next_value()?,
                        FieldKey::Unknown(k) => {
                            reader.extension(&mut map, k, &mut entity.extensions)?
                        }
                    }
                }

                reader.finish()?;
                Ok(entity)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(EntityVisitor {
            is_human_readable,
            marker: std::marker::PhantomData,
        })
    }
}

const TAG_IDENTITY_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "id"),
    FieldDesc::optional(1, "version"),
];

/// Identifier and version of a CoMID tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIdentity {
    pub tag_id: TagId,
    pub tag_version: Option<u64>,
}

impl TagIdentity {
    pub fn new<T: Into<TagId>>(tag_id: T) -> Self {
        Self {
            tag_id: tag_id.into(),
            tag_version: None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        self.tag_id.valid()
    }
}

impl Serialize for TagIdentity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&TAG_IDENTITY_FIELDS[0], &self.tag_id)?;
        map.optional(&TAG_IDENTITY_FIELDS[1], &self.tag_version)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for TagIdentity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct TagIdentityVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for TagIdentityVisitor {
            type Value = TagIdentity;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a tag-identity map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<TagIdentity, A::Error> {
                let mut reader = MapReader::new(TAG_IDENTITY_FIELDS, self.is_human_readable);
                let mut identity = TagIdentity::new("");

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => identity.tag_id = map.next_value()?,
                        FieldKey::Known(_) => identity.tag_version = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected tag-identity field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(identity)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(TagIdentityVisitor { is_human_readable })
    }
}

/// How a linked tag relates to the linking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRel {
    Supplements,
    Replaces,
}

impl TagRel {
    pub fn code(&self) -> u64 {
        match self {
            Self::Supplements => 0,
            Self::Replaces => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Supplements => "supplements",
            Self::Replaces => "replaces",
        }
    }
}

impl Serialize for TagRel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.name())
        } else {
            serializer.serialize_u64(self.code())
        }
    }
}

impl<'de> Deserialize<'de> for TagRel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        match Peeked::deserialize(deserializer)? {
            Peeked::Json(JsonValue::String(s)) if s == "supplements" => Ok(Self::Supplements),
            Peeked::Json(JsonValue::String(s)) if s == "replaces" => Ok(Self::Replaces),
            Peeked::Cbor(Value::Integer(i)) if i128::from(i) == 0 => Ok(Self::Supplements),
            Peeked::Cbor(Value::Integer(i)) if i128::from(i) == 1 => Ok(Self::Replaces),
            _ => Err(D::Error::custom("tag-rel must be supplements (0) or replaces (1)")),
        }
    }
}

const LINKED_TAG_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "target"),
    FieldDesc::mandatory(1, "rel"),
];

/// A reference from this CoMID to another tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedTag {
    pub linked_tag_id: TagId,
    pub tag_rel: TagRel,
}

impl LinkedTag {
    pub fn valid(&self) -> Result<()> {
        self.linked_tag_id.valid()
    }
}

impl Serialize for LinkedTag {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&LINKED_TAG_FIELDS[0], &self.linked_tag_id)?;
        map.field(&LINKED_TAG_FIELDS[1], &self.tag_rel)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for LinkedTag {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct LinkedTagVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for LinkedTagVisitor {
            type Value = LinkedTag;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a linked-tag map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<LinkedTag, A::Error> {
                let mut reader = MapReader::new(LINKED_TAG_FIELDS, self.is_human_readable);
                let mut linked_tag_id = None;
                let mut tag_rel = None;

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => linked_tag_id = Some(map.next_value()?),
                        FieldKey::Known(_) => tag_rel = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected linked-tag field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                match (linked_tag_id, tag_rel) {
                    (Some(linked_tag_id), Some(tag_rel)) => Ok(LinkedTag {
                        linked_tag_id,
                        tag_rel,
                    }),
                    _ => Err(serde::de::Error::custom("incomplete linked tag")),
                }
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(LinkedTagVisitor { is_human_readable })
    }
}

const TRIPLES_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "reference-values"),
    FieldDesc::optional(1, "endorsed-values"),
    FieldDesc::optional(2, "attest-verif-keys"),
    FieldDesc::optional(3, "dev-identity-keys"),
    FieldDesc::optional(4, "dependency-triples"),
    FieldDesc::optional(5, "membership-triples"),
    FieldDesc::optional(6, "coswid-triples"),
];

/// The triple families of a CoMID. Empty families are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triples {
    pub reference_values: Vec<ValueTriple>,
    pub endorsed_values: Vec<ValueTriple>,
    pub attest_verif_keys: Vec<KeyTriple>,
    pub dev_identity_keys: Vec<KeyTriple>,
    pub dependency_triples: Vec<DomainDependencyTriple>,
    pub membership_triples: Vec<DomainMembershipTriple>,
    pub coswid_triples: Vec<CoswidTriple>,
    pub extensions: ExtensionMap,
}

impl Triples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.reference_values.is_empty()
            && self.endorsed_values.is_empty()
            && self.attest_verif_keys.is_empty()
            && self.dev_identity_keys.is_empty()
            && self.dependency_triples.is_empty()
            && self.membership_triples.is_empty()
            && self.coswid_triples.is_empty()
            && self.extensions.is_empty()
    }

    pub fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("no triples"));
        }

        for (i, t) in self.reference_values.iter().enumerate() {
            t.valid().with_context(|| format!("reference value at index {i}"))?;
        }
        for (i, t) in self.endorsed_values.iter().enumerate() {
            t.valid().with_context(|| format!("endorsed value at index {i}"))?;
        }
        for (i, t) in self.attest_verif_keys.iter().enumerate() {
            t.valid()
                .with_context(|| format!("attestation verification key at index {i}"))?;
        }
        for (i, t) in self.dev_identity_keys.iter().enumerate() {
            t.valid().with_context(|| format!("device identity key at index {i}"))?;
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

        Ok(())
    }
}

impl Serialize for Triples {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = TRIPLES_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.non_empty(&f[0], &self.reference_values)?;
        map.non_empty(&f[1], &self.endorsed_values)?;
        map.non_empty(&f[2], &self.attest_verif_keys)?;
        map.non_empty(&f[3], &self.dev_identity_keys)?;
        map.non_empty(&f[4], &self.dependency_triples)?;
        map.non_empty(&f[5], &self.membership_triples)?;
        map.non_empty(&f[6], &self.coswid_triples)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Triples {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct TriplesVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for TriplesVisitor {
            type Value = Triples;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a triples map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Triples, A::Error> {
                let mut reader = MapReader::new(TRIPLES_FIELDS, self.is_human_readable);
                let mut triples = Triples::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => triples.reference_values = map.next_value()?,
                        FieldKey::Known(1) => triples.endorsed_values = map.next_value()?,
                        FieldKey::Known(2) => triples.attest_verif_keys = map.next_value()?,
                        FieldKey::Known(3) => triples.dev_identity_keys = map.next_value()?,
                        FieldKey::Known(4) => triples.dependency_triples = map.next_value()?,
                        FieldKey::Known(5) => triples.membership_triples = map.next_value()?,
                        FieldKey::Known(_) => triples.coswid_triples = map.next_value()?,
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
        deserializer.deserialize_map(TriplesVisitor { is_human_readable })
    }
}

const COMID_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "language"),
    FieldDesc::mandatory(1, "tag-identity"),
    FieldDesc::optional(2, "entities"),
    FieldDesc::optional(3, "linked-tags"),
    FieldDesc::mandatory(4, "triples"),
];

/// A CoMID tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Comid {
    pub language: Option<String>,
    pub tag_identity: TagIdentity,
    pub entities: Vec<ComidEntity>,
    pub linked_tags: Vec<LinkedTag>,
    pub triples: Triples,
    pub extensions: ExtensionMap,
}

impl Comid {
    pub fn new<T: Into<TagId>>(tag_id: T) -> Self {
        Self {
            language: None,
            tag_identity: TagIdentity::new(tag_id),
            entities: vec![],
            linked_tags: vec![],
            triples: Triples::new(),
            extensions: ExtensionMap::new(),
        }
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_tag_version(mut self, version: u64) -> Self {
        self.tag_identity.tag_version = Some(version);
        self
    }

    pub fn add_entity<N: Into<crate::EntityName>>(
        &mut self,
        name: N,
        regid: Option<TaggedUri>,
        roles: Vec<ComidRole>,
    ) -> &mut Self {
        self.entities.push(Entity::new(name, regid, roles));
        self
    }

    pub fn add_linked_tag<T: Into<TagId>>(&mut self, linked_tag_id: T, tag_rel: TagRel) -> &mut Self {
        self.linked_tags.push(LinkedTag {
            linked_tag_id: linked_tag_id.into(),
            tag_rel,
        });
        self
    }

    pub fn add_reference_value(
        &mut self,
        environment: Environment,
        measurements: Vec<Measurement>,
    ) -> &mut Self {
        self.triples
            .reference_values
            .push(ValueTriple::new(environment, measurements));
        self
    }

    pub fn add_endorsed_value(
        &mut self,
        environment: Environment,
        measurements: Vec<Measurement>,
    ) -> &mut Self {
        self.triples
            .endorsed_values
            .push(ValueTriple::new(environment, measurements));
        self
    }

    pub fn add_attest_verif_key(&mut self, environment: Environment, keys: Vec<CryptoKey>) -> &mut Self {
        self.triples
            .attest_verif_keys
            .push(KeyTriple::new(environment, keys));
        self
    }

    pub fn add_dev_identity_key(&mut self, environment: Environment, keys: Vec<CryptoKey>) -> &mut Self {
        self.triples
            .dev_identity_keys
            .push(KeyTriple::new(environment, keys));
        self
    }

    pub fn add_dependency_triple(
        &mut self,
        domain: Environment,
        trustees: Vec<Environment>,
    ) -> &mut Self {
        self.triples
            .dependency_triples
            .push(DomainDependencyTriple { domain, trustees });
        self
    }

    pub fn add_membership_triple(
        &mut self,
        domain: Environment,
        members: Vec<Environment>,
    ) -> &mut Self {
        self.triples
            .membership_triples
            .push(DomainMembershipTriple { domain, members });
        self
    }

    pub fn add_coswid_triple(&mut self, environment: Environment, tag_ids: Vec<TagId>) -> &mut Self {
        self.triples.coswid_triples.push(CoswidTriple {
            environment,
            tag_ids,
        });
        self
    }

    pub fn valid(&self) -> Result<()> {
        self.tag_identity.valid().context("tag-identity")?;

        if matches!(&self.language, Some(l) if l.is_empty()) {
            return Err(Error::validation("empty language"));
        }

        for (i, e) in self.entities.iter().enumerate() {
            e.valid().with_context(|| format!("entity at index {i}"))?;
        }

        for (i, t) in self.linked_tags.iter().enumerate() {
            t.valid().with_context(|| format!("linked tag at index {i}"))?;
        }

        self.triples.valid().context("triples")
    }

    /// Untagged CBOR encoding of the CoMID map.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    /// Decodes a CoMID map; a leading tag 506 is accepted.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        match cbor::strip_tag_prefix(bytes, cbor::TAG_COMID) {
            Some(rest) => cbor::from_slice(rest),
            None => cbor::from_slice(bytes),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        cbor::to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        cbor::from_json(json)
    }
}

impl Serialize for Comid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = COMID_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&f[0], &self.language)?;
        map.field(&f[1], &self.tag_identity)?;
        map.non_empty(&f[2], &self.entities)?;
        map.non_empty(&f[3], &self.linked_tags)?;
        map.field(&f[4], &self.triples)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Comid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ComidVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for ComidVisitor {
            type Value = Comid;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a CoMID map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Comid, A::Error> {
                let mut reader = MapReader::new(COMID_FIELDS, self.is_human_readable);
                let mut comid = Comid::new("");

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => comid.language = Some(map.next_value()?),
                        FieldKey::Known(1) => comid.tag_identity = map.next_value()?,
                        FieldKey::Known(2) => comid.entities = map.next_value()?,
                        FieldKey::Known(3) => comid.linked_tags = map.next_value()?,
                        FieldKey::Known(_) => comid.triples = map.next_value()?,
                        FieldKey::Unknown(k) => {
                            reader.extension(&mut map, k, &mut comid.extensions)?
                        }
                    }
                }

                reader.finish()?;
                Ok(comid)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(ComidVisitor { is_human_readable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::SerdeTestCase, HashAlgorithm, HashEntry, InstanceId, Mval, Uuid};
    use hex_literal::hex;

    #[test]
    fn test_entity_name_is_plain_string() {
        let entity = ComidEntity::new("ACME", None, vec![ComidRole::Creator]);

        SerdeTestCase {
            value: entity,
            expected_json: r#"{"name":"ACME","roles":["creator"]}"#,
            expected_cbor: hex!("a2 00 64 41 43 4d 45 02 81 01").to_vec(),
        }
        .run();

        let from_envelope: EntityName =
            cbor::from_json(r#"{"type":"string","value":"ACME"}"#).unwrap();
        assert_eq!(from_envelope, EntityName::from("ACME"));
    }

    #[test]
    fn test_entity_unknown_role_fails_validation() {
        // {0: "x", 2: [7]}
        let entity: ComidEntity = cbor::from_slice(&hex!("a2 00 61 78 02 81 07")).unwrap();
        assert_eq!(entity.roles, vec![ComidRole::Other(7)]);
        assert_eq!(entity.valid().unwrap_err().to_string(), "unknown role code 7");
    }

    #[test]
    fn test_entity_regid_must_be_absolute() {
        let entity = CorimEntity::new(
            "ACME",
            Some(TaggedUri::new("not a uri")),
            vec![CorimRole::ManifestCreator],
        );
        assert!(entity.valid().unwrap_err().to_string().starts_with("regid: "));
    }

    #[test]
    fn test_tag_identity_with_version() {
        let mut identity = TagIdentity::new("vendor.example/prod/1");
        identity.tag_version = Some(2);

        SerdeTestCase {
            value: identity,
            expected_json: r#"{"id":"vendor.example/prod/1","version":2}"#,
            expected_cbor: hex!(
                "a2 00 75 76 65 6e 64 6f 72 2e 65 78 61 6d 70 6c 65 2f 70 72 6f 64 2f 31 01 02"
            )
            .to_vec(),
        }
        .run();
    }

    #[test]
    fn test_linked_tag() {
        SerdeTestCase {
            value: LinkedTag {
                linked_tag_id: TagId::from("other"),
                tag_rel: TagRel::Replaces,
            },
            expected_json: r#"{"target":"other","rel":"replaces"}"#,
            expected_cbor: hex!("a2 00 65 6f 74 68 65 72 01 01").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_triples_must_not_be_empty() {
        let comid = Comid::new("t");
        assert_eq!(comid.valid().unwrap_err().to_string(), "triples: no triples");
    }

    #[test]
    fn test_comid_round_trip_and_tagged_input() {
        let mut comid = Comid::new("t").with_language("en-GB");
        comid
            .add_entity("ACME", None, vec![ComidRole::TagCreator])
            .add_reference_value(
                Environment::new().with_instance(InstanceId::Uuid(Uuid::from([7u8; 16]))),
                vec![Measurement::new(Mval::new().with_name("fw")).with_key(1u64)],
            );
        comid.valid().unwrap();

        let bytes = comid.to_cbor().unwrap();
        assert_eq!(Comid::from_cbor(&bytes).unwrap(), comid);

        let mut tagged = cbor::tag_prefix(506).to_vec();
        tagged.extend(&bytes);
        assert_eq!(Comid::from_cbor(&tagged).unwrap(), comid);

        let json = comid.to_json().unwrap();
        assert!(json.contains(r#""reference-values":[{"environment":"#));
        assert!(json.starts_with(r#"{"language":"en-GB","#));
        assert_eq!(Comid::from_json(&json).unwrap(), comid);
    }

    #[test]
    fn test_key_triple_families_use_registered_keys() {
        let environment = Environment::new().with_instance(InstanceId::Uuid(Uuid::from([7u8; 16])));
        let key = CryptoKey::Thumbprint(HashEntry::new(HashAlgorithm::SHA384, [0x5a; 48]));

        let mut comid = Comid::new("t");
        comid.add_attest_verif_key(environment.clone(), vec![key.clone()]);
        let bytes = cbor::to_vec(&comid.triples).unwrap();
        assert_eq!(&bytes[..2], &hex!("a1 02"));
        // sha-384 digests carry algorithm 8
        assert!(bytes.windows(4).any(|w| w == hex!("82 08 58 30")));
        assert!(cbor::to_json(&comid.triples)
            .unwrap()
            .starts_with(r#"{"attest-verif-keys":["#));

        let mut comid = Comid::new("t");
        comid.add_dev_identity_key(environment, vec![key]);
        let bytes = cbor::to_vec(&comid.triples).unwrap();
        assert_eq!(&bytes[..2], &hex!("a1 03"));
        assert!(cbor::to_json(&comid.triples)
            .unwrap()
            .starts_with(r#"{"dev-identity-keys":["#));

        let back: Triples = cbor::from_slice(&bytes).unwrap();
        assert!(back.attest_verif_keys.is_empty());
        assert_eq!(back.dev_identity_keys.len(), 1);
    }

    #[test]
    fn test_comid_missing_triples() {
        // {1: {0: "t"}}
        let err = Comid::from_cbor(&hex!("a1 01 a1 00 61 74")).unwrap_err();
        assert!(err
            .to_string()
            .contains("missing mandatory field \"triples\" (4)"));
    }

    #[test]
    fn test_unknown_triples_family_round_trips() {
        // {1: {0: "t"}, 4: {-100: []}}
        let bytes = hex!("a2 01 a1 00 61 74 04 a1 38 63 80");
        let comid = Comid::from_cbor(&bytes).unwrap();
        assert_eq!(comid.triples.extensions.len(), 1);
        assert_eq!(comid.to_cbor().unwrap(), bytes);
    }
}
