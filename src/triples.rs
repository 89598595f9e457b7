// SPDX-License-Identifier: MIT

//! Environments and the triple records that relate them to measurements,
//! keys and other environments.
//!
//! # Triple Record Types
//!
//! - [`ValueTriple`]: reference values and endorsed values
//! - [`KeyTriple`]: attestation verification keys and device identity keys
//! - [`DomainDependencyTriple`]: a domain and the environments it trusts
//! - [`DomainMembershipTriple`]: a domain and its members
//! - [`CoswidTriple`]: an environment and the CoSWID tags describing it
//!
//! All of them are positional arrays in CBOR and objects in JSON.
//!
//! # Example
//!
//! ```rust
//! use rats_corim::{ClassId, Environment, HashAlgorithm, HashEntry, Measurement, Mval, ValueTriple};
//!
//! let triple = ValueTriple::new(
//!     Environment::from_class_id(ClassId::Bytes(vec![0x61; 32].into())),
//!     vec![Measurement::new(
//!         Mval::new().with_digest(HashEntry::new(HashAlgorithm::SHA256, [0u8; 32])),
//!     )
//!     .with_key("BL")],
//! );
//! assert!(triple.valid().is_ok());
//! ```

use std::fmt::Display;

use ciborium::Value;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Serialize,
};

use crate::{
    cbor::{TAG_BYTES, TAG_OID, TAG_UEID, TAG_UUID},
    choice::{
        de_error, from_cbor, from_json, serialize_tagged, serialize_untagged, split_envelope,
        unexpected_cbor, ChoiceKind, Peeked, RegisteredChoice,
    },
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    macros::array_record,
    Bytes, CryptoKey, Error, Measurement, Oid, Result, ResultExt, TagId, Ueid, Uuid,
};

/// Identifies a class of environments (e.g. a hardware or firmware model).
#[derive(Debug, Clone, PartialEq)]
pub enum ClassId {
    Oid(Oid),
    Uuid(Uuid),
    Bytes(Bytes),
    Int(i64),
    Registered(RegisteredChoice),
}

impl ClassId {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Oid(_) => "oid",
            Self::Uuid(_) => "uuid",
            Self::Bytes(_) => "bytes",
            Self::Int(_) => "int",
            Self::Registered(r) => &r.type_name,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Oid(oid) => oid.arcs().map(|_| ()),
            Self::Bytes(b) if b.is_empty() => Err(Error::validation("empty class-id bytes")),
            Self::Registered(r) => r.valid(),
            _ => Ok(()),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        let kind = ChoiceKind::ClassId;
        match peeked {
            Peeked::Cbor(Value::Tag(TAG_OID, inner)) => Ok(Self::Oid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_UUID, inner)) => Ok(Self::Uuid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_BYTES, inner)) => Ok(Self::Bytes(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(tag, inner)) => {
                RegisteredChoice::from_cbor(kind, tag, *inner).map(Self::Registered)
            }
            Peeked::Cbor(v @ Value::Integer(_)) => Ok(Self::Int(from_cbor(v)?)),
            Peeked::Cbor(other) => Err(unexpected_cbor(kind, &other)),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "oid" => Ok(Self::Oid(from_json(value)?)),
                    "uuid" => Ok(Self::Uuid(from_json(value)?)),
                    "bytes" => Ok(Self::Bytes(from_json(value)?)),
                    "int" => Ok(Self::Int(from_json(value)?)),
                    other => RegisteredChoice::from_json(kind, other, value).map(Self::Registered),
                }
            }
        }
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oid(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Bytes(v) => {
                for b in v.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Int(v) => write!(f, "{v}"),
            Self::Registered(r) => write!(f, "{}", r.type_name),
        }
    }
}

impl Serialize for ClassId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = self.type_name();
        match self {
            Self::Oid(v) => serialize_tagged::<TAG_OID, _, _>(serializer, name, v),
            Self::Uuid(v) => serialize_tagged::<TAG_UUID, _, _>(serializer, name, v),
            Self::Bytes(v) => serialize_tagged::<TAG_BYTES, _, _>(serializer, name, v),
            Self::Int(v) => serialize_untagged(serializer, name, v),
            Self::Registered(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ClassId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

/// Identifies one instance of an environment class.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceId {
    Uuid(Uuid),
    Ueid(Ueid),
    Bytes(Bytes),
    Int(i64),
    String(String),
    Registered(RegisteredChoice),
}

impl InstanceId {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Uuid(_) => "uuid",
            Self::Ueid(_) => "ueid",
            Self::Bytes(_) => "bytes",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::Registered(r) => &r.type_name,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Ueid(ueid) => ueid.valid(),
            Self::Bytes(b) if b.is_empty() => Err(Error::validation("empty instance-id bytes")),
            Self::String(s) if s.is_empty() => Err(Error::validation("empty instance-id string")),
            Self::Registered(r) => r.valid(),
            _ => Ok(()),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        let kind = ChoiceKind::InstanceId;
        match peeked {
            Peeked::Cbor(Value::Tag(TAG_UUID, inner)) => Ok(Self::Uuid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_UEID, inner)) => Ok(Self::Ueid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_BYTES, inner)) => Ok(Self::Bytes(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(tag, inner)) => {
                RegisteredChoice::from_cbor(kind, tag, *inner).map(Self::Registered)
            }
            Peeked::Cbor(v @ Value::Integer(_)) => Ok(Self::Int(from_cbor(v)?)),
            Peeked::Cbor(Value::Text(s)) => Ok(Self::String(s)),
            Peeked::Cbor(other) => Err(unexpected_cbor(kind, &other)),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "uuid" => Ok(Self::Uuid(from_json(value)?)),
                    "ueid" => Ok(Self::Ueid(from_json(value)?)),
                    "bytes" => Ok(Self::Bytes(from_json(value)?)),
                    "int" => Ok(Self::Int(from_json(value)?)),
                    "string" => Ok(Self::String(from_json(value)?)),
                    other => RegisteredChoice::from_json(kind, other, value).map(Self::Registered),
                }
            }
        }
    }
}

impl Serialize for InstanceId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = self.type_name();
        match self {
            Self::Uuid(v) => serialize_tagged::<TAG_UUID, _, _>(serializer, name, v),
            Self::Ueid(v) => serialize_tagged::<TAG_UEID, _, _>(serializer, name, v),
            Self::Bytes(v) => serialize_tagged::<TAG_BYTES, _, _>(serializer, name, v),
            Self::Int(v) => serialize_untagged(serializer, name, v),
            Self::String(v) => serialize_untagged(serializer, name, v),
            Self::Registered(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

/// Identifies a group of environments.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupId {
    Uuid(Uuid),
    Bytes(Bytes),
    Registered(RegisteredChoice),
}

impl GroupId {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Uuid(_) => "uuid",
            Self::Bytes(_) => "bytes",
            Self::Registered(r) => &r.type_name,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Bytes(b) if b.is_empty() => Err(Error::validation("empty group-id bytes")),
            Self::Registered(r) => r.valid(),
            _ => Ok(()),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        let kind = ChoiceKind::GroupId;
        match peeked {
            Peeked::Cbor(Value::Tag(TAG_UUID, inner)) => Ok(Self::Uuid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_BYTES, inner)) => Ok(Self::Bytes(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(tag, inner)) => {
                RegisteredChoice::from_cbor(kind, tag, *inner).map(Self::Registered)
            }
            Peeked::Cbor(other) => Err(unexpected_cbor(kind, &other)),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "uuid" => Ok(Self::Uuid(from_json(value)?)),
                    "bytes" => Ok(Self::Bytes(from_json(value)?)),
                    other => RegisteredChoice::from_json(kind, other, value).map(Self::Registered),
                }
            }
        }
    }
}

impl Serialize for GroupId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = self.type_name();
        match self {
            Self::Uuid(v) => serialize_tagged::<TAG_UUID, _, _>(serializer, name, v),
            Self::Bytes(v) => serialize_tagged::<TAG_BYTES, _, _>(serializer, name, v),
            Self::Registered(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for GroupId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

const CLASS_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "class-id"),
    FieldDesc::optional(1, "vendor"),
    FieldDesc::optional(2, "model"),
    FieldDesc::optional(3, "layer"),
    FieldDesc::optional(4, "index"),
];

/// Classification of an environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Class {
    pub class_id: Option<ClassId>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub layer: Option<u64>,
    pub index: Option<u64>,
}

impl Class {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_id(mut self, class_id: ClassId) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_vendor<S: Into<String>>(mut self, vendor: S) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_layer(mut self, layer: u64) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn valid(&self) -> Result<()> {
        if self.class_id.is_none()
            && self.vendor.is_none()
            && self.model.is_none()
            && self.layer.is_none()
            && self.index.is_none()
        {
            return Err(Error::validation("class must not be empty"));
        }

        if let Some(class_id) = &self.class_id {
            class_id.valid().context("class-id")?;
        }
        if matches!(&self.vendor, Some(v) if v.is_empty()) {
            return Err(Error::validation("empty vendor"));
        }
        if matches!(&self.model, Some(m) if m.is_empty()) {
            return Err(Error::validation("empty model"));
        }

        Ok(())
    }
}

impl Serialize for Class {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&CLASS_FIELDS[0], &self.class_id)?;
        map.optional(&CLASS_FIELDS[1], &self.vendor)?;
        map.optional(&CLASS_FIELDS[2], &self.model)?;
        map.optional(&CLASS_FIELDS[3], &self.layer)?;
        map.optional(&CLASS_FIELDS[4], &self.index)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Class {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ClassVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for ClassVisitor {
            type Value = Class;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a class map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Class, A::Error> {
                let mut reader = MapReader::new(CLASS_FIELDS, self.is_human_readable);
                let mut class = Class::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => class.class_id = Some(map.next_value()?),
                        FieldKey::Known(1) => class.vendor = Some(map.next_value()?),
                        FieldKey::Known(2) => class.model = Some(map.next_value()?),
                        FieldKey::Known(3) => class.layer = Some(map.next_value()?),
                        FieldKey::Known(_) => class.index = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected class field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(class)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(ClassVisitor { is_human_readable })
    }
}

const ENVIRONMENT_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "class"),
    FieldDesc::optional(1, "instance"),
    FieldDesc::optional(2, "group"),
    FieldDesc::optional(3, "layer"),
    FieldDesc::optional(4, "index"),
];

/// The attested entity a triple talks about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    pub class: Option<Class>,
    pub instance: Option<InstanceId>,
    pub group: Option<GroupId>,
    pub layer: Option<u64>,
    pub index: Option<u64>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_class_id(class_id: ClassId) -> Self {
        Self::new().with_class(Class::new().with_class_id(class_id))
    }

    pub fn with_class(mut self, class: Class) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_instance(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_layer(mut self, layer: u64) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// Class-id of the environment's class, if any.
    pub fn class_id(&self) -> Option<&ClassId> {
        self.class.as_ref().and_then(|c| c.class_id.as_ref())
    }

    pub fn valid(&self) -> Result<()> {
        if self.class.is_none()
            && self.instance.is_none()
            && self.group.is_none()
            && self.layer.is_none()
            && self.index.is_none()
        {
            return Err(Error::validation(
                "environment must not be empty",
            ));
        }

        if let Some(class) = &self.class {
            class.valid().context("class")?;
        }
        if let Some(instance) = &self.instance {
            instance.valid().context("instance")?;
        }
        if let Some(group) = &self.group {
            group.valid().context("group")?;
        }

        Ok(())
    }
}

impl Serialize for Environment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&ENVIRONMENT_FIELDS[0], &self.class)?;
        map.optional(&ENVIRONMENT_FIELDS[1], &self.instance)?;
        map.optional(&ENVIRONMENT_FIELDS[2], &self.group)?;
        map.optional(&ENVIRONMENT_FIELDS[3], &self.layer)?;
        map.optional(&ENVIRONMENT_FIELDS[4], &self.index)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EnvironmentVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for EnvironmentVisitor {
            type Value = Environment;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an environment map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Environment, A::Error> {
                let mut reader = MapReader::new(ENVIRONMENT_FIELDS, self.is_human_readable);
                let mut env = Environment::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => env.class = Some(map.next_value()?),
                        FieldKey::Known(1) => env.instance = Some(map.next_value()?),
                        FieldKey::Known(2) => env.group = Some(map.next_value()?),
                        FieldKey::Known(3) => env.layer = Some(map.next_value()?),
                        FieldKey::Known(_) => env.index = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected environment field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(env)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(EnvironmentVisitor { is_human_readable })
    }
}

/// Reference-value or endorsed-value triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTriple {
    pub environment: Environment,
    pub measurements: Vec<Measurement>,
}

array_record!(ValueTriple, "a value triple" {
    environment: Environment => "environment",
    measurements: Vec<Measurement> => "measurements",
});

impl ValueTriple {
    pub fn new(environment: Environment, measurements: Vec<Measurement>) -> Self {
        Self {
            environment,
            measurements,
        }
    }

    pub fn add_measurement(&mut self, measurement: Measurement) -> &mut Self {
        self.measurements.push(measurement);
        self
    }

    pub fn valid(&self) -> Result<()> {
        self.environment.valid().context("environment")?;

        if self.measurements.is_empty() {
            return Err(Error::validation("no measurement entries"));
        }
        for (i, m) in self.measurements.iter().enumerate() {
            m.valid().with_context(|| format!("measurement at index {i}"))?;
        }

        Ok(())
    }
}

/// Attestation-verification-key or device-identity-key triple.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTriple {
    pub environment: Environment,
    pub verification_keys: Vec<CryptoKey>,
}

array_record!(KeyTriple, "a key triple" {
    environment: Environment => "environment",
    verification_keys: Vec<CryptoKey> => "key",
});

impl KeyTriple {
    pub fn new(environment: Environment, verification_keys: Vec<CryptoKey>) -> Self {
        Self {
            environment,
            verification_keys,
        }
    }

    pub fn valid(&self) -> Result<()> {
        self.environment.valid().context("environment")?;

        if self.verification_keys.is_empty() {
            return Err(Error::validation("no keys"));
        }
        for (i, k) in self.verification_keys.iter().enumerate() {
            k.valid().with_context(|| format!("key at index {i}"))?;
        }

        Ok(())
    }
}

/// A domain and the environments it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDependencyTriple {
    pub domain: Environment,
    pub trustees: Vec<Environment>,
}

array_record!(DomainDependencyTriple, "a domain dependency triple" {
    domain: Environment => "domain",
    trustees: Vec<Environment> => "trustees",
});

impl DomainDependencyTriple {
    pub fn valid(&self) -> Result<()> {
        self.domain.valid().context("domain")?;
        valid_environments(&self.trustees, "trustee")
    }
}

/// A domain and its member environments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainMembershipTriple {
    pub domain: Environment,
    pub members: Vec<Environment>,
}

array_record!(DomainMembershipTriple, "a domain membership triple" {
    domain: Environment => "domain",
    members: Vec<Environment> => "members",
});

impl DomainMembershipTriple {
    pub fn valid(&self) -> Result<()> {
        self.domain.valid().context("domain")?;
        valid_environments(&self.members, "member")
    }
}

fn valid_environments(envs: &[Environment], what: &str) -> Result<()> {
    if envs.is_empty() {
        return Err(Error::validation(format!("no {what} environments")));
    }
    for (i, env) in envs.iter().enumerate() {
        env.valid().with_context(|| format!("{what} at index {i}"))?;
    }
    Ok(())
}

/// An environment and the CoSWID tags that describe its software.
#[derive(Debug, Clone, PartialEq)]
pub struct CoswidTriple {
    pub environment: Environment,
    pub tag_ids: Vec<TagId>,
}

array_record!(CoswidTriple, "a CoSWID triple" {
    environment: Environment => "environment",
    tag_ids: Vec<TagId> => "tag-ids",
});

impl CoswidTriple {
    pub fn valid(&self) -> Result<()> {
        self.environment.valid().context("environment")?;

        if self.tag_ids.is_empty() {
            return Err(Error::validation("no CoSWID tag ids"));
        }
        for (i, id) in self.tag_ids.iter().enumerate() {
            id.valid().with_context(|| format!("tag id at index {i}"))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cbor, test::SerdeTestCase, HashAlgorithm, HashEntry, Mval};
    use hex_literal::hex;

    #[test]
    fn test_class_id_bytes() {
        SerdeTestCase {
            value: ClassId::Bytes(vec![0xde, 0xad].into()),
            expected_json: r#"{"type":"bytes","value":"3q0="}"#,
            expected_cbor: hex!("d9 02 30 42 de ad").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_instance_id_ueid() {
        let mut raw = vec![0x01];
        raw.extend([0xaa; 32]);
        let instance = InstanceId::Ueid(Ueid::from(raw));
        instance.valid().unwrap();

        let bytes = cbor::to_vec(&instance).unwrap();
        assert_eq!(&bytes[..5], &hex!("d9 02 26 58 21"));
        assert_eq!(cbor::from_slice::<InstanceId>(&bytes).unwrap(), instance);
    }

    #[test]
    fn test_unknown_instance_tag() {
        // 1234(h'00')
        let err = cbor::from_slice::<InstanceId>(&hex!("d9 04 d2 41 00")).unwrap_err();
        assert!(err.to_string().contains("unknown instance-id variant tag 1234"));
    }

    #[test]
    fn test_environment_class() {
        let env = Environment::new().with_class(
            Class::new()
                .with_vendor("ACME")
                .with_model("Roadrunner")
                .with_layer(1),
        );

        SerdeTestCase {
            value: env,
            expected_json: r#"{"class":{"vendor":"ACME","model":"Roadrunner","layer":1}}"#,
            expected_cbor: hex!(
                "a1 00 a3 01 64 41 43 4d 45 02 6a 52 6f 61 64 72 75 6e 6e 65 72 03 01"
            )
            .to_vec(),
        }
        .run();
    }

    #[test]
    fn test_environment_class_id() {
        SerdeTestCase {
            value: Environment::from_class_id(ClassId::Bytes(vec![0xde, 0xad].into())),
            expected_json: r#"{"class":{"class-id":{"type":"bytes","value":"3q0="}}}"#,
            expected_cbor: hex!("a1 00 a1 00 d9 02 30 42 de ad").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_empty_environment_is_invalid() {
        assert_eq!(
            Environment::new().valid().unwrap_err().to_string(),
            "environment must not be empty"
        );
    }

    #[test]
    fn test_value_triple_wire_forms() {
        let triple = ValueTriple::new(
            Environment::new().with_instance(InstanceId::Int(7)),
            vec![Measurement::new(Mval::new().with_name("fw"))],
        );
        triple.valid().unwrap();

        SerdeTestCase {
            value: triple,
            expected_json: r#"{"environment":{"instance":{"type":"int","value":7}},"measurements":[{"mval":{"name":"fw"}}]}"#,
            expected_cbor: hex!("82 a1 01 07 81 a1 01 a1 0b 62 66 77").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_value_triple_error_path() {
        let triple = ValueTriple::new(
            Environment::new().with_instance(InstanceId::Int(7)),
            vec![
                Measurement::new(Mval::new().with_name("fw")),
                Measurement::new(
                    Mval::new().with_digest(HashEntry::new(HashAlgorithm::SHA384, [0u8; 32])),
                ),
            ],
        );

        assert_eq!(
            triple.valid().unwrap_err().to_string(),
            "measurement at index 1, digest at index 0: length mismatch for hash algorithm sha-384: want 48 bytes, got 32"
        );
    }

    #[test]
    fn test_key_triple_requires_keys() {
        let triple = KeyTriple::new(Environment::new().with_layer(0), vec![]);
        assert_eq!(triple.valid().unwrap_err().to_string(), "no keys");
    }

    #[test]
    fn test_membership_triple() {
        let triple = DomainMembershipTriple {
            domain: Environment::new().with_group(GroupId::Bytes(vec![1].into())),
            members: vec![Environment::new().with_instance(InstanceId::String("vm-1".into()))],
        };
        triple.valid().unwrap();

        let json = cbor::to_json(&triple).unwrap();
        assert_eq!(cbor::from_json::<DomainMembershipTriple>(&json).unwrap(), triple);

        let bytes = cbor::to_vec(&triple).unwrap();
        assert_eq!(cbor::from_slice::<DomainMembershipTriple>(&bytes).unwrap(), triple);
    }
}
