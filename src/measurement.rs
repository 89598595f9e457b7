// SPDX-License-Identifier: MIT

//! Measurements: a measurement key naming what was measured and a
//! measurement-values map carrying the measured (or expected) values.

use std::{fmt::Display, net::IpAddr};

use ciborium::Value;
use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Serialize,
};
use serde_json::Value as JsonValue;

use crate::{
    cbor::{TAG_BYTES, TAG_MASKED_RAW_VALUE, TAG_MIN_SVN, TAG_OID, TAG_SVN, TAG_UUID},
    choice::{
        de_error, from_cbor, from_json, serialize_envelope, serialize_tagged, serialize_untagged, split_envelope,
        unexpected_cbor, ChoiceKind, Peeked, RegisteredChoice,
    },
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    Bytes, CryptoKey, Error, ExtensionMap, HashEntry, Oid, ParseError, Result, ResultExt, Ueid,
    Uuid,
};

/// Identifies the measured element within its environment.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementKey {
    Oid(Oid),
    Uuid(Uuid),
    Uint(u64),
    String(String),
    Registered(RegisteredChoice),
}

impl MeasurementKey {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Oid(_) => "oid",
            Self::Uuid(_) => "uuid",
            Self::Uint(_) => "uint",
            Self::String(_) => "string",
            Self::Registered(r) => &r.type_name,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Oid(oid) => oid.arcs().map(|_| ()),
            Self::String(s) if s.is_empty() => Err(Error::validation("empty measurement key")),
            Self::Registered(r) => r.valid(),
            _ => Ok(()),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        let kind = ChoiceKind::MeasurementKey;
        match peeked {
            Peeked::Cbor(Value::Tag(TAG_OID, inner)) => Ok(Self::Oid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_UUID, inner)) => Ok(Self::Uuid(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(tag, inner)) => {
                RegisteredChoice::from_cbor(kind, tag, *inner).map(Self::Registered)
            }
            Peeked::Cbor(v @ Value::Integer(_)) => Ok(Self::Uint(from_cbor(v)?)),
            Peeked::Cbor(Value::Text(s)) => Ok(Self::String(s)),
            Peeked::Cbor(other) => Err(unexpected_cbor(kind, &other)),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "oid" => Ok(Self::Oid(from_json(value)?)),
                    "uuid" => Ok(Self::Uuid(from_json(value)?)),
                    "uint" => Ok(Self::Uint(from_json(value)?)),
                    "string" => Ok(Self::String(from_json(value)?)),
                    other => RegisteredChoice::from_json(kind, other, value).map(Self::Registered),
                }
            }
        }
    }
}

impl From<&str> for MeasurementKey {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<u64> for MeasurementKey {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl Display for MeasurementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oid(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Registered(r) => write!(f, "{}", r.type_name),
        }
    }
}

impl Serialize for MeasurementKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = self.type_name();
        match self {
            Self::Oid(v) => serialize_tagged::<TAG_OID, _, _>(serializer, name, v),
            Self::Uuid(v) => serialize_tagged::<TAG_UUID, _, _>(serializer, name, v),
            Self::Uint(v) => serialize_untagged(serializer, name, v),
            Self::String(v) => serialize_untagged(serializer, name, v),
            Self::Registered(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MeasurementKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

const VERSION_FIELDS: &[FieldDesc] = &[
    FieldDesc::mandatory(0, "version"),
    FieldDesc::optional(1, "version-scheme"),
];

/// A version string and, optionally, the CoSWID version scheme it follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: String,
    pub scheme: Option<i64>,
}

impl Version {
    pub fn new<V: Into<String>>(version: V) -> Self {
        Self {
            version: version.into(),
            scheme: None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::validation("empty version"));
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.field(&VERSION_FIELDS[0], &self.version)?;
        map.optional(&VERSION_FIELDS[1], &self.scheme)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct VersionVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a version map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Version, A::Error> {
                let mut reader = MapReader::new(VERSION_FIELDS, self.is_human_readable);
                let mut version = Version::new("");

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => version.version = map.next_value()?,
                        FieldKey::Known(_) => version.scheme = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(de::Error::custom(format!("unexpected version field {k:?}")))
                        }
                    }
                }

                reader.finish()?;
                Ok(version)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(VersionVisitor { is_human_readable })
    }
}

/// Security version number: an exact value or a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Svn {
    /// Untagged exact value
    Uint(u64),
    Exact(u64),
    Min(u64),
}

impl Svn {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Exact(_) => "exact-value",
            Self::Min(_) => "min-value",
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            Self::Uint(v) | Self::Exact(v) | Self::Min(v) => *v,
        }
    }

    /// Whether an actual SVN satisfies this reference SVN.
    pub fn matches(&self, actual: u64) -> bool {
        match self {
            Self::Uint(v) | Self::Exact(v) => actual == *v,
            Self::Min(v) => actual >= *v,
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        match peeked {
            Peeked::Cbor(v @ Value::Integer(_)) => Ok(Self::Uint(from_cbor(v)?)),
            Peeked::Cbor(Value::Tag(TAG_SVN, inner)) => Ok(Self::Exact(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_MIN_SVN, inner)) => Ok(Self::Min(from_cbor(*inner)?)),
            Peeked::Cbor(other) => Err(ParseError::invalid("svn", format!("unexpected {other:?}")).into()),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "uint" => Ok(Self::Uint(from_json(value)?)),
                    "exact-value" => Ok(Self::Exact(from_json(value)?)),
                    "min-value" => Ok(Self::Min(from_json(value)?)),
                    other => Err(ParseError::json(format!("unknown svn type \"{other}\"")).into()),
                }
            }
        }
    }
}

impl Serialize for Svn {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = self.type_name();
        match self {
            Self::Uint(v) => serialize_untagged(serializer, name, v),
            Self::Exact(v) => serialize_tagged::<TAG_SVN, _, _>(serializer, name, v),
            Self::Min(v) => serialize_tagged::<TAG_MIN_SVN, _, _>(serializer, name, v),
        }
    }
}

impl<'de> Deserialize<'de> for Svn {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

const FLAGS_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "is-configured"),
    FieldDesc::optional(1, "is-secure"),
    FieldDesc::optional(2, "is-recovery"),
    FieldDesc::optional(3, "is-debug"),
    FieldDesc::optional(4, "is-replay-protected"),
    FieldDesc::optional(5, "is-integrity-protected"),
    FieldDesc::optional(6, "is-runtime-meas"),
    FieldDesc::optional(7, "is-immutable"),
    FieldDesc::optional(8, "is-tcb"),
    FieldDesc::optional(9, "is-confidentiality-protected"),
];

/// Operational state flags. Index `i` of `values` holds the flag with CBOR
/// key `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flags {
    pub values: [Option<bool>; 10],
    pub extensions: ExtensionMap,
}

impl Flags {
    pub const IS_CONFIGURED: usize = 0;
    pub const IS_SECURE: usize = 1;
    pub const IS_RECOVERY: usize = 2;
    pub const IS_DEBUG: usize = 3;
    pub const IS_REPLAY_PROTECTED: usize = 4;
    pub const IS_INTEGRITY_PROTECTED: usize = 5;
    pub const IS_RUNTIME_MEAS: usize = 6;
    pub const IS_IMMUTABLE: usize = 7;
    pub const IS_TCB: usize = 8;
    pub const IS_CONFIDENTIALITY_PROTECTED: usize = 9;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: usize, value: bool) -> Self {
        if let Some(slot) = self.values.get_mut(flag) {
            *slot = Some(value);
        }
        self
    }

    pub fn get(&self, flag: usize) -> Option<bool> {
        self.values.get(flag).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none) && self.extensions.is_empty()
    }

    pub fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("no flag set"));
        }
        Ok(())
    }
}

impl Serialize for Flags {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        for (desc, value) in FLAGS_FIELDS.iter().zip(self.values.iter()) {
            map.optional(desc, value)?;
        }
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Flags {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FlagsVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for FlagsVisitor {
            type Value = Flags;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a flags map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Flags, A::Error> {
                let mut reader = MapReader::new(FLAGS_FIELDS, self.is_human_readable);
                let mut flags = Flags::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(k) => flags.values[k as usize] = Some(map.next_value()?),
                        FieldKey::Unknown(k) => reader.extension(&mut map, k, &mut flags.extensions)?,
                    }
                }

                reader.finish()?;
                Ok(flags)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(FlagsVisitor { is_human_readable })
    }
}

/// A raw measured value, optionally with a mask selecting the bits that
/// matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Bytes(Bytes),
    Masked { value: Bytes, mask: Bytes },
}

impl RawValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Masked { .. } => "masked-raw-value",
        }
    }

    pub fn value(&self) -> &Bytes {
        match self {
            Self::Bytes(v) | Self::Masked { value: v, .. } => v,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Bytes(_) => Ok(()),
            Self::Masked { value, mask } if value.len() != mask.len() => Err(Error::validation(
                format!("raw value and mask differ in length ({} != {})", value.len(), mask.len()),
            )),
            Self::Masked { .. } => Ok(()),
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        match peeked {
            Peeked::Cbor(Value::Tag(TAG_BYTES, inner)) => Ok(Self::Bytes(from_cbor(*inner)?)),
            Peeked::Cbor(Value::Tag(TAG_MASKED_RAW_VALUE, inner)) => {
                let (value, mask) = from_cbor(*inner)?;
                Ok(Self::Masked { value, mask })
            }
            Peeked::Cbor(other) => {
                Err(ParseError::invalid("raw value", format!("unexpected {other:?}")).into())
            }
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match (typ.as_str(), value) {
                    ("bytes", value) => Ok(Self::Bytes(from_json(value)?)),
                    ("masked-raw-value", JsonValue::Object(mut obj)) => {
                        match (obj.remove("value"), obj.remove("mask")) {
                            (Some(value), Some(mask)) => Ok(Self::Masked {
                                value: from_json(value)?,
                                mask: from_json(mask)?,
                            }),
                            _ => Err(ParseError::json("masked raw value needs value and mask").into()),
                        }
                    }
                    (other, _) => Err(ParseError::json(format!("unknown raw value type \"{other}\"")).into()),
                }
            }
        }
    }
}

impl Serialize for RawValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Bytes(v) => serialize_tagged::<TAG_BYTES, _, _>(serializer, self.type_name(), v),
            Self::Masked { value, mask } => {
                if serializer.is_human_readable() {
                    #[derive(Serialize)]
                    struct Masked<'a> {
                        value: &'a Bytes,
                        mask: &'a Bytes,
                    }
                    serialize_envelope(serializer, self.type_name(), &Masked { value, mask })
                } else {
                    ciborium::tag::Required::<_, TAG_MASKED_RAW_VALUE>((value, mask)).serialize(serializer)
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

/// EUI-48 or EUI-64 address: bytes in CBOR, `aa:bb:..` in JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAddr(pub Vec<u8>);

impl MacAddr {
    pub fn valid(&self) -> Result<()> {
        match self.0.len() {
            6 | 8 => Ok(()),
            n => Err(Error::validation(format!("MAC address must be 6 or 8 bytes, got {n}"))),
        }
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{b:02x}")).collect();
        f.write_str(&parts.join(":"))
    }
}

impl std::str::FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(':')
            .map(|p| u8::from_str_radix(p, 16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| ParseError::invalid("mac-addr", format!("invalid address \"{s}\"")).into())
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?.parse().map_err(de_error)
        } else {
            Bytes::deserialize(deserializer).map(|b| Self(b.0))
        }
    }
}

/// IPv4 or IPv6 address: 4 or 16 bytes in CBOR, the usual text form in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpAddress(pub IpAddr);

impl Serialize for IpAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            match self.0 {
                IpAddr::V4(v4) => serializer.serialize_bytes(&v4.octets()),
                IpAddr::V6(v6) => serializer.serialize_bytes(&v6.octets()),
            }
        }
    }
}

impl<'de> Deserialize<'de> for IpAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map(Self)
                .map_err(de::Error::custom)
        } else {
            let bytes = Bytes::deserialize(deserializer)?;
            if let Ok(v4) = <[u8; 4]>::try_from(bytes.as_slice()) {
                Ok(Self(IpAddr::from(v4)))
            } else if let Ok(v6) = <[u8; 16]>::try_from(bytes.as_slice()) {
                Ok(Self(IpAddr::from(v6)))
            } else {
                Err(de::Error::custom(format!(
                    "IP address must be 4 or 16 bytes, got {}",
                    bytes.len()
                )))
            }
        }
    }
}

/// Register label: uint or text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterLabel {
    Uint(u64),
    Text(String),
}

impl Display for RegisterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Integrity registers (e.g. PCRs): register label to the digests it holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityRegisters(pub Vec<(RegisterLabel, Vec<HashEntry>)>);

impl IntegrityRegisters {
    pub fn add(&mut self, label: RegisterLabel, digests: Vec<HashEntry>) -> &mut Self {
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some((_, existing)) => existing.extend(digests),
            None => self.0.push((label, digests)),
        }
        self
    }

    pub fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::validation("no integrity registers"));
        }
        for (label, digests) in &self.0 {
            if digests.is_empty() {
                return Err(Error::validation(format!("register {label}: no digests")));
            }
            for (i, d) in digests.iter().enumerate() {
                d.valid()
                    .with_context(|| format!("register {label}, digest at index {i}"))?;
            }
        }
        Ok(())
    }
}

impl Serialize for IntegrityRegisters {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, digests) in &self.0 {
            match label {
                RegisterLabel::Uint(v) if is_human_readable => map.serialize_entry(&v.to_string(), digests)?,
                RegisterLabel::Uint(v) => map.serialize_entry(v, digests)?,
                RegisterLabel::Text(v) => map.serialize_entry(v, digests)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IntegrityRegisters {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct RegistersVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for RegistersVisitor {
            type Value = IntegrityRegisters;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map of integrity registers")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<IntegrityRegisters, A::Error> {
                let mut registers = IntegrityRegisters::default();
                while let Some(key) = map.next_key::<Peeked>()? {
                    let label = match key {
                        Peeked::Json(JsonValue::String(s)) if self.is_human_readable => {
                            s.parse().map_or(RegisterLabel::Text(s), RegisterLabel::Uint)
                        }
                        Peeked::Cbor(Value::Text(s)) => RegisterLabel::Text(s),
                        Peeked::Cbor(v @ Value::Integer(_)) => {
                            RegisterLabel::Uint(from_cbor(v).map_err(de_error)?)
                        }
                        _ => return Err(de::Error::custom("register label must be uint or text")),
                    };
                    registers.0.push((label, map.next_value()?));
                }
                Ok(registers)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(RegistersVisitor { is_human_readable })
    }
}

const MVAL_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "version"),
    FieldDesc::optional(1, "svn"),
    FieldDesc::optional(2, "digests"),
    FieldDesc::optional(3, "flags"),
    FieldDesc::optional(4, "raw-value"),
    FieldDesc::optional(5, "raw-value-mask"),
    FieldDesc::optional(6, "mac-addr"),
    FieldDesc::optional(7, "ip-addr"),
    FieldDesc::optional(8, "serial-number"),
    FieldDesc::optional(9, "ueid"),
    FieldDesc::optional(10, "uuid"),
    FieldDesc::optional(11, "name"),
    FieldDesc::optional(13, "crypto-keys"),
    FieldDesc::optional(14, "integrity-registers"),
];

/// Measurement values map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mval {
    pub version: Option<Version>,
    pub svn: Option<Svn>,
    pub digests: Option<Vec<HashEntry>>,
    pub flags: Option<Flags>,
    pub raw_value: Option<RawValue>,
    /// Deprecated stand-alone mask for `raw_value`
    pub raw_value_mask: Option<Bytes>,
    pub mac_addr: Option<MacAddr>,
    pub ip_addr: Option<IpAddress>,
    pub serial_number: Option<String>,
    pub ueid: Option<Ueid>,
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub crypto_keys: Option<Vec<CryptoKey>>,
    pub integrity_registers: Option<IntegrityRegisters>,
    pub extensions: ExtensionMap,
}

impl Mval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_svn(mut self, svn: Svn) -> Self {
        self.svn = Some(svn);
        self
    }

    pub fn with_digest(mut self, digest: HashEntry) -> Self {
        self.digests.get_or_insert_with(Vec::new).push(digest);
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_raw_value(mut self, raw_value: RawValue) -> Self {
        self.raw_value = Some(raw_value);
        self
    }

    pub fn with_mac_addr(mut self, mac_addr: MacAddr) -> Self {
        self.mac_addr = Some(mac_addr);
        self
    }

    pub fn with_ip_addr(mut self, ip_addr: IpAddr) -> Self {
        self.ip_addr = Some(IpAddress(ip_addr));
        self
    }

    pub fn with_serial_number<S: Into<String>>(mut self, serial_number: S) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn with_ueid(mut self, ueid: Ueid) -> Self {
        self.ueid = Some(ueid);
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_crypto_key(mut self, key: CryptoKey) -> Self {
        self.crypto_keys.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn with_integrity_registers(mut self, registers: IntegrityRegisters) -> Self {
        self.integrity_registers = Some(registers);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.svn.is_none()
            && self.digests.is_none()
            && self.flags.is_none()
            && self.raw_value.is_none()
            && self.raw_value_mask.is_none()
            && self.mac_addr.is_none()
            && self.ip_addr.is_none()
            && self.serial_number.is_none()
            && self.ueid.is_none()
            && self.uuid.is_none()
            && self.name.is_none()
            && self.crypto_keys.is_none()
            && self.integrity_registers.is_none()
            && self.extensions.is_empty()
    }

    pub fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("no measurement value set"));
        }

        if let Some(version) = &self.version {
            version.valid().context("version")?;
        }

        if let Some(digests) = &self.digests {
            if digests.is_empty() {
                return Err(Error::validation("digests: empty"));
            }
            for (i, d) in digests.iter().enumerate() {
                d.valid().with_context(|| format!("digest at index {i}"))?;
            }
        }

        if let Some(flags) = &self.flags {
            flags.valid().context("flags")?;
        }

        if let Some(raw_value) = &self.raw_value {
            raw_value.valid().context("raw value")?;
        }

        if let (Some(mask), Some(raw)) = (&self.raw_value_mask, &self.raw_value) {
            if mask.len() != raw.value().len() {
                return Err(Error::validation(
                    "raw-value-mask: length differs from raw value",
                ));
            }
        }

        if let Some(mac) = &self.mac_addr {
            mac.valid()?;
        }

        if let Some(ueid) = &self.ueid {
            ueid.valid().context("ueid")?;
        }

        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(Error::validation("empty name"));
            }
        }

        if let Some(keys) = &self.crypto_keys {
            if keys.is_empty() {
                return Err(Error::validation("crypto-keys: empty"));
            }
            for (i, k) in keys.iter().enumerate() {
                k.valid().with_context(|| format!("crypto key at index {i}"))?;
            }
        }

        if let Some(registers) = &self.integrity_registers {
            registers.valid().context("integrity registers")?;
        }

        Ok(())
    }
}

impl Serialize for Mval {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let f = MVAL_FIELDS;
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&f[0], &self.version)?;
        map.optional(&f[1], &self.svn)?;
        map.optional(&f[2], &self.digests)?;
        map.optional(&f[3], &self.flags)?;
        map.optional(&f[4], &self.raw_value)?;
        map.optional(&f[5], &self.raw_value_mask)?;
        map.optional(&f[6], &self.mac_addr)?;
        map.optional(&f[7], &self.ip_addr)?;
        map.optional(&f[8], &self.serial_number)?;
        map.optional(&f[9], &self.ueid)?;
        map.optional(&f[10], &self.uuid)?;
        map.optional(&f[11], &self.name)?;
        map.optional(&f[12], &self.crypto_keys)?;
        map.optional(&f[13], &self.integrity_registers)?;
        map.extensions(&self.extensions)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Mval {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct MvalVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for MvalVisitor {
            type Value = Mval;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a measurement-values map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Mval, A::Error> {
                let mut reader = MapReader::new(MVAL_FIELDS, self.is_human_readable);
                let mut mval = Mval::new();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => mval.version = Some(map.next_value()?),
                        FieldKey::Known(1) => mval.svn = Some(map.next_value()?),
                        FieldKey::Known(2) => mval.digests = Some(map.next_value()?),
                        FieldKey::Known(3) => mval.flags = Some(map.next_value()?),
                        FieldKey::Known(4) => mval.raw_value = Some(map.next_value()?),
                        FieldKey::Known(5) => mval.raw_value_mask = Some(map.next_value()?),
                        FieldKey::Known(6) => mval.mac_addr = Some(map.next_value()?),
                        FieldKey::Known(7) => mval.ip_addr = Some(map.next_value()?),
                        FieldKey::Known(8) => mval.serial_number = Some(map.next_value()?),
                        FieldKey::Known(9) => mval.ueid = Some(map.next_value()?),
                        FieldKey::Known(10) => mval.uuid = Some(map.next_value()?),
                        FieldKey::Known(11) => mval.name = Some(map.next_value()?),
                        FieldKey::Known(13) => mval.crypto_keys = Some(map.next_value()?),
                        FieldKey::Known(_) => mval.integrity_registers = Some(map.next_value()?),
                        FieldKey::Unknown(k) => reader.extension(&mut map, k, &mut mval.extensions)?,
                    }
                }

                reader.finish()?;
                Ok(mval)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(MvalVisitor { is_human_readable })
    }
}

const MEASUREMENT_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "mkey"),
    FieldDesc::mandatory(1, "mval"),
    FieldDesc::optional(2, "authorized-by"),
];

/// A measurement: what was measured (optional key) and its values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub key: Option<MeasurementKey>,
    pub value: Mval,
    pub authorized_by: Option<Vec<CryptoKey>>,
}

impl Measurement {
    pub fn new(value: Mval) -> Self {
        Self {
            key: None,
            value,
            authorized_by: None,
        }
    }

    pub fn with_key<K: Into<MeasurementKey>>(mut self, key: K) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_authorized_by(mut self, key: CryptoKey) -> Self {
        self.authorized_by.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn valid(&self) -> Result<()> {
        if let Some(key) = &self.key {
            key.valid().context("mkey")?;
        }

        self.value.valid()?;

        if let Some(keys) = &self.authorized_by {
            for (i, k) in keys.iter().enumerate() {
                k.valid()
                    .with_context(|| format!("authorized-by key at index {i}"))?;
            }
        }

        Ok(())
    }
}

impl Serialize for Measurement {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&MEASUREMENT_FIELDS[0], &self.key)?;
        map.field(&MEASUREMENT_FIELDS[1], &self.value)?;
        map.optional(&MEASUREMENT_FIELDS[2], &self.authorized_by)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct MeasurementVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for MeasurementVisitor {
            type Value = Measurement;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a measurement map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Measurement, A::Error> {
                let mut reader = MapReader::new(MEASUREMENT_FIELDS, self.is_human_readable);
                let mut measurement = Measurement::default();

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => measurement.key = Some(map.next_value()?),
                        FieldKey::Known(1) => measurement.value = map.next_value()?,
                        FieldKey::Known(_) => measurement.authorized_by = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(de::Error::custom(format!(
                                "unexpected measurement field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;
                Ok(measurement)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_map(MeasurementVisitor { is_human_readable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cbor, test::SerdeTestCase, HashAlgorithm};
    use hex_literal::hex;

    #[test]
    fn test_measurement_key_variants() {
        SerdeTestCase {
            value: MeasurementKey::from("cca.rim"),
            expected_json: r#"{"type":"string","value":"cca.rim"}"#,
            expected_cbor: hex!("67 63 63 61 2e 72 69 6d").to_vec(),
        }
        .run();

        SerdeTestCase {
            value: MeasurementKey::Uint(7),
            expected_json: r#"{"type":"uint","value":7}"#,
            expected_cbor: hex!("07").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_svn() {
        SerdeTestCase {
            value: Svn::Min(3),
            expected_json: r#"{"type":"min-value","value":3}"#,
            expected_cbor: hex!("d9 02 29 03").to_vec(),
        }
        .run();

        assert!(Svn::Min(3).matches(4));
        assert!(!Svn::Exact(3).matches(4));
    }

    #[test]
    fn test_mval_with_digest_and_raw_value() {
        let mval = Mval::new()
            .with_digest(HashEntry::new(HashAlgorithm::SHA256, [1u8; 32]))
            .with_raw_value(RawValue::Masked {
                value: vec![0x0f, 0xf0].into(),
                mask: vec![0xff, 0x00].into(),
            });
        mval.valid().unwrap();

        let bytes = cbor::to_vec(&mval).unwrap();
        // {2: [...], 4: 563([h'0ff0', h'ff00'])}
        assert_eq!(&bytes[..2], &hex!("a2 02"));
        assert!(bytes.ends_with(&hex!("04 d9 02 33 82 42 0f f0 42 ff 00")));
        assert_eq!(cbor::from_slice::<Mval>(&bytes).unwrap(), mval);

        let json = cbor::to_json(&mval).unwrap();
        assert!(json.contains(
            r#""raw-value":{"type":"masked-raw-value","value":{"value":"D/A=","mask":"/wA="}}"#
        ));
        assert_eq!(cbor::from_json::<Mval>(&json).unwrap(), mval);
    }

    #[test]
    fn test_empty_mval_is_invalid() {
        assert_eq!(
            Mval::new().valid().unwrap_err().to_string(),
            "no measurement value set"
        );
    }

    #[test]
    fn test_mval_digest_error_has_index() {
        let mval = Mval::new()
            .with_digest(HashEntry::new(HashAlgorithm::SHA256, [1u8; 32]))
            .with_digest(HashEntry::new(HashAlgorithm::SHA256, [1u8; 31]));

        assert_eq!(
            mval.valid().unwrap_err().to_string(),
            "digest at index 1: length mismatch for hash algorithm sha-256: want 32 bytes, got 31"
        );
    }

    #[test]
    fn test_mval_addresses() {
        let mval = Mval::new()
            .with_mac_addr("00:11:22:33:44:55".parse().unwrap())
            .with_ip_addr("192.168.0.1".parse().unwrap());
        mval.valid().unwrap();

        SerdeTestCase {
            value: mval,
            expected_json: r#"{"mac-addr":"00:11:22:33:44:55","ip-addr":"192.168.0.1"}"#,
            expected_cbor: hex!("a2 06 46 00 11 22 33 44 55 07 44 c0 a8 00 01").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_flags_and_unknown_mval_entry() {
        // {3: {0: true, 3: false}, -70: 1}
        let bytes = hex!("a2 03 a2 00 f5 03 f4 38 45 01");
        let mval: Mval = cbor::from_slice(&bytes).unwrap();

        let flags = mval.flags.as_ref().unwrap();
        assert_eq!(flags.get(Flags::IS_CONFIGURED), Some(true));
        assert_eq!(flags.get(Flags::IS_DEBUG), Some(false));
        assert_eq!(mval.extensions.get(-70), Some(&Value::from(1).into()));

        assert_eq!(cbor::to_vec(&mval).unwrap(), bytes);
    }

    #[test]
    fn test_integrity_registers() {
        let mut registers = IntegrityRegisters::default();
        registers
            .add(
                RegisterLabel::Uint(0),
                vec![HashEntry::new(HashAlgorithm::SHA256, [2u8; 32])],
            )
            .add(
                RegisterLabel::Text("pcr-ext".into()),
                vec![HashEntry::new(HashAlgorithm::SHA384, [3u8; 48])],
            );
        registers.valid().unwrap();

        let mval = Mval::new().with_integrity_registers(registers);
        let bytes = cbor::to_vec(&mval).unwrap();
        assert_eq!(cbor::from_slice::<Mval>(&bytes).unwrap(), mval);

        let json = cbor::to_json(&mval).unwrap();
        assert_eq!(cbor::from_json::<Mval>(&json).unwrap(), mval);
    }

    #[test]
    fn test_measurement_member_names() {
        let measurement = Measurement::new(
            Mval::new().with_crypto_key(CryptoKey::Bytes(vec![0xcc; 4].into())),
        )
        .with_key("cca.rim");

        SerdeTestCase {
            value: measurement,
            expected_json: r#"{"mkey":{"type":"string","value":"cca.rim"},"mval":{"crypto-keys":[{"type":"bytes","value":"zMzMzA=="}]}}"#,
            expected_cbor: hex!(
                "a2 00 67 63 63 61 2e 72 69 6d 01 a1 0d 81 d9 02 30 44 cc cc cc cc"
            )
            .to_vec(),
        }
        .run();
    }

    #[test]
    fn test_measurement_requires_value() {
        let err = cbor::from_slice::<Measurement>(&hex!("a1 00 01")).unwrap_err();
        assert!(err
            .to_string()
            .contains("missing mandatory field \"mval\" (1)"));
    }
}
