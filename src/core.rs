// SPDX-License-Identifier: MIT

//! Leaf types shared by every document kind: byte strings, UUIDs, UEIDs,
//! OIDs, tagged URIs, tag identifiers, digests, times and validity periods.

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use ciborium::{tag::Required, Value};
use derive_more::{AsRef, Deref, From};
use serde::{
    de::{self, Visitor},
    Deserialize, Serialize,
};

use crate::{
    cbor::{TAG_EPOCH_TIME, TAG_URI},
    choice::Peeked,
    fields::{FieldDesc, FieldKey, MapReader, MapWriter},
    Error, FixedBytes, ParseError, Result, UnsupportedError, ValidationError,
};

/// An untagged byte string: CBOR bstr, base64 JSON string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, AsRef, Deref)]
pub struct Bytes(pub Vec<u8>);

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(&self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Bytes;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a byte string or base64 text")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Bytes, E> {
                Ok(Bytes(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Bytes, E> {
                Ok(Bytes(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Bytes, E> {
                STANDARD.decode(v).map(Bytes).map_err(de::Error::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(BytesVisitor)
        } else {
            deserializer.deserialize_bytes(BytesVisitor)
        }
    }
}

impl crate::Empty for Bytes {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A 16-byte UUID; a bstr in CBOR and the hyphenated form in JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, AsRef)]
pub struct Uuid(pub FixedBytes<16>);

impl Uuid {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0 .0
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(value: [u8; 16]) -> Self {
        Self(FixedBytes(value))
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        FixedBytes::try_from(value)
            .map(Self)
            .map_err(|e| ValidationError::new(format!("UUID: {e}")).into())
    }
}

impl FromStr for Uuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        let well_formed = hex.len() == 32
            && s.len() == 36
            && [8, 13, 18, 23]
                .iter()
                .all(|i| s.as_bytes().get(*i) == Some(&b'-'));

        if !well_formed {
            return Err(ValidationError::new(format!("invalid UUID string \"{s}\"")).into());
        }

        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
                .map_err(|_| ValidationError::new(format!("invalid UUID string \"{s}\"")))?;
        }
        Ok(out.into())
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for Uuid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            FixedBytes::<16>::deserialize(deserializer).map(Self)
        }
    }
}

/// Universal Entity ID (EAT). The first byte gives the type: 0x01 random
/// (16, 24 or 32 more bytes), 0x02 IEEE EUI (6 more), 0x03 IMEI (14 more).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, AsRef, Deref)]
pub struct Ueid(pub Bytes);

impl Ueid {
    pub const TYPE_RAND: u8 = 0x01;
    pub const TYPE_EUI: u8 = 0x02;
    pub const TYPE_IMEI: u8 = 0x03;

    pub fn valid(&self) -> Result<()> {
        let len = self.0.len();
        let ok = match self.0.first() {
            Some(&Self::TYPE_RAND) => matches!(len, 17 | 25 | 33),
            Some(&Self::TYPE_EUI) => len == 7,
            Some(&Self::TYPE_IMEI) => len == 15,
            Some(t) => {
                return Err(Error::validation(format!("unknown UEID type 0x{t:02x}")));
            }
            None => return Err(Error::validation("empty UEID")),
        };

        if ok {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "invalid UEID length {len} for type 0x{:02x}",
                self.0[0]
            )))
        }
    }
}

impl From<Vec<u8>> for Ueid {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes(value))
    }
}

impl Serialize for Ueid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ueid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Bytes::deserialize(deserializer).map(Self)
    }
}

/// An object identifier in BER form; a bstr in CBOR and dotted text in JSON.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u8>);

impl Oid {
    pub fn from_ber(bytes: &[u8]) -> Result<Self> {
        let oid = Self(bytes.to_vec());
        oid.arcs()?;
        Ok(oid)
    }

    /// For identifiers whose encoding is fixed in this crate.
    pub(crate) fn from_static_ber(bytes: &'static [u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_ber(&self) -> &[u8] {
        &self.0
    }

    pub fn arcs(&self) -> Result<Vec<u64>> {
        let invalid = || Error::validation(format!("invalid OID encoding {:02x?}", self.0));

        if self.0.is_empty() || self.0.last().map_or(true, |b| b & 0x80 != 0) {
            return Err(invalid());
        }

        let mut subids = vec![];
        let mut acc: u64 = 0;
        for (i, b) in self.0.iter().enumerate() {
            if acc == 0 && *b == 0x80 && (i == 0 || self.0[i - 1] & 0x80 == 0) {
                return Err(invalid());
            }
            acc = acc.checked_mul(128).ok_or_else(invalid)? | u64::from(b & 0x7f);
            if b & 0x80 == 0 {
                subids.push(acc);
                acc = 0;
            }
        }

        let first = subids[0];
        let mut arcs = match first {
            0..=39 => vec![0, first],
            40..=79 => vec![1, first - 40],
            _ => vec![2, first - 80],
        };
        arcs.extend_from_slice(&subids[1..]);
        Ok(arcs)
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("invalid OID \"{s}\""));
        let arcs = s
            .split('.')
            .map(|a| a.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;

        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
            return Err(invalid());
        }

        let mut out = vec![];
        let mut push = |mut v: u64| {
            let mut chunk = vec![(v & 0x7f) as u8];
            v >>= 7;
            while v > 0 {
                chunk.push((v & 0x7f) as u8 | 0x80);
                v >>= 7;
            }
            chunk.reverse();
            out.extend(chunk);
        };

        let first = arcs[0]
            .checked_mul(40)
            .and_then(|v| v.checked_add(arcs[1]))
            .ok_or_else(invalid)?;
        push(first);
        arcs[2..].iter().for_each(|a| push(*a));

        Ok(Self(out))
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.arcs() {
            Ok(arcs) => {
                let parts: Vec<String> = arcs.iter().map(u64::to_string).collect();
                f.write_str(&parts.join("."))
            }
            Err(_) => write!(f, "{:02x?}", self.0),
        }
    }
}

impl Serialize for Oid {
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

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            let bytes = Bytes::deserialize(deserializer)?;
            Oid::from_ber(&bytes).map_err(de::Error::custom)
        }
    }
}

/// A URI carried under CBOR tag 32; a plain string in JSON.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, From, AsRef, Deref)]
pub struct TaggedUri(pub String);

impl TaggedUri {
    pub fn new<U: Into<String>>(uri: U) -> Self {
        Self(uri.into())
    }

    /// The URI must be non-empty and absolute.
    pub fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::validation("empty URI"));
        }
        url::Url::parse(&self.0)
            .map(|_| ())
            .map_err(|e| Error::validation(format!("invalid URI \"{}\": {e}", self.0)))
    }
}

impl From<&str> for TaggedUri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for TaggedUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TaggedUri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0)
        } else {
            Required::<&str, TAG_URI>(&self.0).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for TaggedUri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer).map(Self)
        } else {
            ciborium::tag::Accepted::<String, TAG_URI>::deserialize(deserializer)
                .map(|t| Self(t.0))
        }
    }
}

/// Tag (and CoRIM) identifier: text or UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagId {
    Text(String),
    Uuid(Uuid),
}

impl TagId {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Uuid(_) => None,
        }
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Text(s) if s.is_empty() => Err(Error::validation("empty tag id")),
            _ => Ok(()),
        }
    }
}

impl From<&str> for TagId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TagId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for TagId {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl Serialize for TagId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Uuid(u) => u.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TagId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct TagIdVisitor {
            is_human_readable: bool,
        }

        impl<'de> Visitor<'de> for TagIdVisitor {
            type Value = TagId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or 16 bytes of a UUID")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<TagId, E> {
                if self.is_human_readable {
                    if let Ok(uuid) = v.parse::<Uuid>() {
                        return Ok(TagId::Uuid(uuid));
                    }
                }
                Ok(TagId::Text(v.to_string()))
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<TagId, E> {
                Uuid::try_from(v).map(TagId::Uuid).map_err(de::Error::custom)
            }
        }

        let is_human_readable = deserializer.is_human_readable();
        deserializer.deserialize_any(TagIdVisitor { is_human_readable })
    }
}

/// IANA "Named Information Hash Algorithm" registry entries this library
/// knows the digest size of.
const HASH_ALGORITHMS: &[(i64, &str, usize)] = &[
    (1, "sha-256", 32),
    (2, "sha-256-128", 16),
    (3, "sha-256-120", 15),
    (4, "sha-256-96", 12),
    (5, "sha-256-64", 8),
    (6, "sha-256-32", 4),
    (7, "sha-384-truncated", 48),
    (8, "sha-384", 48),
    (9, "sha3-224", 28),
    (10, "sha3-256", 32),
    (11, "sha3-384", 48),
    (12, "sha3-512", 64),
];

/// Hash algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashAlgorithm(pub i64);

impl HashAlgorithm {
    pub const SHA256: Self = Self(1);
    pub const SHA384: Self = Self(8);
    pub const SHA3_256: Self = Self(10);
    pub const SHA3_512: Self = Self(12);

    fn entry(&self) -> Option<&'static (i64, &'static str, usize)> {
        HASH_ALGORITHMS.iter().find(|(id, _, _)| *id == self.0)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        HASH_ALGORITHMS
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(id, _, _)| Self(*id))
    }

    pub fn name(&self) -> Option<&'static str> {
        self.entry().map(|(_, name, _)| *name)
    }

    pub fn digest_len(&self) -> Option<usize> {
        self.entry().map(|(_, _, len)| *len)
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A digest: `[alg, bytes]` in CBOR, `"<alg>;<base64>"` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashEntry {
    pub alg: HashAlgorithm,
    pub value: Bytes,
}

impl HashEntry {
    pub fn new<B: Into<Bytes>>(alg: HashAlgorithm, value: B) -> Self {
        Self {
            alg,
            value: value.into(),
        }
    }

    /// The algorithm must be registered and the value must have its length.
    pub fn valid(&self) -> Result<()> {
        let expected = self.alg.digest_len().ok_or_else(|| {
            Error::from(UnsupportedError::HashAlgorithm(self.alg.0.to_string()))
        })?;

        if self.value.len() != expected {
            return Err(Error::validation(format!(
                "length mismatch for hash algorithm {}: want {} bytes, got {}",
                self.alg,
                expected,
                self.value.len()
            )));
        }

        Ok(())
    }

    /// Text form with the given separator between algorithm and base64 value.
    pub fn to_text(&self, separator: char) -> String {
        format!("{}{}{}", self.alg, separator, STANDARD.encode(&self.value.0))
    }

    /// Parses `"<alg>;<base64>"` or `"<alg>:<base64>"`.
    pub fn from_text(text: &str) -> Result<Self> {
        let (alg, value) = text
            .split_once([';', ':'])
            .ok_or_else(|| ParseError::invalid("hash entry", format!("no separator in \"{text}\"")))?;

        let alg = HashAlgorithm::from_name(alg)
            .or_else(|| alg.parse::<i64>().ok().map(HashAlgorithm))
            .ok_or_else(|| UnsupportedError::HashAlgorithm(alg.to_string()))?;

        let value = STANDARD
            .decode(value)
            .map_err(|e| ParseError::invalid("hash entry", e))?;

        Ok(Self::new(alg, value))
    }
}

impl Serialize for HashEntry {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_text(';'))
        } else {
            (self.alg.0, &self.value).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for HashEntry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Peeked::deserialize(deserializer)? {
            Peeked::Json(serde_json::Value::String(s)) => {
                HashEntry::from_text(&s).map_err(de::Error::custom)
            }
            Peeked::Json(other) => Err(de::Error::custom(format!(
                "expected \"<alg>;<base64>\", found {other}"
            ))),
            Peeked::Cbor(Value::Array(items)) if items.len() == 2 => {
                let alg = match &items[0] {
                    Value::Integer(i) => i64::try_from(i128::from(*i))
                        .map(HashAlgorithm)
                        .map_err(de::Error::custom)?,
                    Value::Text(name) => HashAlgorithm::from_name(name).ok_or_else(|| {
                        de::Error::custom(UnsupportedError::HashAlgorithm(name.clone()))
                    })?,
                    _ => return Err(de::Error::custom("hash algorithm must be int or text")),
                };
                let value = match &items[1] {
                    Value::Bytes(b) => Bytes(b.clone()),
                    _ => return Err(de::Error::custom("hash value must be a byte string")),
                };
                Ok(HashEntry { alg, value })
            }
            Peeked::Cbor(_) => Err(de::Error::custom("expected a [alg, bytes] array")),
        }
    }
}

/// A point in time: CBOR tag 1 epoch seconds, RFC 3339 (UTC) in JSON.
///
/// Held at whole-second precision so both encodings carry the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deref)]
pub struct Time(DateTime<Utc>);

impl From<DateTime<Utc>> for Time {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t.trunc_subsecs(0))
    }
}

impl Time {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn from_timestamp(secs: i64) -> Result<Self> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| Error::validation(format!("time {secs} out of range")))
    }

    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }
}

impl FromStr for Time {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s)
            .map(|t| Self::from(t.with_timezone(&Utc)))
            .map_err(|e| ParseError::invalid("time", format!("\"{s}\": {e}")).into())
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            Required::<i64, TAG_EPOCH_TIME>(self.0.timestamp()).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let secs = match Peeked::deserialize(deserializer)? {
            Peeked::Json(serde_json::Value::String(s)) => {
                return s.parse().map_err(de::Error::custom)
            }
            Peeked::Json(other) => {
                return Err(de::Error::custom(format!(
                    "expected an RFC 3339 string, found {other}"
                )))
            }
            Peeked::Cbor(Value::Tag(TAG_EPOCH_TIME, inner)) | Peeked::Cbor(Value::Tag(0, inner)) => {
                epoch_seconds(*inner)
            }
            Peeked::Cbor(other) => epoch_seconds(other),
        }
        .map_err(de::Error::custom)?;

        Time::from_timestamp(secs).map_err(de::Error::custom)
    }
}

fn epoch_seconds(value: Value) -> std::result::Result<i64, String> {
    match value {
        Value::Integer(i) => i64::try_from(i128::from(i)).map_err(|e| e.to_string()),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::Text(s) => s
            .parse::<Time>()
            .map(|t| t.timestamp())
            .map_err(|e| e.to_string()),
        _ => Err("expected an epoch time".to_string()),
    }
}

const VALIDITY_FIELDS: &[FieldDesc] = &[
    FieldDesc::optional(0, "not-before"),
    FieldDesc::mandatory(1, "not-after"),
];

/// Validity period. `not_after` is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    pub not_before: Option<Time>,
    pub not_after: Time,
}

impl Validity {
    pub fn new(not_before: Option<Time>, not_after: Time) -> Result<Self> {
        let validity = Self {
            not_before,
            not_after,
        };
        validity.valid()?;
        Ok(validity)
    }

    pub fn valid(&self) -> Result<()> {
        match self.not_before {
            Some(nb) if nb > self.not_after => Err(Error::validation(format!(
                "not-before ({nb}) is after not-after ({})",
                self.not_after
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_valid_at(&self, time: Time) -> bool {
        self.not_before.map_or(true, |nb| nb <= time) && time <= self.not_after
    }

    /// Fails if `time` falls outside the period.
    pub fn check_at(&self, time: Time) -> Result<()> {
        if time > self.not_after {
            return Err(Error::validation(format!("expired at {}", self.not_after)));
        }
        if let Some(nb) = self.not_before {
            if time < nb {
                return Err(Error::validation(format!("not valid before {nb}")));
            }
        }
        Ok(())
    }
}

impl Serialize for Validity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = MapWriter::begin(serializer)?;
        map.optional(&VALIDITY_FIELDS[0], &self.not_before)?;
        map.field(&VALIDITY_FIELDS[1], &self.not_after)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Validity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ValidityVisitor<'a> {
            is_human_readable: bool,
            marker: PhantomData<&'a ()>,
        }

        impl<'de> Visitor<'de> for ValidityVisitor<'_> {
            type Value = Validity;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing Validity fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut reader = MapReader::new(VALIDITY_FIELDS, self.is_human_readable);
                let mut not_before = None;
                let mut not_after = None;

                while let Some(key) = reader.next_key(&mut map)? {
                    match key {
                        FieldKey::Known(0) => not_before = Some(map.next_value()?),
                        FieldKey::Known(_) => not_after = Some(map.next_value()?),
                        FieldKey::Unknown(k) => {
                            return Err(de::Error::custom(format!(
                                "unexpected validity field {k:?}"
                            )))
                        }
                    }
                }

                reader.finish()?;

                match not_after {
                    Some(not_after) => Ok(Validity {
                        not_before,
                        not_after,
                    }),
                    None => Err(de::Error::custom("missing not-after")),
                }
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(ValidityVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cbor, test::SerdeTestCase};
    use hex_literal::hex;

    #[test]
    fn test_uuid_text_form() {
        let uuid: Uuid = "31fb5abf-023e-4992-aa4e-95f9c1503bfa".parse().unwrap();
        assert_eq!(uuid.as_bytes()[0], 0x31);
        assert_eq!(uuid.to_string(), "31fb5abf-023e-4992-aa4e-95f9c1503bfa");
        assert!("31fb5abf023e4992aa4e95f9c1503bfa".parse::<Uuid>().is_err());
    }

    #[test]
    fn test_oid_ber_round_trip() {
        let oid: Oid = "2.16.840.1.113741.1.16.1".parse().unwrap();
        assert_eq!(oid.as_ber(), &hex!("60 86 48 01 86 f8 4d 01 10 01")[..]);
        assert_eq!(oid.to_string(), "2.16.840.1.113741.1.16.1");

        assert!(Oid::from_ber(&[0x86]).is_err());
        assert!("3.1".parse::<Oid>().is_err());
        assert!("2.18446744073709551615".parse::<Oid>().is_err());
        assert!("2.18446744073709551535".parse::<Oid>().is_ok());
    }

    #[test]
    fn test_ueid_lengths() {
        let mut rand = vec![0x01];
        rand.extend([0xaa; 32]);
        assert!(Ueid::from(rand).valid().is_ok());

        assert!(Ueid::from(vec![0x02, 1, 2, 3, 4, 5, 6]).valid().is_ok());
        assert!(Ueid::from(vec![0x01, 1, 2, 3]).valid().is_err());
        assert!(Ueid::from(vec![0x07; 8]).valid().is_err());
    }

    #[test]
    fn test_tagged_uri() {
        SerdeTestCase {
            value: TaggedUri::new("https://example.com"),
            expected_json: r#""https://example.com""#,
            expected_cbor: [
                &hex!("d8 20 73")[..],
                "https://example.com".as_bytes(),
            ]
            .concat(),
        }
        .run();

        assert!(TaggedUri::new("https://example.com").valid().is_ok());
        assert!(TaggedUri::new("example.com/relative").valid().is_err());
    }

    #[test]
    fn test_hash_entry() {
        let entry = HashEntry::new(HashAlgorithm::SHA256, [0xab; 32]);
        entry.valid().unwrap();

        SerdeTestCase {
            value: entry.clone(),
            expected_json: r#""sha-256;q6urq6urq6urq6urq6urq6urq6urq6urq6urq6urq6s=""#,
            expected_cbor: [&hex!("82 01 58 20")[..], &[0xab; 32]].concat(),
        }
        .run();

        let colon = HashEntry::from_text("sha-256:q6urq6urq6urq6urq6urq6urq6urq6urq6urq6urq6s=")
            .unwrap();
        assert_eq!(colon, entry);

        let err = HashEntry::new(HashAlgorithm::SHA384, [0u8; 32]).valid().unwrap_err();
        assert_eq!(
            err.to_string(),
            "length mismatch for hash algorithm sha-384: want 48 bytes, got 32"
        );
    }

    #[test]
    fn test_hash_algorithm_registry_numbering() {
        assert_eq!(HashAlgorithm::from_name("sha-384"), Some(HashAlgorithm(8)));
        assert_eq!(HashAlgorithm::SHA384.digest_len(), Some(48));
        assert_eq!(HashAlgorithm(7).name(), Some("sha-384-truncated"));
        assert_eq!(HashAlgorithm::SHA3_512.digest_len(), Some(64));

        let entry = HashEntry::from_text(&format!("sha-384;{}", "A".repeat(64))).unwrap();
        assert_eq!(entry.alg, HashAlgorithm::SHA384);
        assert_eq!(
            cbor::to_vec(&entry).unwrap(),
            [&hex!("82 08 58 30")[..], &[0u8; 48]].concat()
        );
    }

    #[test]
    fn test_hash_entry_text_alg_in_cbor() {
        // ["sha-256", h'00..']
        let mut bytes = hex!("82 67 73 68 61 2d 32 35 36 58 20").to_vec();
        bytes.extend([0u8; 32]);
        let entry: HashEntry = cbor::from_slice(&bytes).unwrap();
        assert_eq!(entry.alg, HashAlgorithm::SHA256);
    }

    #[test]
    fn test_time_encoding() {
        SerdeTestCase {
            value: Time::from_timestamp(1_700_000_000).unwrap(),
            expected_json: r#""2023-11-14T22:13:20Z""#,
            expected_cbor: hex!("c1 1a 65 53 f1 00").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_time_drops_subsecond_precision() {
        let now = Time::now();
        let bytes = cbor::to_vec(&now).unwrap();
        assert_eq!(cbor::from_slice::<Time>(&bytes).unwrap(), now);

        let parsed: Time = "2023-11-14T22:13:20.75Z".parse().unwrap();
        assert_eq!(parsed, Time::from_timestamp(1_700_000_000).unwrap());
        assert_eq!(cbor::to_json(&parsed).unwrap(), r#""2023-11-14T22:13:20Z""#);
    }

    #[test]
    fn test_validity() {
        let before = Time::from_timestamp(1_000).unwrap();
        let after = Time::from_timestamp(2_000).unwrap();

        let validity = Validity::new(Some(before), after).unwrap();
        assert!(validity.is_valid_at(Time::from_timestamp(1_500).unwrap()));
        assert!(validity
            .check_at(Time::from_timestamp(2_001).unwrap())
            .unwrap_err()
            .to_string()
            .starts_with("expired"));

        assert!(Validity::new(Some(after), before).is_err());

        SerdeTestCase {
            value: validity,
            expected_json: r#"{"not-before":"1970-01-01T00:16:40Z","not-after":"1970-01-01T00:33:20Z"}"#,
            expected_cbor: hex!("a2 00 c1 19 03 e8 01 c1 19 07 d0").to_vec(),
        }
        .run();

        let err = cbor::from_slice::<Validity>(&hex!("a1 00 c1 19 03 e8")).unwrap_err();
        assert!(err
            .to_string()
            .contains("missing mandatory field \"not-after\" (1)"));
    }

    #[test]
    fn test_tag_id() {
        SerdeTestCase {
            value: TagId::from("vendor.example/prod/1"),
            expected_json: r#""vendor.example/prod/1""#,
            expected_cbor: [&hex!("75")[..], "vendor.example/prod/1".as_bytes()].concat(),
        }
        .run();

        let uuid: TagId = cbor::from_json(r#""31fb5abf-023e-4992-aa4e-95f9c1503bfa""#).unwrap();
        assert!(matches!(uuid, TagId::Uuid(_)));
    }
}
