// SPDX-License-Identifier: MIT

//! Tag/codec kernel.
//!
//! Every byte string this library writes goes through [`to_vec`], which
//! produces deterministic CBOR: definite lengths only, and map entries ordered
//! by the bytewise lexicographic order of their encoded keys (so `-1` sorts
//! after `23`). Decoding goes through [`from_slice`], which accepts indefinite
//! lengths and out-of-order keys but rejects duplicate keys and values whose
//! shape does not match the registered meaning of their CBOR tag.
//!
//! The tag registry is process-wide. Built-in tags are present from the first
//! use; profiles add their own with [`register_tag`].

use std::{collections::HashMap, sync::RwLock};

use ciborium::Value;
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};

use crate::{Error, MarshalError, ParseError, RegistrationError, Result};

/// Shape check run against the content of a tagged item during decoding.
pub type TagCheck = fn(&Value) -> std::result::Result<(), String>;

#[derive(Clone, Copy)]
pub struct TagSpec {
    pub name: &'static str,
    pub check: TagCheck,
}

impl std::fmt::Debug for TagSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagSpec").field("name", &self.name).finish()
    }
}

impl PartialEq for TagSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.check as usize == other.check as usize
    }
}

pub const TAG_EPOCH_TIME: u64 = 1;
pub const TAG_URI: u64 = 32;
pub const TAG_UUID: u64 = 37;
pub const TAG_OID: u64 = 111;
pub const TAG_LEGACY_CORIM: u64 = 500;
pub const TAG_UNSIGNED_CORIM: u64 = 501;
pub const TAG_LEGACY_SIGNED_CORIM: u64 = 502;
pub const TAG_COSWID: u64 = 505;
pub const TAG_COMID: u64 = 506;
pub const TAG_COTS: u64 = 508;
pub const TAG_UEID: u64 = 550;
pub const TAG_SVN: u64 = 552;
pub const TAG_MIN_SVN: u64 = 553;
pub const TAG_PKIX_BASE64_KEY: u64 = 554;
pub const TAG_PKIX_BASE64_CERT: u64 = 555;
pub const TAG_PKIX_BASE64_CERT_PATH: u64 = 556;
pub const TAG_THUMBPRINT: u64 = 557;
pub const TAG_CERT_THUMBPRINT: u64 = 559;
pub const TAG_BYTES: u64 = 560;
pub const TAG_CERT_PATH_THUMBPRINT: u64 = 561;
pub const TAG_RAW_PUBLIC_KEY: u64 = 562;
pub const TAG_MASKED_RAW_VALUE: u64 = 563;
pub const TAG_CONCISE_EVIDENCE: u64 = 571;
pub const TAG_COSE_KEY: u64 = 600;
pub const TAG_PSA_REFVAL_ID: u64 = 601;
pub const TAG_NUMERIC_EXPRESSION: u64 = 60010;
pub const TAG_SET_DIGEST_EXPRESSION: u64 = 60020;
pub const TAG_SET_STRING_EXPRESSION: u64 = 60021;

fn is_uint(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Integer(i) if i128::from(*i) >= 0 => Ok(()),
        _ => Err("expected an unsigned integer".to_string()),
    }
}

fn is_time(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Integer(_) | Value::Float(_) => Ok(()),
        _ => Err("expected a numeric epoch".to_string()),
    }
}

fn is_text(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Text(_) => Ok(()),
        _ => Err("expected a text string".to_string()),
    }
}

fn is_bytes(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Bytes(_) => Ok(()),
        _ => Err("expected a byte string".to_string()),
    }
}

fn is_non_empty_bytes(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Bytes(b) if !b.is_empty() => Ok(()),
        Value::Bytes(_) => Err("empty byte string".to_string()),
        _ => Err("expected a byte string".to_string()),
    }
}

fn is_uuid(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Bytes(b) if b.len() == 16 => Ok(()),
        Value::Bytes(b) => Err(format!("UUID must be 16 bytes, got {}", b.len())),
        _ => Err("expected a byte string".to_string()),
    }
}

fn is_ueid(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Bytes(b) if (7..=33).contains(&b.len()) => Ok(()),
        Value::Bytes(b) => Err(format!("UEID must be 7 to 33 bytes, got {}", b.len())),
        _ => Err("expected a byte string".to_string()),
    }
}

fn is_map(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Map(_) => Ok(()),
        _ => Err("expected a map".to_string()),
    }
}

fn is_text_array(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Array(items) if items.iter().all(|i| matches!(i, Value::Text(_))) => Ok(()),
        _ => Err("expected an array of text strings".to_string()),
    }
}

fn is_digest(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (Value::Integer(_) | Value::Text(_), Value::Bytes(_)) => Ok(()),
            _ => Err("expected [alg, bytes]".to_string()),
        },
        _ => Err("expected a two-element array".to_string()),
    }
}

fn is_pair(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Array(items) if items.len() == 2 => Ok(()),
        _ => Err("expected a two-element array".to_string()),
    }
}

fn is_masked_raw_value(v: &Value) -> std::result::Result<(), String> {
    match v {
        Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (Value::Bytes(value), Value::Bytes(mask)) if value.len() == mask.len() => Ok(()),
            (Value::Bytes(_), Value::Bytes(_)) => {
                Err("value and mask must have the same length".to_string())
            }
            _ => Err("expected [bytes, bytes]".to_string()),
        },
        _ => Err("expected a two-element array".to_string()),
    }
}

fn builtin_tags() -> HashMap<u64, TagSpec> {
    let entries: [(u64, &'static str, TagCheck); 28] = [
        (TAG_EPOCH_TIME, "epoch-time", is_time),
        (TAG_URI, "uri", is_text),
        (TAG_UUID, "uuid", is_uuid),
        (TAG_OID, "oid", is_non_empty_bytes),
        (TAG_LEGACY_CORIM, "legacy-corim", |_| Ok(())),
        (TAG_UNSIGNED_CORIM, "unsigned-corim", is_map),
        (TAG_LEGACY_SIGNED_CORIM, "legacy-signed-corim", |_| Ok(())),
        (TAG_COSWID, "coswid", is_non_empty_bytes),
        (TAG_COMID, "comid", is_non_empty_bytes),
        (TAG_COTS, "cots", is_non_empty_bytes),
        (TAG_UEID, "ueid", is_ueid),
        (TAG_SVN, "exact-value", is_uint),
        (TAG_MIN_SVN, "min-value", is_uint),
        (TAG_PKIX_BASE64_KEY, "pkix-base64-key", is_text),
        (TAG_PKIX_BASE64_CERT, "pkix-base64-cert", is_text),
        (TAG_PKIX_BASE64_CERT_PATH, "pkix-base64-cert-path", is_text_array),
        (TAG_THUMBPRINT, "thumbprint", is_digest),
        (TAG_CERT_THUMBPRINT, "cert-thumbprint", is_digest),
        (TAG_BYTES, "bytes", is_bytes),
        (TAG_CERT_PATH_THUMBPRINT, "cert-path-thumbprint", is_digest),
        (TAG_RAW_PUBLIC_KEY, "raw-public-key", is_non_empty_bytes),
        (TAG_MASKED_RAW_VALUE, "masked-raw-value", is_masked_raw_value),
        (TAG_CONCISE_EVIDENCE, "concise-evidence", is_map),
        (TAG_COSE_KEY, "cose-key", is_map),
        (TAG_PSA_REFVAL_ID, "psa.refval-id", is_map),
        (TAG_NUMERIC_EXPRESSION, "numeric-expression", is_pair),
        (TAG_SET_DIGEST_EXPRESSION, "set-digest-expression", is_pair),
        (TAG_SET_STRING_EXPRESSION, "set-string-expression", is_pair),
    ];

    entries
        .into_iter()
        .map(|(n, name, check)| (n, TagSpec { name, check }))
        .collect()
}

static TAGS: Lazy<RwLock<HashMap<u64, TagSpec>>> = Lazy::new(|| RwLock::new(builtin_tags()));

/// Registers a CBOR tag. Registering the same (name, check) pair again is a
/// no-op; anything else already holding the number is a conflict.
pub fn register_tag(number: u64, name: &'static str, check: TagCheck) -> Result<()> {
    let spec = TagSpec { name, check };
    let mut tags = TAGS
        .write()
        .map_err(|_| Error::marshal("tag registry lock poisoned"))?;

    match tags.get(&number) {
        Some(existing) if *existing == spec => Ok(()),
        Some(_) => Err(RegistrationError::DuplicateTag(number).into()),
        None => {
            debug!(tag = number, name, "registered CBOR tag");
            tags.insert(number, spec);
            Ok(())
        }
    }
}

/// Looks up a registered tag.
pub fn registered_tag(number: u64) -> Option<TagSpec> {
    TAGS.read().ok().and_then(|tags| tags.get(&number).copied())
}

/// Encodes `value` as deterministic CBOR.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = to_value(value)?;
    value_to_vec(&value)
}

/// Encodes `value` into a canonicalized [`Value`] tree.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    let mut raw = vec![];
    ciborium::into_writer(value, &mut raw).map_err(ser_error)?;
    let parsed: Value =
        ciborium::from_reader(raw.as_slice()).map_err(|e| Error::marshal(de_message(e)))?;
    canonicalize(parsed)
}

/// Writes an already-canonical [`Value`] tree.
pub fn value_to_vec(value: &Value) -> Result<Vec<u8>> {
    let mut out = vec![];
    ciborium::into_writer(value, &mut out).map_err(ser_error)?;
    trace!(len = out.len(), "encoded deterministic CBOR");
    Ok(out)
}

/// Decodes a single CBOR item from `bytes`, rejecting trailing data,
/// duplicate map keys and mis-shaped registered tags.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value = value_from_slice(bytes)?;
    from_value(value)
}

/// Parses and checks `bytes` without mapping them to a model type.
pub fn value_from_slice(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Err(ParseError::cbor("empty input").into());
    }

    let mut reader = bytes;
    let value: Value = ciborium::from_reader(&mut reader)
        .map_err(|e| Error::Parse(ParseError::cbor(de_message(e))))?;

    if !reader.is_empty() {
        return Err(ParseError::cbor(format!("{} trailing bytes", reader.len())).into());
    }

    check_value(&value)?;
    Ok(value)
}

/// Maps an already-parsed [`Value`] onto a model type.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    let mut raw = vec![];
    ciborium::into_writer(&value, &mut raw).map_err(ser_error)?;
    ciborium::from_reader(raw.as_slice()).map_err(|e| ParseError::cbor(de_message(e)).into())
}

/// Sorts every map in the tree by the encoding of its keys, failing on
/// duplicates.
pub fn canonicalize(value: Value) -> Result<Value> {
    Ok(match value {
        Value::Map(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let k = canonicalize(k)?;
                let v = canonicalize(v)?;
                keyed.push((value_to_vec(&k)?, k, v));
            }

            keyed.sort_by(|a, b| a.0.cmp(&b.0));

            for pair in keyed.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(MarshalError(format!(
                        "duplicate map key {}",
                        describe_key(&pair[0].1)
                    ))
                    .into());
                }
            }

            Value::Map(keyed.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(canonicalize)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Tag(n, inner) => Value::Tag(n, Box::new(canonicalize(*inner)?)),
        other => other,
    })
}

fn check_value(value: &Value) -> Result<()> {
    match value {
        Value::Map(entries) => {
            let mut seen = std::collections::HashSet::with_capacity(entries.len());
            for (k, v) in entries {
                let encoded = value_to_vec(k)?;
                if !seen.insert(encoded) {
                    return Err(ParseError::DuplicateKey(describe_key(k)).into());
                }
                check_value(k)?;
                check_value(v)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(check_value),
        Value::Tag(n, inner) => {
            if let Some(spec) = registered_tag(*n) {
                (spec.check)(inner).map_err(|detail| {
                    Error::Parse(ParseError::invalid(format!("tag {n} ({})", spec.name), detail))
                })?;
            }
            check_value(inner)
        }
        _ => Ok(()),
    }
}

/// Human readable rendering of a map key for error messages.
pub fn describe_key(key: &Value) -> String {
    match key {
        Value::Integer(i) => i128::from(*i).to_string(),
        Value::Text(s) => format!("\"{s}\""),
        other => format!("{other:?}"),
    }
}

/// Strips a leading two-byte-argument tag header (`0xd9 hi lo`).
pub fn strip_tag_prefix(bytes: &[u8], tag: u64) -> Option<&[u8]> {
    let tag = u16::try_from(tag).ok()?;
    let [hi, lo] = tag.to_be_bytes();
    match bytes {
        [0xd9, h, l, rest @ ..] if *h == hi && *l == lo && tag > 0xff => Some(rest),
        _ => None,
    }
}

/// Two-byte-argument tag header for tags 256..=65535.
pub fn tag_prefix(tag: u16) -> [u8; 3] {
    let [hi, lo] = tag.to_be_bytes();
    [0xd9, hi, lo]
}

pub(crate) fn de_message<E: std::fmt::Debug>(err: ciborium::de::Error<E>) -> String {
    match err {
        ciborium::de::Error::Io(e) => format!("I/O error: {e:?}"),
        ciborium::de::Error::Syntax(offset) => format!("syntax error at offset {offset}"),
        ciborium::de::Error::Semantic(_, msg) => msg,
        ciborium::de::Error::RecursionLimitExceeded => "recursion limit exceeded".to_string(),
    }
}

fn ser_error<E: std::fmt::Debug>(err: ciborium::ser::Error<E>) -> Error {
    match err {
        ciborium::ser::Error::Io(e) => Error::marshal(format!("I/O error: {e:?}")),
        ciborium::ser::Error::Value(msg) => Error::marshal(msg),
    }
}

/// Encodes `value` as compact JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::marshal)
}

/// Encodes `value` as indented JSON.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Error::marshal)
}

/// Decodes a JSON document.
pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| ParseError::json(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::collections::HashMap;

    #[test]
    fn test_negative_keys_sort_after_small_positive_keys() {
        let mut map: HashMap<i64, u8> = HashMap::new();
        map.insert(-3, 4);
        map.insert(8, 2);
        map.insert(-1, 3);
        map.insert(0, 1);

        let bytes = to_vec(&map).unwrap();
        assert_eq!(bytes, hex!("a4 00 01 08 02 20 03 22 04"));
    }

    #[test]
    fn test_indefinite_lengths_are_accepted_on_decode() {
        let value = value_from_slice(&hex!("bf 01 9f 02 03 ff ff")).unwrap();
        assert_eq!(
            value_to_vec(&canonicalize(value).unwrap()).unwrap(),
            hex!("a1 01 82 02 03")
        );
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let err = value_from_slice(&hex!("a2 01 01 01 02")).unwrap_err();
        assert_eq!(err, Error::Parse(ParseError::DuplicateKey("1".to_string())));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let err = value_from_slice(&hex!("01 02")).unwrap_err();
        assert!(err.to_string().contains("1 trailing bytes"));
    }

    #[test]
    fn test_registered_tag_shape_is_checked() {
        // tag 37 wrapping a 2-byte string
        let err = value_from_slice(&hex!("d8 25 42 00 01")).unwrap_err();
        assert!(err.to_string().contains("UUID must be 16 bytes"));
    }

    #[test]
    fn test_register_tag_is_idempotent_but_rejects_conflicts() {
        fn check(_: &Value) -> std::result::Result<(), String> {
            Ok(())
        }

        register_tag(65000, "test-tag", check).unwrap();
        register_tag(65000, "test-tag", check).unwrap();

        let err = register_tag(65000, "other-name", check).unwrap_err();
        assert_eq!(err, Error::Registration(RegistrationError::DuplicateTag(65000)));

        let err = register_tag(TAG_UUID, "uuid2", check).unwrap_err();
        assert_eq!(err, Error::Registration(RegistrationError::DuplicateTag(37)));
    }

    #[test]
    fn test_strip_tag_prefix() {
        let bytes = hex!("d9 01 f5 a0");
        assert_eq!(strip_tag_prefix(&bytes, 501), Some(&hex!("a0")[..]));
        assert_eq!(strip_tag_prefix(&bytes, 500), None);
        assert_eq!(tag_prefix(501), hex!("d9 01 f5"));
    }
}
