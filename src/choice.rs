// SPDX-License-Identifier: MIT

//! Tagged-choice plumbing.
//!
//! Every polymorphic field is a Rust enum. In CBOR each variant is told apart
//! by its CBOR tag (or, for the few untagged variants, by its major type); in
//! JSON it is wrapped in a `{"type": <name>, "value": <payload>}` envelope.
//!
//! Besides their built-in variants, the class-id, instance-id, group-id,
//! measurement-key, crypto-key and entity-name choices accept variants
//! registered at runtime (typically by a profile) through
//! [`register_variant`]. Those decode into a [`RegisteredChoice`].

use std::{collections::HashMap, fmt::Display, sync::Arc, sync::RwLock};

use ciborium::Value;
use once_cell::sync::Lazy;
use serde::{
    de::{self, DeserializeOwned},
    ser::SerializeMap,
    Deserialize, Serialize, Serializer,
};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    cbor, Error, ExtensionValue, FieldCodec, ParseError, RegistrationError, Result, ResultExt,
    TypedCodec, UnsupportedError,
};

/// Choice types that accept registered variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceKind {
    ClassId,
    InstanceId,
    GroupId,
    MeasurementKey,
    CryptoKey,
    EntityName,
}

impl ChoiceKind {
    /// Tags and type names taken by built-in variants.
    fn reserved(&self) -> (&'static [u64], &'static [&'static str]) {
        match self {
            Self::ClassId => (&[111, 37, 560], &["oid", "uuid", "bytes", "int"]),
            Self::InstanceId => (&[37, 550, 560], &["uuid", "ueid", "bytes", "int", "string"]),
            Self::GroupId => (&[37, 560], &["uuid", "bytes"]),
            Self::MeasurementKey => (&[111, 37], &["oid", "uuid", "uint", "string"]),
            Self::CryptoKey => (
                &[554, 555, 556, 557, 559, 560, 561, 562, 600],
                &[
                    "pkix-base64-key",
                    "pkix-base64-cert",
                    "pkix-base64-cert-path",
                    "thumbprint",
                    "cert-thumbprint",
                    "bytes",
                    "cert-path-thumbprint",
                    "raw-public-key",
                    "cose-key",
                ],
            ),
            Self::EntityName => (&[], &["string"]),
        }
    }
}

impl Display for ChoiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ClassId => "class-id",
            Self::InstanceId => "instance-id",
            Self::GroupId => "group-id",
            Self::MeasurementKey => "measurement-key",
            Self::CryptoKey => "crypto-key",
            Self::EntityName => "entity-name",
        })
    }
}

/// Semantic check run by [`RegisteredChoice::valid`] on the payload.
pub type VariantCheck = fn(&Value) -> Result<()>;

/// A runtime-registered choice variant.
#[derive(Clone)]
pub struct VariantSpec {
    pub tag: u64,
    pub type_name: String,
    pub codec: Arc<dyn FieldCodec>,
    pub check: Option<VariantCheck>,
}

impl VariantSpec {
    pub fn new<T: Serialize + DeserializeOwned + 'static, N: Into<String>>(
        tag: u64,
        type_name: N,
    ) -> Self {
        Self {
            tag,
            type_name: type_name.into(),
            codec: Arc::new(TypedCodec::<T>::default()),
            check: None,
        }
    }

    pub fn with_check(mut self, check: VariantCheck) -> Self {
        self.check = Some(check);
        self
    }

    fn same_as(&self, other: &VariantSpec) -> bool {
        self.tag == other.tag
            && self.type_name == other.type_name
            && self.codec.type_name() == other.codec.type_name()
    }
}

impl std::fmt::Debug for VariantSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantSpec")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish()
    }
}

static VARIANTS: Lazy<RwLock<HashMap<ChoiceKind, Vec<VariantSpec>>>> =
    Lazy::new(|| RwLock::new(crate::profiles::builtin_variants()));

/// Registers an extra variant for `kind`. Re-registering an identical
/// variant is a no-op; reusing a tag or type name is a conflict.
pub fn register_variant(kind: ChoiceKind, spec: VariantSpec) -> Result<()> {
    let (tags, names) = kind.reserved();
    let conflict = || RegistrationError::DuplicateVariant {
        kind: kind.to_string(),
        detail: format!("{} (tag {})", spec.type_name, spec.tag),
    };

    if tags.contains(&spec.tag) || names.contains(&spec.type_name.as_str()) {
        return Err(conflict().into());
    }

    let mut variants = VARIANTS
        .write()
        .map_err(|_| Error::marshal("variant registry lock poisoned"))?;
    let list = variants.entry(kind).or_default();

    if let Some(existing) = list
        .iter()
        .find(|v| v.tag == spec.tag || v.type_name == spec.type_name)
    {
        return if existing.same_as(&spec) {
            Ok(())
        } else {
            Err(conflict().into())
        };
    }

    debug!(%kind, tag = spec.tag, name = %spec.type_name, "registered choice variant");
    list.push(spec);
    Ok(())
}

pub fn variant_by_tag(kind: ChoiceKind, tag: u64) -> Option<VariantSpec> {
    VARIANTS
        .read()
        .ok()?
        .get(&kind)?
        .iter()
        .find(|v| v.tag == tag)
        .cloned()
}

pub fn variant_by_name(kind: ChoiceKind, type_name: &str) -> Option<VariantSpec> {
    VARIANTS
        .read()
        .ok()?
        .get(&kind)?
        .iter()
        .find(|v| v.type_name == type_name)
        .cloned()
}

fn unknown_variant(kind: ChoiceKind, variant: String) -> Error {
    UnsupportedError::Variant {
        kind: kind.to_string(),
        variant,
    }
    .into()
}

/// A value of a registered (non built-in) choice variant, kept in canonical
/// CBOR form.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredChoice {
    pub kind: ChoiceKind,
    pub tag: u64,
    pub type_name: String,
    pub value: Value,
}

impl RegisteredChoice {
    /// Builds a registered variant from its typed payload.
    pub fn new<T: Serialize>(kind: ChoiceKind, tag: u64, value: &T) -> Result<Self> {
        let spec = variant_by_tag(kind, tag).ok_or_else(|| unknown_variant(kind, tag.to_string()))?;
        let value = spec.codec.normalize(&ExtensionValue::encode(value)?)?;

        Ok(Self {
            kind,
            tag,
            type_name: spec.type_name,
            value,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        cbor::from_value(self.value.clone())
    }

    pub fn valid(&self) -> Result<()> {
        let spec = variant_by_tag(self.kind, self.tag)
            .ok_or_else(|| unknown_variant(self.kind, self.tag.to_string()))?;
        spec.codec
            .normalize(&ExtensionValue::Cbor(self.value.clone()))
            .map_err(|e| Error::validation(format!("{}: {}", self.type_name, e)))?;

        match spec.check {
            Some(check) => check(&self.value).context(self.type_name.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn from_cbor(kind: ChoiceKind, tag: u64, inner: Value) -> Result<Self> {
        let spec = variant_by_tag(kind, tag).ok_or_else(|| unknown_variant(kind, format!("tag {tag}")))?;
        let value = spec.codec.normalize(&ExtensionValue::Cbor(inner))?;

        Ok(Self {
            kind,
            tag,
            type_name: spec.type_name,
            value,
        })
    }

    pub(crate) fn from_json(kind: ChoiceKind, type_name: &str, inner: JsonValue) -> Result<Self> {
        let spec = variant_by_name(kind, type_name)
            .ok_or_else(|| unknown_variant(kind, format!("\"{type_name}\"")))?;
        let value = spec.codec.normalize(&ExtensionValue::Json(inner))?;

        Ok(Self {
            kind,
            tag: spec.tag,
            type_name: spec.type_name,
            value,
        })
    }
}

impl Serialize for RegisteredChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let spec = variant_by_tag(self.kind, self.tag).ok_or_else(|| {
                serde::ser::Error::custom(unknown_variant(self.kind, self.tag.to_string()))
            })?;
            let value = spec
                .codec
                .to_json(&self.value)
                .map_err(serde::ser::Error::custom)?;
            serialize_envelope(serializer, &self.type_name, &value)
        } else {
            Value::Tag(self.tag, Box::new(self.value.clone())).serialize(serializer)
        }
    }
}

/// Writes the `{"type", "value"}` envelope.
pub(crate) fn serialize_envelope<S, T>(
    serializer: S,
    type_name: &str,
    value: &T,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(2))?;
    map.serialize_entry("type", type_name)?;
    map.serialize_entry("value", value)?;
    map.end()
}

/// A variant carried under CBOR tag `N`.
pub(crate) fn serialize_tagged<const N: u64, S, T>(
    serializer: S,
    type_name: &str,
    value: &T,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    if serializer.is_human_readable() {
        serialize_envelope(serializer, type_name, value)
    } else {
        ciborium::tag::Required::<&T, N>(value).serialize(serializer)
    }
}

/// A variant told apart in CBOR by its major type only.
pub(crate) fn serialize_untagged<S, T>(
    serializer: S,
    type_name: &str,
    value: &T,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    if serializer.is_human_readable() {
        serialize_envelope(serializer, type_name, value)
    } else {
        value.serialize(serializer)
    }
}

/// The raw form of a choice value, read before dispatching on its variant.
pub(crate) enum Peeked {
    Cbor(Value),
    Json(JsonValue),
}

impl<'de> Deserialize<'de> for Peeked {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            Ok(Self::Json(JsonValue::deserialize(deserializer)?))
        } else {
            Ok(Self::Cbor(Value::deserialize(deserializer)?))
        }
    }
}

/// Splits a `{"type", "value"}` envelope.
pub(crate) fn split_envelope(json: JsonValue) -> Result<(String, JsonValue)> {
    match json {
        JsonValue::Object(mut obj) if obj.len() == 2 => {
            let typ = match obj.remove("type") {
                Some(JsonValue::String(s)) => s,
                _ => return Err(ParseError::json("envelope \"type\" must be a string").into()),
            };
            let value = obj
                .remove("value")
                .ok_or_else(|| ParseError::json("no \"value\" entry in envelope"))?;
            Ok((typ, value))
        }
        other => Err(ParseError::json(format!(
            "expected a {{\"type\", \"value\"}} object, found {other}"
        ))
        .into()),
    }
}

pub(crate) fn from_cbor<T: DeserializeOwned>(value: Value) -> Result<T> {
    cbor::from_value(value)
}

pub(crate) fn from_json<T: DeserializeOwned>(value: JsonValue) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ParseError::json(e).into())
}

pub(crate) fn unexpected_cbor(kind: ChoiceKind, value: &Value) -> Error {
    unknown_variant(
        kind,
        match value {
            Value::Tag(n, _) => format!("tag {n}"),
            Value::Integer(_) => "integer".to_string(),
            Value::Text(_) => "text string".to_string(),
            Value::Bytes(_) => "byte string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Map(_) => "map".to_string(),
            _ => "value".to_string(),
        },
    )
}

/// Hands a library error to serde without repeating the "malformed ..."
/// prefix the outermost decoder adds.
pub(crate) fn de_error<E: de::Error>(err: Error) -> E {
    match err {
        Error::Parse(ParseError::Malformed { detail, .. }) => E::custom(detail),
        other => E::custom(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        id: u64,
    }

    #[test]
    fn test_register_variant_conflicts() {
        let spec = VariantSpec::new::<Payload, _>(64001, "test.payload");
        register_variant(ChoiceKind::ClassId, spec.clone()).unwrap();
        register_variant(ChoiceKind::ClassId, spec).unwrap();

        let clash = VariantSpec::new::<String, _>(64001, "test.other");
        assert!(matches!(
            register_variant(ChoiceKind::ClassId, clash),
            Err(Error::Registration(RegistrationError::DuplicateVariant { .. }))
        ));

        let builtin = VariantSpec::new::<String, _>(37, "my-uuid");
        assert!(register_variant(ChoiceKind::ClassId, builtin).is_err());
    }

    #[test]
    fn test_registered_choice_round_trip() {
        register_variant(
            ChoiceKind::GroupId,
            VariantSpec::new::<Payload, _>(64002, "test.group"),
        )
        .unwrap();

        let choice = RegisteredChoice::new(ChoiceKind::GroupId, 64002, &Payload { id: 9 }).unwrap();

        let json = serde_json::to_string(&choice).unwrap();
        assert_eq!(json, r#"{"type":"test.group","value":{"id":9}}"#);

        let bytes = cbor::to_vec(&choice).unwrap();
        let value = cbor::value_from_slice(&bytes).unwrap();
        let Value::Tag(tag, inner) = value else {
            panic!("expected a tag")
        };
        let back = RegisteredChoice::from_cbor(ChoiceKind::GroupId, tag, *inner).unwrap();
        assert_eq!(back, choice);
        assert_eq!(back.decode::<Payload>().unwrap(), Payload { id: 9 });
    }

    #[test]
    fn test_unknown_variant_is_unsupported() {
        let err = RegisteredChoice::from_cbor(ChoiceKind::InstanceId, 9999, Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "unknown instance-id variant tag 9999");
    }
}
