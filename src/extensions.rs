// SPDX-License-Identifier: MIT

//! Extension points and the per-document extension store.
//!
//! Every extensible map in the document model (the CoRIM itself, entities,
//! CoMIDs, triples, measurement values, flags, ...) carries an
//! [`ExtensionMap`]. On decode, map entries that do not match a declared field
//! land in it, keyed by their integer CBOR key (or, for JSON, by the member
//! name). On encode they are written back, so documents round-trip even when
//! the profile that defines the extra fields is not known to the reader.
//!
//! A profile contributes an [`Extension`] per [`ExtensionPoint`]. Its
//! [`ExtensionField`]s give the extra entries names and types; its
//! [`Extension::constrain`] hook runs during validation.

use std::{fmt::Display, marker::PhantomData, str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use ciborium::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::trace;

use crate::{
    cbor, Bytes, Comid, ComidEntity, CorimEntity, Error, EvTriples, Flags, Mval, ParseError,
    RegistrationError, Result, Signer, Time, Triples, UnsignedCorim, ValidationError, ValueTriple,
};

/// The named slots of the document model that a profile may extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionPoint {
    UnsignedCorim,
    Signer,
    CorimEntity,
    Comid,
    ComidEntity,
    Triples,
    ReferenceValue,
    ReferenceValueFlags,
    EndorsedValue,
    EndorsedValueFlags,
    Mval,
    EvidenceTriples,
}

impl ExtensionPoint {
    pub const ALL: [ExtensionPoint; 12] = [
        Self::UnsignedCorim,
        Self::Signer,
        Self::CorimEntity,
        Self::Comid,
        Self::ComidEntity,
        Self::Triples,
        Self::ReferenceValue,
        Self::ReferenceValueFlags,
        Self::EndorsedValue,
        Self::EndorsedValueFlags,
        Self::Mval,
        Self::EvidenceTriples,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsignedCorim => "UnsignedCorim",
            Self::Signer => "Signer",
            Self::CorimEntity => "CorimEntity",
            Self::Comid => "Comid",
            Self::ComidEntity => "ComidEntity",
            Self::Triples => "Triples",
            Self::ReferenceValue => "ReferenceValue",
            Self::ReferenceValueFlags => "ReferenceValueFlags",
            Self::EndorsedValue => "EndorsedValue",
            Self::EndorsedValueFlags => "EndorsedValueFlags",
            Self::Mval => "Mval",
            Self::EvidenceTriples => "EvidenceTriples",
        }
    }
}

impl Display for ExtensionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| RegistrationError::UnknownExtensionPoint(s.to_string()).into())
    }
}

/// The node handed to [`Extension::constrain`].
#[derive(Debug, Clone, Copy)]
pub enum ExtensionTarget<'a> {
    UnsignedCorim(&'a UnsignedCorim),
    Signer(&'a Signer),
    CorimEntity(&'a CorimEntity),
    Comid(&'a Comid),
    ComidEntity(&'a ComidEntity),
    Triples(&'a Triples),
    ReferenceValue(&'a ValueTriple),
    ReferenceValueFlags(&'a Flags),
    EndorsedValue(&'a ValueTriple),
    EndorsedValueFlags(&'a Flags),
    Mval(&'a Mval),
    EvidenceTriples(&'a EvTriples),
}

impl ExtensionTarget<'_> {
    pub fn point(&self) -> ExtensionPoint {
        match self {
            Self::UnsignedCorim(_) => ExtensionPoint::UnsignedCorim,
            Self::Signer(_) => ExtensionPoint::Signer,
            Self::CorimEntity(_) => ExtensionPoint::CorimEntity,
            Self::Comid(_) => ExtensionPoint::Comid,
            Self::ComidEntity(_) => ExtensionPoint::ComidEntity,
            Self::Triples(_) => ExtensionPoint::Triples,
            Self::ReferenceValue(_) => ExtensionPoint::ReferenceValue,
            Self::ReferenceValueFlags(_) => ExtensionPoint::ReferenceValueFlags,
            Self::EndorsedValue(_) => ExtensionPoint::EndorsedValue,
            Self::EndorsedValueFlags(_) => ExtensionPoint::EndorsedValueFlags,
            Self::Mval(_) => ExtensionPoint::Mval,
            Self::EvidenceTriples(_) => ExtensionPoint::EvidenceTriples,
        }
    }
}

/// A profile's contribution to one extension point.
///
/// Implementations are stateless and shared (`Arc`) between documents; the
/// values themselves live in each document's [`ExtensionMap`].
pub trait Extension: Send + Sync {
    /// Extra map entries this extension declares at its point.
    fn fields(&self) -> &[ExtensionField] {
        &[]
    }

    /// Additional validation run after the node's own structural checks.
    fn constrain(&self, _target: &ExtensionTarget<'_>) -> Result<()> {
        Ok(())
    }
}

/// An [`Extension`] that only declares fields.
#[derive(Clone, Default)]
pub struct FieldExtension {
    fields: Vec<ExtensionField>,
}

impl FieldExtension {
    pub fn new(fields: Vec<ExtensionField>) -> Self {
        Self { fields }
    }
}

impl Extension for FieldExtension {
    fn fields(&self) -> &[ExtensionField] {
        &self.fields
    }
}

/// Converts an extension value between its raw and canonical forms.
pub trait FieldCodec: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Checks `value` and returns its canonical CBOR form.
    fn normalize(&self, value: &ExtensionValue) -> Result<Value>;

    /// Renders a canonical CBOR value as JSON.
    fn to_json(&self, value: &Value) -> Result<JsonValue>;
}

/// [`FieldCodec`] for any serde type that follows this crate's dual
/// CBOR/JSON conventions.
pub struct TypedCodec<T>(PhantomData<fn() -> T>);

impl<T> Default for TypedCodec<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serialize + DeserializeOwned + 'static> FieldCodec for TypedCodec<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn normalize(&self, value: &ExtensionValue) -> Result<Value> {
        let typed: T = value.decode()?;
        cbor::to_value(&typed)
    }

    fn to_json(&self, value: &Value) -> Result<JsonValue> {
        let typed: T = cbor::from_value(value.clone())?;
        serde_json::to_value(&typed).map_err(Error::marshal)
    }
}

/// Type of an extension field.
#[derive(Clone, Default)]
pub enum FieldKind {
    /// Any CBOR value; kept as is.
    #[default]
    Any,
    Typed(Arc<dyn FieldCodec>),
}

impl FieldKind {
    pub fn typed<T: Serialize + DeserializeOwned + 'static>() -> Self {
        Self::Typed(Arc::new(TypedCodec::<T>::default()))
    }

    pub fn text() -> Self {
        Self::typed::<String>()
    }

    pub fn int() -> Self {
        Self::typed::<i64>()
    }

    pub fn uint() -> Self {
        Self::typed::<u64>()
    }

    pub fn bool() -> Self {
        Self::typed::<bool>()
    }

    pub fn bytes() -> Self {
        Self::typed::<Bytes>()
    }

    pub fn time() -> Self {
        Self::typed::<Time>()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Typed(codec) => codec.type_name(),
        }
    }

    fn normalize(&self, value: &ExtensionValue) -> Result<ExtensionValue> {
        match self {
            Self::Any => Ok(value.clone()),
            Self::Typed(codec) => Ok(ExtensionValue::Cbor(codec.normalize(value)?)),
        }
    }
}

impl std::fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldKind({})", self.type_name())
    }
}

/// Declaration of one extension map entry.
#[derive(Debug, Clone)]
pub struct ExtensionField {
    pub key: i64,
    pub name: String,
    pub optional: bool,
    pub kind: FieldKind,
}

impl ExtensionField {
    /// An optional field.
    pub fn new<N: Into<String>>(key: i64, name: N, kind: FieldKind) -> Self {
        Self {
            key,
            name: name.into(),
            optional: true,
            kind,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.optional = false;
        self
    }
}

/// A raw extension value, kept in the form it was decoded from.
#[derive(Debug, Clone)]
pub enum ExtensionValue {
    Cbor(Value),
    Json(JsonValue),
}

impl ExtensionValue {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Cbor(cbor::to_value(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Cbor(v) => cbor::from_value(v.clone()),
            Self::Json(v) => serde_json::from_value(v.clone()).map_err(|e| ParseError::json(e).into()),
        }
    }

    pub fn to_cbor(&self) -> Result<Value> {
        match self {
            Self::Cbor(v) => Ok(v.clone()),
            Self::Json(v) => Ok(json_to_cbor(v)),
        }
    }

    pub fn to_json(&self) -> Result<JsonValue> {
        match self {
            Self::Cbor(v) => cbor_to_json(v),
            Self::Json(v) => Ok(v.clone()),
        }
    }
}

impl PartialEq for ExtensionValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Cbor(a), Self::Cbor(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            _ => match (self.to_cbor(), other.to_cbor()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<Value> for ExtensionValue {
    fn from(value: Value) -> Self {
        Self::Cbor(value)
    }
}

impl Serialize for ExtensionValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            self.to_json()
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer)
        } else {
            self.to_cbor()
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ExtensionValue {
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

const ENVELOPE_BYTES: &str = "bytes";
const ENVELOPE_TAG: &str = "tag";
const ENVELOPE_MAP: &str = "map";

fn envelope(typ: &str, value: JsonValue) -> JsonValue {
    let mut obj = JsonMap::new();
    obj.insert("type".to_string(), JsonValue::String(typ.to_string()));
    obj.insert("value".to_string(), value);
    JsonValue::Object(obj)
}

/// Lossless JSON rendering of an arbitrary CBOR value. Byte strings, tags and
/// maps with non-text keys use the `{"type", "value"}` envelope.
pub fn cbor_to_json(value: &Value) -> Result<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Integer(i) => {
            let i = i128::from(*i);
            if let Ok(n) = i64::try_from(i) {
                JsonValue::from(n)
            } else if let Ok(n) = u64::try_from(i) {
                JsonValue::from(n)
            } else {
                return Err(Error::marshal(format!("integer {i} does not fit JSON")));
            }
        }
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::marshal(format!("float {f} has no JSON form")))?,
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => envelope(ENVELOPE_BYTES, JsonValue::String(STANDARD.encode(b))),
        Value::Tag(n, inner) => envelope(
            ENVELOPE_TAG,
            JsonValue::Array(vec![JsonValue::from(*n), cbor_to_json(inner)?]),
        ),
        Value::Array(items) => JsonValue::Array(
            items.iter().map(cbor_to_json).collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(entries) => {
            if entries.iter().all(|(k, _)| matches!(k, Value::Text(_))) {
                let mut obj = JsonMap::new();
                for (k, v) in entries {
                    if let Value::Text(k) = k {
                        obj.insert(k.clone(), cbor_to_json(v)?);
                    }
                }
                JsonValue::Object(obj)
            } else {
                let pairs = entries
                    .iter()
                    .map(|(k, v)| Ok(JsonValue::Array(vec![cbor_to_json(k)?, cbor_to_json(v)?])))
                    .collect::<Result<Vec<_>>>()?;
                envelope(ENVELOPE_MAP, JsonValue::Array(pairs))
            }
        }
        other => return Err(Error::marshal(format!("unsupported CBOR value {other:?}"))),
    })
}

/// Inverse of [`cbor_to_json`].
pub fn json_to_cbor(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::Integer(u.into())
            } else if let Some(i) = n.as_i64() {
                Value::Integer(i.into())
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Array(items) => Value::Array(items.iter().map(json_to_cbor).collect()),
        JsonValue::Object(obj) => {
            if let Some(v) = from_envelope(obj) {
                return v;
            }
            Value::Map(
                obj.iter()
                    .map(|(k, v)| (Value::Text(k.clone()), json_to_cbor(v)))
                    .collect(),
            )
        }
    }
}

fn from_envelope(obj: &JsonMap<String, JsonValue>) -> Option<Value> {
    if obj.len() != 2 {
        return None;
    }

    let typ = obj.get("type")?.as_str()?;
    let value = obj.get("value")?;

    match (typ, value) {
        (ENVELOPE_BYTES, JsonValue::String(s)) => STANDARD.decode(s).ok().map(Value::Bytes),
        (ENVELOPE_TAG, JsonValue::Array(pair)) if pair.len() == 2 => {
            let n = pair[0].as_u64()?;
            Some(Value::Tag(n, Box::new(json_to_cbor(&pair[1]))))
        }
        (ENVELOPE_MAP, JsonValue::Array(pairs)) => pairs
            .iter()
            .map(|pair| match pair {
                JsonValue::Array(kv) if kv.len() == 2 => {
                    Some((json_to_cbor(&kv[0]), json_to_cbor(&kv[1])))
                }
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::Map),
        _ => None,
    }
}

/// One stored extension entry.
#[derive(Debug, Clone)]
pub struct ExtensionEntry {
    /// CBOR map key; absent for JSON members whose name no declared field
    /// resolves.
    pub key: Option<i64>,
    /// JSON member name, when known.
    pub name: Option<String>,
    pub value: ExtensionValue,
    kind: FieldKind,
    resolved: bool,
}

impl ExtensionEntry {
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Name used in the JSON form.
    pub fn json_name(&self) -> String {
        match (&self.name, self.key) {
            (Some(name), _) => name.clone(),
            (None, Some(key)) => key.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn json_value(&self) -> Result<JsonValue> {
        match (&self.kind, &self.value) {
            (FieldKind::Typed(codec), ExtensionValue::Cbor(v)) => codec.to_json(v),
            _ => self.value.to_json(),
        }
    }
}

impl PartialEq for ExtensionEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && (self.key.is_some() || self.name == other.name)
            && self.value == other.value
    }
}

/// The extension store of one map: declared-but-profile-defined entries and
/// the field-cache of entries nobody declared.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    entries: Vec<ExtensionEntry>,
}

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionEntry> {
        self.entries.iter()
    }

    fn position(&self, key: Option<i64>, name: Option<&str>) -> Option<usize> {
        self.entries.iter().position(|e| {
            (key.is_some() && e.key == key) || (name.is_some() && e.name.as_deref() == name)
        })
    }

    /// Inserts an entry under an integer key, replacing any previous value.
    pub fn insert(&mut self, key: i64, value: ExtensionValue) -> Option<ExtensionValue> {
        let entry = ExtensionEntry {
            key: Some(key),
            name: None,
            value,
            kind: FieldKind::Any,
            resolved: false,
        };

        match self.position(Some(key), None) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i], entry).value),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    /// Inserts an entry known only by its JSON name.
    pub fn insert_named<N: Into<String>>(&mut self, name: N, value: ExtensionValue) {
        let name = name.into();
        let entry = ExtensionEntry {
            key: None,
            name: Some(name.clone()),
            value,
            kind: FieldKind::Any,
            resolved: false,
        };

        match self.position(None, Some(&name)) {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Sets a declared field from a typed value.
    pub fn set<T: Serialize + ?Sized>(&mut self, field: &ExtensionField, value: &T) -> Result<()> {
        let value = field.kind.normalize(&ExtensionValue::encode(value)?)?;
        let entry = ExtensionEntry {
            key: Some(field.key),
            name: Some(field.name.clone()),
            value,
            kind: field.kind.clone(),
            resolved: true,
        };

        match self.position(Some(field.key), Some(&field.name)) {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }

        Ok(())
    }

    pub fn get(&self, key: i64) -> Option<&ExtensionValue> {
        self.position(Some(key), None).map(|i| &self.entries[i].value)
    }

    pub fn get_named(&self, name: &str) -> Option<&ExtensionValue> {
        self.position(None, Some(name))
            .map(|i| &self.entries[i].value)
    }

    /// Looks a declared field up (by key or name) and decodes it.
    pub fn get_as<T: DeserializeOwned>(&self, field: &ExtensionField) -> Result<Option<T>> {
        self.position(Some(field.key), Some(&field.name))
            .map(|i| self.entries[i].value.decode())
            .transpose()
    }

    pub fn remove(&mut self, key: i64) -> Option<ExtensionValue> {
        self.position(Some(key), None)
            .map(|i| self.entries.remove(i).value)
    }

    /// Entries no registered field accounts for, keyed by the stringified
    /// integer key (or the JSON name when no key is known).
    pub fn field_cache(&self) -> std::collections::BTreeMap<String, &ExtensionValue> {
        self.entries
            .iter()
            .filter(|e| !e.resolved)
            .map(|e| (e.key.map_or_else(|| e.json_name(), |k| k.to_string()), &e.value))
            .collect()
    }

    /// Binds entries to the given field declarations: JSON names become keys,
    /// values are converted to their declared type. Fails when a value does not
    /// have the declared type.
    pub fn resolve(&mut self, fields: &[ExtensionField]) -> Result<()> {
        for field in fields {
            let Some(i) = self.position(Some(field.key), Some(&field.name)) else {
                continue;
            };

            let entry = &mut self.entries[i];
            trace!(key = field.key, name = %field.name, "resolving extension field");

            let value = field.kind.normalize(&entry.value).map_err(|e| {
                Error::Parse(ParseError::invalid(
                    format!("extension field \"{}\" ({})", field.name, field.key),
                    e,
                ))
            })?;

            entry.key = Some(field.key);
            entry.name = Some(field.name.clone());
            entry.value = value;
            entry.kind = field.kind.clone();
            entry.resolved = true;
        }

        Ok(())
    }

    /// Validation of declared fields: mandatory ones must be present and every
    /// present one must decode as its declared type.
    pub fn check(&self, fields: &[ExtensionField]) -> Result<()> {
        for field in fields {
            match self.position(Some(field.key), Some(&field.name)) {
                None if !field.optional => {
                    return Err(ValidationError::new(format!(
                        "missing mandatory field \"{}\" ({})",
                        field.name, field.key
                    ))
                    .into())
                }
                None => {}
                Some(i) => {
                    field.kind.normalize(&self.entries[i].value).map_err(|e| {
                        Error::validation(format!(
                            "extension field \"{}\" ({}): {}",
                            field.name, field.key, e
                        ))
                    })?;
                }
            }
        }

        Ok(())
    }
}

impl PartialEq for ExtensionMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|e| other.entries.contains(e))
    }
}

impl crate::Empty for ExtensionMap {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_json_mapping_is_lossless() {
        let value = Value::Map(vec![
            (Value::Integer(1.into()), Value::Bytes(vec![1, 2, 3])),
            (
                Value::Integer((-2).into()),
                Value::Tag(37, Box::new(Value::Text("x".to_string()))),
            ),
        ]);

        let json = cbor_to_json(&value).unwrap();
        assert_eq!(
            json.to_string(),
            r#"{"type":"map","value":[[1,{"type":"bytes","value":"AQID"}],[-2,{"type":"tag","value":[37,"x"]}]]}"#
        );
        assert_eq!(json_to_cbor(&json), value);
    }

    #[test]
    fn test_resolve_binds_json_names() {
        let field = ExtensionField::new(-1, "Extension1", FieldKind::text());

        let mut ext = ExtensionMap::new();
        ext.insert_named("Extension1", ExtensionValue::Json(JsonValue::from("foo")));
        assert_eq!(ext.field_cache().len(), 1);

        ext.resolve(&[field.clone()]).unwrap();

        assert!(ext.field_cache().is_empty());
        assert_eq!(ext.get(-1), Some(&ExtensionValue::Cbor(Value::Text("foo".into()))));
        assert_eq!(ext.get_as::<String>(&field).unwrap().as_deref(), Some("foo"));
    }

    #[test]
    fn test_resolve_rejects_wrong_type() {
        let mut ext = ExtensionMap::new();
        ext.insert(-1, ExtensionValue::Cbor(Value::Integer(7.into())));

        let err = ext
            .resolve(&[ExtensionField::new(-1, "Extension1", FieldKind::text())])
            .unwrap_err();
        assert!(err.to_string().contains("extension field \"Extension1\" (-1)"));
    }

    #[test]
    fn test_check_reports_missing_mandatory_field() {
        let ext = ExtensionMap::new();
        let err = ext
            .check(&[ExtensionField::new(-72, "tcbdate", FieldKind::time()).mandatory()])
            .unwrap_err();
        assert_eq!(err.to_string(), "missing mandatory field \"tcbdate\" (-72)");
    }

    #[test]
    fn test_extension_point_from_str() {
        assert_eq!(
            "ReferenceValue".parse::<ExtensionPoint>().unwrap(),
            ExtensionPoint::ReferenceValue
        );
        assert_eq!(
            "Nope".parse::<ExtensionPoint>().unwrap_err(),
            Error::Registration(RegistrationError::UnknownExtensionPoint("Nope".into()))
        );
    }
}
