// SPDX-License-Identifier: MIT

//! Struct-field serializer.
//!
//! Each map-shaped model type declares its fields as a `&'static [FieldDesc]`
//! and serializes through [`MapWriter`] / deserializes through [`MapReader`].
//! In CBOR a field is keyed by its integer key, in JSON by its name. Entries
//! that match no declared field are handed to the type's [`ExtensionMap`].

use serde::{
    de::{self, MapAccess},
    ser::{self, SerializeMap},
    Serialize, Serializer,
};

use crate::{Empty, ExtensionMap, ExtensionValue, MarshalError, ParseError};

/// Declaration of one map field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub key: i64,
    pub name: &'static str,
    pub optional: bool,
}

impl FieldDesc {
    pub const fn mandatory(key: i64, name: &'static str) -> Self {
        Self {
            key,
            name,
            optional: false,
        }
    }

    pub const fn optional(key: i64, name: &'static str) -> Self {
        Self {
            key,
            name,
            optional: true,
        }
    }
}

/// A map key as seen by [`MapReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    /// The key of a declared field.
    Known(i64),
    Unknown(UnknownKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownKey {
    Int(i64),
    Name(String),
}

/// Walks the keys of a map being deserialized, classifying them against the
/// declared fields and rejecting duplicates.
pub struct MapReader {
    fields: &'static [FieldDesc],
    is_human_readable: bool,
    seen_keys: Vec<i64>,
    seen_names: Vec<String>,
}

impl MapReader {
    pub fn new(fields: &'static [FieldDesc], is_human_readable: bool) -> Self {
        Self {
            fields,
            is_human_readable,
            seen_keys: vec![],
            seen_names: vec![],
        }
    }

    fn mark<E: de::Error>(&mut self, key: i64) -> Result<(), E> {
        if self.seen_keys.contains(&key) {
            return Err(E::custom(ParseError::DuplicateKey(key.to_string())));
        }
        self.seen_keys.push(key);
        Ok(())
    }

    pub fn next_key<'de, A: MapAccess<'de>>(
        &mut self,
        map: &mut A,
    ) -> Result<Option<FieldKey>, A::Error> {
        let key = if self.is_human_readable {
            let Some(name) = map.next_key::<String>()? else {
                return Ok(None);
            };

            if let Some(desc) = self.fields.iter().find(|f| f.name == name) {
                FieldKey::Known(desc.key)
            } else if let Ok(k) = name.parse::<i64>() {
                if self.fields.iter().any(|f| f.key == k) {
                    FieldKey::Known(k)
                } else {
                    FieldKey::Unknown(UnknownKey::Int(k))
                }
            } else {
                if self.seen_names.contains(&name) {
                    return Err(de::Error::custom(ParseError::DuplicateKey(format!(
                        "\"{name}\""
                    ))));
                }
                self.seen_names.push(name.clone());
                return Ok(Some(FieldKey::Unknown(UnknownKey::Name(name))));
            }
        } else {
            let Some(k) = map.next_key::<i64>()? else {
                return Ok(None);
            };

            if self.fields.iter().any(|f| f.key == k) {
                FieldKey::Known(k)
            } else {
                FieldKey::Unknown(UnknownKey::Int(k))
            }
        };

        match &key {
            FieldKey::Known(k) | FieldKey::Unknown(UnknownKey::Int(k)) => self.mark(*k)?,
            FieldKey::Unknown(UnknownKey::Name(_)) => {}
        }

        Ok(Some(key))
    }

    /// Stores the value of an undeclared entry in `extensions`.
    pub fn extension<'de, A: MapAccess<'de>>(
        &mut self,
        map: &mut A,
        key: UnknownKey,
        extensions: &mut ExtensionMap,
    ) -> Result<(), A::Error> {
        let value = map.next_value::<ExtensionValue>()?;
        match key {
            UnknownKey::Int(k) => {
                extensions.insert(k, value);
            }
            UnknownKey::Name(name) => extensions.insert_named(name, value),
        }
        Ok(())
    }

    /// Fails if a mandatory field was not seen.
    pub fn finish<E: de::Error>(&self) -> Result<(), E> {
        match self
            .fields
            .iter()
            .find(|f| !f.optional && !self.seen_keys.contains(&f.key))
        {
            Some(missing) => Err(E::custom(ParseError::MissingField {
                name: missing.name.to_string(),
                key: missing.key,
            })),
            None => Ok(()),
        }
    }
}

/// Writes declared fields and extension entries into a serde map.
pub struct MapWriter<M> {
    map: M,
    is_human_readable: bool,
    written: Vec<i64>,
}

impl<M: SerializeMap> MapWriter<M> {
    pub fn begin<S>(serializer: S) -> Result<MapWriter<S::SerializeMap>, S::Error>
    where
        S: Serializer<SerializeMap = M>,
    {
        let is_human_readable = serializer.is_human_readable();
        Ok(MapWriter {
            map: serializer.serialize_map(None)?,
            is_human_readable,
            written: vec![],
        })
    }

    pub fn is_human_readable(&self) -> bool {
        self.is_human_readable
    }

    pub fn field<T: Serialize + ?Sized>(
        &mut self,
        desc: &FieldDesc,
        value: &T,
    ) -> Result<(), M::Error> {
        if self.written.contains(&desc.key) {
            return Err(ser::Error::custom(MarshalError(format!(
                "duplicate map key {}",
                desc.key
            ))));
        }
        self.written.push(desc.key);

        if self.is_human_readable {
            self.map.serialize_entry(desc.name, value)
        } else {
            self.map.serialize_entry(&desc.key, value)
        }
    }

    pub fn optional<T: Serialize>(
        &mut self,
        desc: &FieldDesc,
        value: &Option<T>,
    ) -> Result<(), M::Error> {
        match value {
            Some(v) => self.field(desc, v),
            None => Ok(()),
        }
    }

    /// Omits the field when its value is empty.
    pub fn non_empty<T: Serialize + Empty>(
        &mut self,
        desc: &FieldDesc,
        value: &T,
    ) -> Result<(), M::Error> {
        if value.is_empty() {
            Ok(())
        } else {
            self.field(desc, value)
        }
    }

    pub fn extensions(&mut self, extensions: &ExtensionMap) -> Result<(), M::Error> {
        for entry in extensions.iter() {
            if self.is_human_readable {
                let value = entry.json_value().map_err(ser::Error::custom)?;
                self.map.serialize_entry(&entry.json_name(), &value)?;
            } else {
                let key = entry.key.ok_or_else(|| {
                    ser::Error::custom(MarshalError(format!(
                        "extension \"{}\" has no CBOR key; register the profile that declares it",
                        entry.json_name()
                    )))
                })?;

                if self.written.contains(&key) {
                    return Err(ser::Error::custom(MarshalError(format!(
                        "duplicate map key {key}"
                    ))));
                }
                self.written.push(key);

                let value = entry.value.to_cbor().map_err(ser::Error::custom)?;
                self.map.serialize_entry(&key, &value)?;
            }
        }

        Ok(())
    }

    pub fn end(self) -> Result<M::Ok, M::Error> {
        self.map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cbor, Error, ParseError};
    use hex_literal::hex;
    use serde::{Deserialize, Deserializer};

    const FIELDS: &[FieldDesc] = &[
        FieldDesc::mandatory(0, "name"),
        FieldDesc::optional(1, "count"),
    ];

    #[derive(Debug, PartialEq, Default)]
    struct Sample {
        name: String,
        count: Option<u64>,
        extensions: ExtensionMap,
    }

    impl Serialize for Sample {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = MapWriter::begin(serializer)?;
            map.field(&FIELDS[0], &self.name)?;
            map.optional(&FIELDS[1], &self.count)?;
            map.extensions(&self.extensions)?;
            map.end()
        }
    }

    impl<'de> Deserialize<'de> for Sample {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct SampleVisitor {
                is_human_readable: bool,
            }

            impl<'de> de::Visitor<'de> for SampleVisitor {
                type Value = Sample;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a sample map")
                }

                fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Sample, A::Error> {
                    let mut reader = MapReader::new(FIELDS, self.is_human_readable);
                    let mut sample = Sample::default();

                    while let Some(key) = reader.next_key(&mut map)? {
                        match key {
                            FieldKey::Known(0) => sample.name = map.next_value()?,
                            FieldKey::Known(_) => sample.count = Some(map.next_value()?),
                            FieldKey::Unknown(k) => {
                                reader.extension(&mut map, k, &mut sample.extensions)?
                            }
                        }
                    }

                    reader.finish()?;
                    Ok(sample)
                }
            }

            let is_human_readable = deserializer.is_human_readable();
            deserializer.deserialize_map(SampleVisitor { is_human_readable })
        }
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        // {0: "a", -1: "foo", 1: 2}
        let bytes = hex!("a3 00 61 61 20 63 66 6f 6f 01 02");
        let sample: Sample = cbor::from_slice(&bytes).unwrap();

        assert_eq!(sample.count, Some(2));
        assert_eq!(sample.extensions.field_cache().len(), 1);

        // canonical order puts -1 last
        assert_eq!(
            cbor::to_vec(&sample).unwrap(),
            hex!("a3 00 61 61 01 02 20 63 66 6f 6f")
        );

        let json = cbor::to_json(&sample).unwrap();
        assert_eq!(json, r#"{"name":"a","count":2,"-1":"foo"}"#);

        let back: Sample = cbor::from_json(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_missing_mandatory_field() {
        let err = cbor::from_slice::<Sample>(&hex!("a1 01 02")).unwrap_err();
        assert_eq!(
            err,
            Error::Parse(ParseError::cbor("missing mandatory field \"name\" (0)"))
        );
    }

    #[test]
    fn test_duplicate_json_member() {
        let err = cbor::from_json::<Sample>(r#"{"name":"a","name":"b"}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate map key 0"));
    }

    #[test]
    fn test_named_extension_cannot_be_encoded_to_cbor() {
        let sample: Sample = cbor::from_json(r#"{"name":"a","vendor-thing":true}"#).unwrap();
        let err = cbor::to_vec(&sample).unwrap_err();
        assert!(err.to_string().contains("\"vendor-thing\" has no CBOR key"));
    }
}
