// SPDX-License-Identifier: MIT

/// Implements `Serialize`/`Deserialize` for a record whose CBOR form is a
/// positional array and whose JSON form is an object.
///
/// Triples are written this way: `[environment, [+ measurement]]` on the
/// wire, `{"environment": ..., "measurements": [...]}` in JSON.
///
/// # Example
///
/// ```ignore
/// array_record!(ValueTriple, "a value triple" {
///     environment: Environment => "environment",
///     measurements: Vec<Measurement> => "measurements",
/// });
/// ```
macro_rules! array_record {
    ($title:ident, $expecting:literal { $($field:ident: $type:ty => $name:literal),+ $(,)? }) => {
        impl ::serde::Serialize for $title {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                use ::serde::ser::{SerializeMap, SerializeTuple};

                let len = [$($name),+].len();
                if serializer.is_human_readable() {
                    let mut map = serializer.serialize_map(Some(len))?;
                    $( map.serialize_entry($name, &self.$field)?; )+
                    map.end()
                } else {
                    let mut seq = serializer.serialize_tuple(len)?;
                    $( seq.serialize_element(&self.$field)?; )+
                    seq.end()
                }
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $title {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                use ::serde::Deserialize;

                #[derive(Deserialize)]
                #[serde(deny_unknown_fields, expecting = $expecting)]
                struct Object {
                    $( #[serde(rename = $name)] $field: $type, )+
                }

                if deserializer.is_human_readable() {
                    let object = Object::deserialize(deserializer)?;
                    Ok($title { $( $field: object.$field ),+ })
                } else {
                    let ($($field,)+) = <($($type,)+)>::deserialize(deserializer)?;
                    Ok($title { $( $field ),+ })
                }
            }
        }
    };
}

pub(crate) use array_record;

/// Declares an entity-role enum: integer codes in CBOR, role names in JSON.
/// Codes without a name decode into `Other` and fail validation.
macro_rules! entity_roles {
    ($(#[$meta:meta])* $title:ident { $($variant:ident = $code:literal => $name:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $title {
            $($variant,)+
            Other(i64),
        }

        impl $title {
            pub fn from_code(code: i64) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    other => Self::Other(other),
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl $crate::comid::Role for $title {
            fn code(&self) -> i64 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Other(code) => *code,
                }
            }

            fn name(&self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($name),)+
                    Self::Other(_) => None,
                }
            }
        }

        impl ::serde::Serialize for $title {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                use $crate::comid::Role;

                match self.name() {
                    Some(name) if serializer.is_human_readable() => serializer.serialize_str(name),
                    _ => serializer.serialize_i64(self.code()),
                }
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $title {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                use ::serde::{de::Error, Deserialize};
                use $crate::choice::Peeked;

                match Peeked::deserialize(deserializer)? {
                    Peeked::Json(::serde_json::Value::String(s)) => Self::from_name(&s)
                        .ok_or_else(|| D::Error::custom(format!("unknown role \"{s}\""))),
                    Peeked::Json(::serde_json::Value::Number(n)) => n
                        .as_i64()
                        .map(Self::from_code)
                        .ok_or_else(|| D::Error::custom(format!("invalid role code {n}"))),
                    Peeked::Cbor(::ciborium::Value::Integer(i)) => i64::try_from(i128::from(i))
                        .map(Self::from_code)
                        .map_err(D::Error::custom),
                    _ => Err(D::Error::custom("role must be an integer or a role name")),
                }
            }
        }
    };
}

pub(crate) use entity_roles;
