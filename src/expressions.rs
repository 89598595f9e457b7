// SPDX-License-Identifier: MIT

//! Numeric and set expressions.
//!
//! A reference value may state a constraint on a measured value instead of
//! the value itself: `[operator, operand]` carried under a dedicated CBOR tag.
//! Numeric expressions compare a number, set expressions test membership of
//! the measured digests or strings.

use std::{fmt::Display, str::FromStr};

use ciborium::{tag::Required, Value};
use serde::{ser::SerializeMap, Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    cbor::{TAG_NUMERIC_EXPRESSION, TAG_SET_DIGEST_EXPRESSION, TAG_SET_STRING_EXPRESSION},
    choice::{de_error, from_cbor, from_json, serialize_envelope, split_envelope, Peeked},
    Error, HashEntry, ParseError, Result, UnsupportedError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Operator {
    Eq = 0,
    Gt = 1,
    Ge = 2,
    Lt = 3,
    Le = 4,
    Mem = 5,
    Nmem = 6,
    Sub = 7,
    Sup = 8,
    Dis = 9,
}

impl Operator {
    const ALL: [Operator; 10] = [
        Self::Eq,
        Self::Gt,
        Self::Ge,
        Self::Lt,
        Self::Le,
        Self::Mem,
        Self::Nmem,
        Self::Sub,
        Self::Sup,
        Self::Dis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Mem => "mem",
            Self::Nmem => "nmem",
            Self::Sub => "sub",
            Self::Sup => "sup",
            Self::Dis => "dis",
        }
    }

    pub fn is_set_operator(&self) -> bool {
        matches!(self, Self::Mem | Self::Nmem)
    }
}

impl TryFrom<i128> for Operator {
    type Error = Error;

    fn try_from(value: i128) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| *op as i128 == value)
            .ok_or_else(|| ParseError::invalid("expression", format!("unknown operator {value}")).into())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ParseError::invalid("expression", format!("unknown operator \"{s}\"")).into())
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.as_str())
        } else {
            serializer.serialize_u8(*self as u8)
        }
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let op = match Peeked::deserialize(deserializer)? {
            Peeked::Json(JsonValue::String(s)) => s.parse(),
            Peeked::Cbor(Value::Integer(i)) => Operator::try_from(i128::from(i)),
            _ => Err(ParseError::invalid("expression", "operator must be an integer").into()),
        };
        op.map_err(de_error)
    }
}

/// Operand of a numeric expression.
///
/// CBOR tells the variants apart by major type, so a non-negative `Int`
/// decodes as `Uint`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericType {
    Uint(u64),
    Int(i64),
    Float(f64),
}

impl NumericType {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Self::Uint(u) => *u as f64,
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }

    fn from_peeked(peeked: Peeked) -> Result<Self> {
        match peeked {
            Peeked::Cbor(Value::Integer(i)) => {
                let i = i128::from(i);
                if i >= 0 {
                    u64::try_from(i).map(Self::Uint).map_err(|e| ParseError::cbor(e).into())
                } else {
                    i64::try_from(i).map(Self::Int).map_err(|e| ParseError::cbor(e).into())
                }
            }
            Peeked::Cbor(Value::Float(f)) => Ok(Self::Float(f)),
            Peeked::Cbor(other) => Err(UnsupportedError::NumericType(format!("{other:?}")).into()),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "uint" => Ok(Self::Uint(from_json(value)?)),
                    "int" => Ok(Self::Int(from_json(value)?)),
                    "float" => Ok(Self::Float(from_json(value)?)),
                    other => Err(UnsupportedError::NumericType(other.to_string()).into()),
                }
            }
        }
    }
}

impl Serialize for NumericType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let hr = serializer.is_human_readable();
        match self {
            Self::Uint(v) if hr => serialize_envelope(serializer, "uint", v),
            Self::Int(v) if hr => serialize_envelope(serializer, "int", v),
            Self::Float(v) if hr => serialize_envelope(serializer, "float", v),
            Self::Uint(v) => serializer.serialize_u64(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for NumericType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

/// `[operator, operand]` under tag 60010.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericExpression {
    pub operator: Operator,
    pub value: NumericType,
}

impl NumericExpression {
    pub fn new(operator: Operator, value: NumericType) -> Self {
        Self { operator, value }
    }

    pub fn valid(&self) -> Result<()> {
        if self.operator > Operator::Le {
            return Err(Error::validation(format!(
                "operator \"{}\" cannot be applied to a number",
                self.operator
            )));
        }
        if let NumericType::Float(f) = self.value {
            if !f.is_finite() {
                return Err(Error::validation("numeric operand must be finite"));
            }
        }
        Ok(())
    }

    /// Whether `actual` satisfies the expression.
    pub fn matches(&self, actual: NumericType) -> bool {
        let (a, b) = (actual.as_f64(), self.value.as_f64());
        match self.operator {
            Operator::Eq => a == b,
            Operator::Gt => a > b,
            Operator::Ge => a >= b,
            Operator::Lt => a < b,
            Operator::Le => a <= b,
            _ => false,
        }
    }

    fn from_pair(items: Vec<Value>) -> Result<Self> {
        let [op, value]: [Value; 2] = items
            .try_into()
            .map_err(|_| ParseError::invalid("numeric expression", "expected [operator, value]"))?;
        Ok(Self {
            operator: from_cbor(op)?,
            value: NumericType::from_peeked(Peeked::Cbor(value))?,
        })
    }
}

impl Serialize for NumericExpression {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("operator", &self.operator)?;
            map.serialize_entry("value", &self.value)?;
            map.end()
        } else {
            Required::<_, TAG_NUMERIC_EXPRESSION>((self.operator, self.value)).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for NumericExpression {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let expr = match Peeked::deserialize(deserializer)? {
            Peeked::Cbor(Value::Tag(TAG_NUMERIC_EXPRESSION, inner)) => match *inner {
                Value::Array(items) => NumericExpression::from_pair(items),
                _ => Err(ParseError::invalid("numeric expression", "expected an array").into()),
            },
            Peeked::Cbor(_) => Err(ParseError::TagMismatch {
                expected: TAG_NUMERIC_EXPRESSION,
                found: "untagged value".to_string(),
            }
            .into()),
            Peeked::Json(JsonValue::Object(mut obj)) => {
                match (obj.remove("operator"), obj.remove("value")) {
                    (Some(op), Some(value)) if obj.is_empty() => {
                        from_json(op).and_then(|operator| {
                            Ok(NumericExpression {
                                operator,
                                value: from_json(value)?,
                            })
                        })
                    }
                    _ => Err(ParseError::json("expected {\"operator\", \"value\"}").into()),
                }
            }
            Peeked::Json(_) => Err(ParseError::json("expected a numeric expression object").into()),
        };
        expr.map_err(de_error)
    }
}

/// A uint, or a numeric expression over one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UintOrExpression {
    Uint(u64),
    Expression(NumericExpression),
}

impl UintOrExpression {
    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Uint(_) => Ok(()),
            Self::Expression(e) => e.valid(),
        }
    }

    pub fn matches(&self, actual: u64) -> bool {
        match self {
            Self::Uint(v) => *v == actual,
            Self::Expression(e) => e.matches(NumericType::Uint(actual)),
        }
    }
}

impl From<u64> for UintOrExpression {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<NumericExpression> for UintOrExpression {
    fn from(value: NumericExpression) -> Self {
        Self::Expression(value)
    }
}

impl Serialize for UintOrExpression {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Uint(v) if serializer.is_human_readable() => {
                serialize_envelope(serializer, "uint", v)
            }
            Self::Uint(v) => serializer.serialize_u64(*v),
            Self::Expression(e) if serializer.is_human_readable() => {
                serialize_envelope(serializer, "numeric-expression", e)
            }
            Self::Expression(e) => e.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for UintOrExpression {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let choice = match Peeked::deserialize(deserializer)? {
            Peeked::Cbor(v @ Value::Integer(_)) => from_cbor(v).map(Self::Uint),
            Peeked::Cbor(v @ Value::Tag(TAG_NUMERIC_EXPRESSION, _)) => {
                from_cbor(v).map(Self::Expression)
            }
            Peeked::Cbor(other) => Err(UnsupportedError::NumericType(format!("{other:?}")).into()),
            Peeked::Json(json) => split_envelope(json).and_then(|(typ, value)| match typ.as_str() {
                "uint" => from_json(value).map(Self::Uint),
                "numeric-expression" => from_json(value).map(Self::Expression),
                other => Err(UnsupportedError::NumericType(other.to_string()).into()),
            }),
        };
        choice.map_err(de_error)
    }
}

/// `[set-operator, [+ item]]` under a set-expression tag. Only `mem` and
/// `nmem` are legal operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetExpression<T, const N: u64> {
    pub operator: Operator,
    pub items: Vec<T>,
}

/// Membership test over digests (tag 60020).
pub type SetDigestExpression = SetExpression<HashEntry, TAG_SET_DIGEST_EXPRESSION>;

/// Membership test over strings (tag 60021).
pub type SetStringExpression = SetExpression<String, TAG_SET_STRING_EXPRESSION>;

impl<T: PartialEq, const N: u64> SetExpression<T, N> {
    pub fn new(operator: Operator, items: Vec<T>) -> Result<Self> {
        let expr = Self { operator, items };
        expr.valid()?;
        Ok(expr)
    }

    pub fn valid(&self) -> Result<()> {
        if !self.operator.is_set_operator() {
            return Err(Error::validation(format!(
                "set expression operator must be mem or nmem, got {}",
                self.operator
            )));
        }
        if self.items.is_empty() {
            return Err(Error::validation("empty set expression"));
        }
        Ok(())
    }

    pub fn matches(&self, actual: &T) -> bool {
        let member = self.items.contains(actual);
        match self.operator {
            Operator::Mem => member,
            Operator::Nmem => !member,
            _ => false,
        }
    }
}

impl<T: Serialize, const N: u64> Serialize for SetExpression<T, N> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("operator", &self.operator)?;
            map.serialize_entry("value", &self.items)?;
            map.end()
        } else {
            Required::<_, N>((self.operator, &self.items)).serialize(serializer)
        }
    }
}

impl<'de, T: serde::de::DeserializeOwned + PartialEq, const N: u64> Deserialize<'de>
    for SetExpression<T, N>
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let parts: Result<(Operator, Vec<T>)> = match Peeked::deserialize(deserializer)? {
            Peeked::Cbor(Value::Tag(tag, inner)) if tag == N => match *inner {
                Value::Array(items) if items.len() == 2 => {
                    let mut items = items.into_iter();
                    match (items.next(), items.next()) {
                        (Some(op), Some(set)) => from_cbor(op).and_then(|op| Ok((op, from_cbor(set)?))),
                        _ => Err(ParseError::invalid("set expression", "expected [operator, set]").into()),
                    }
                }
                _ => Err(ParseError::invalid("set expression", "expected [operator, set]").into()),
            },
            Peeked::Cbor(other) => Err(ParseError::TagMismatch {
                expected: N,
                found: match other {
                    Value::Tag(n, _) => n.to_string(),
                    _ => "untagged value".to_string(),
                },
            }
            .into()),
            Peeked::Json(JsonValue::Object(mut obj)) => {
                match (obj.remove("operator"), obj.remove("value")) {
                    (Some(op), Some(set)) if obj.is_empty() => {
                        from_json(op).and_then(|op| Ok((op, from_json(set)?)))
                    }
                    _ => Err(ParseError::json("expected {\"operator\", \"value\"}").into()),
                }
            }
            Peeked::Json(_) => Err(ParseError::json("expected a set expression object").into()),
        };

        parts
            .and_then(|(operator, items)| {
                Self::new(operator, items)
                    .map_err(|e| ParseError::invalid("set expression", e).into())
            })
            .map_err(de_error)
    }
}

/// A plain list, or a set expression over the same item type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOrExpression<T, const N: u64> {
    Set(Vec<T>),
    Expression(SetExpression<T, N>),
}

/// Digests, or a membership test over digests.
pub type DigestsOrExpression = SetOrExpression<HashEntry, TAG_SET_DIGEST_EXPRESSION>;

/// Strings, or a membership test over strings.
pub type StringsOrExpression = SetOrExpression<String, TAG_SET_STRING_EXPRESSION>;

impl<T: PartialEq, const N: u64> SetOrExpression<T, N> {
    pub fn valid(&self) -> Result<()> {
        match self {
            Self::Set(items) if items.is_empty() => Err(Error::validation("empty set")),
            Self::Set(_) => Ok(()),
            Self::Expression(e) => e.valid(),
        }
    }
}

impl<T: Serialize, const N: u64> Serialize for SetOrExpression<T, N> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Set(items) if serializer.is_human_readable() => {
                serialize_envelope(serializer, "set", items)
            }
            Self::Set(items) => items.serialize(serializer),
            Self::Expression(e) if serializer.is_human_readable() => {
                serialize_envelope(serializer, "set-expression", e)
            }
            Self::Expression(e) => e.serialize(serializer),
        }
    }
}

impl<'de, T: serde::de::DeserializeOwned + PartialEq, const N: u64> Deserialize<'de>
    for SetOrExpression<T, N>
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let choice = match Peeked::deserialize(deserializer)? {
            Peeked::Cbor(v @ Value::Array(_)) => from_cbor(v).map(Self::Set),
            Peeked::Cbor(v @ Value::Tag(..)) => from_cbor(v).map(Self::Expression),
            Peeked::Cbor(_) => Err(ParseError::invalid("set", "expected an array or a set expression").into()),
            Peeked::Json(json) => split_envelope(json).and_then(|(typ, value)| match typ.as_str() {
                "set" => from_json(value).map(Self::Set),
                "set-expression" => from_json(value).map(Self::Expression),
                other => Err(ParseError::json(format!("unknown set type \"{other}\"")).into()),
            }),
        };
        choice.map_err(de_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cbor, test::SerdeTestCase, HashAlgorithm};
    use hex_literal::hex;

    #[test]
    fn test_numeric_expression() {
        let expr = UintOrExpression::Expression(NumericExpression::new(
            Operator::Ge,
            NumericType::Uint(5),
        ));

        let bytes = cbor::to_vec(&expr).unwrap();
        // 60010([2, 5])
        assert_eq!(bytes, hex!("d9 ea 6a 82 02 05"));
        assert_eq!(cbor::from_slice::<UintOrExpression>(&bytes).unwrap(), expr);

        let json = cbor::to_json(&expr).unwrap();
        assert_eq!(
            json,
            r#"{"type":"numeric-expression","value":{"operator":"ge","value":{"type":"uint","value":5}}}"#
        );
        assert_eq!(cbor::from_json::<UintOrExpression>(&json).unwrap(), expr);

        assert!(expr.matches(5));
        assert!(expr.matches(7));
        assert!(!expr.matches(4));
    }

    #[test]
    fn test_numeric_expression_json_errors() {
        let bad_operator = r#"{"type":"numeric-expression","value":{"operator":"approx","value":{"type":"uint","value":5}}}"#;
        assert!(cbor::from_json::<UintOrExpression>(bad_operator).is_err());

        let bad_operand = r#"{"type":"numeric-expression","value":{"operator":"ge","value":"five"}}"#;
        assert!(cbor::from_json::<UintOrExpression>(bad_operand).is_err());
    }

    #[test]
    fn test_plain_uint() {
        SerdeTestCase {
            value: UintOrExpression::Uint(3),
            expected_json: r#"{"type":"uint","value":3}"#,
            expected_cbor: hex!("03").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_unknown_operator() {
        let err = cbor::from_slice::<NumericExpression>(&hex!("d9 ea 6a 82 0a 05")).unwrap_err();
        assert!(err.to_string().contains("unknown operator 10"));
    }

    #[test]
    fn test_set_expression_operator_restricted() {
        assert!(SetStringExpression::new(Operator::Ge, vec!["UpToDate".into()]).is_err());

        // 60021([0, ["UpToDate"]])
        let bytes = hex!("d9 ea 75 82 00 81 68 55 70 54 6f 44 61 74 65");
        let err = cbor::from_slice::<SetStringExpression>(&bytes).unwrap_err();
        assert!(err
            .to_string()
            .contains("set expression operator must be mem or nmem"));
    }

    #[test]
    fn test_set_string_expression() {
        let expr = StringsOrExpression::Expression(
            SetStringExpression::new(Operator::Nmem, vec!["INTEL-SA-00079".to_string()]).unwrap(),
        );

        let bytes = cbor::to_vec(&expr).unwrap();
        assert_eq!(&bytes[..5], &hex!("d9 ea 75 82 06"));
        assert_eq!(cbor::from_slice::<StringsOrExpression>(&bytes).unwrap(), expr);

        let StringsOrExpression::Expression(inner) = &expr else {
            unreachable!()
        };
        assert!(inner.matches(&"INTEL-SA-00080".to_string()));
        assert!(!inner.matches(&"INTEL-SA-00079".to_string()));
    }

    #[test]
    fn test_digests_or_expression() {
        let digest = HashEntry::new(HashAlgorithm::SHA256, [7u8; 32]);
        let plain = DigestsOrExpression::Set(vec![digest.clone()]);
        let expr = DigestsOrExpression::Expression(
            SetDigestExpression::new(Operator::Mem, vec![digest]).unwrap(),
        );

        for value in [plain, expr] {
            let bytes = cbor::to_vec(&value).unwrap();
            assert_eq!(cbor::from_slice::<DigestsOrExpression>(&bytes).unwrap(), value);
            let json = cbor::to_json(&value).unwrap();
            assert_eq!(cbor::from_json::<DigestsOrExpression>(&json).unwrap(), value);
        }
    }
}
