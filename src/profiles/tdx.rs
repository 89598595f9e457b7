// SPDX-License-Identifier: MIT

//! Intel TDX profile (OID `2.16.840.1.113741.1.16.1`).
//!
//! TDX reference values extend the measurement-value map with TEE-specific
//! entries under negative keys. Several of them may hold an expression
//! instead of a plain value, e.g. `isvsvn >= 5` or `tcbstatus mem
//! ["UpToDate"]`. All fields are declared at the `Mval` extension point, so
//! they are bound in reference values, endorsed values and evidence alike.

use std::sync::Arc;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::{
    choice::{de_error, from_cbor, from_json, serialize_envelope, split_envelope, Peeked},
    Bytes, DigestsOrExpression, Error, Extension, ExtensionField, ExtensionPoint,
    ExtensionTarget, FieldKind, Mval, Oid, ParseError, ProfileId, ProfileManifest, Result,
    ResultExt, StringsOrExpression, UintOrExpression,
};

pub const PROFILE_OID: &str = "2.16.840.1.113741.1.16.1";

pub const VENDOR: i64 = -5;
pub const MODEL: i64 = -6;
pub const TCB_DATE: i64 = -72;
pub const ISV_SVN: i64 = -73;
pub const INSTANCE_ID: i64 = -77;
pub const PCE_ID: i64 = -80;
pub const MISC_SELECT: i64 = -81;
pub const ATTRIBUTES: i64 = -82;
pub const MR_TEE: i64 = -83;
pub const MR_SIGNER: i64 = -84;
pub const ISV_PROD_ID: i64 = -85;
pub const TCB_EVAL_NUM: i64 = -86;
pub const TCB_STATUS: i64 = -88;
pub const ADVISORY_IDS: i64 = -89;
pub const EPOCH: i64 = -90;
pub const TCB_COMP_SVN: i64 = -125;

/// Upper bound on `tcbcompsvn` entries.
pub const MAX_TCB_COMP_SVN: usize = 16;

/// A TEE identifier given either as a number or as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UintOrBytes {
    Uint(u64),
    Bytes(Bytes),
}

impl UintOrBytes {
    fn from_peeked(peeked: Peeked) -> Result<Self> {
        match peeked {
            Peeked::Cbor(v @ Value::Integer(_)) => from_cbor(v).map(Self::Uint),
            Peeked::Cbor(Value::Bytes(b)) => Ok(Self::Bytes(b.into())),
            Peeked::Cbor(_) => Err(ParseError::cbor("expected a uint or a byte string").into()),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "uint" => from_json(value).map(Self::Uint),
                    "bytes" => from_json(value).map(Self::Bytes),
                    other => Err(ParseError::json(format!("unknown type \"{other}\"")).into()),
                }
            }
        }
    }
}

impl Serialize for UintOrBytes {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Uint(v) if serializer.is_human_readable() => {
                serialize_envelope(serializer, "uint", v)
            }
            Self::Uint(v) => serializer.serialize_u64(*v),
            Self::Bytes(b) if serializer.is_human_readable() => {
                serialize_envelope(serializer, "bytes", b)
            }
            Self::Bytes(b) => b.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for UintOrBytes {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

/// The TEE fields of a TDX measurement value.
pub fn fields() -> Vec<ExtensionField> {
    vec![
        ExtensionField::new(VENDOR, "vendor", FieldKind::text()),
        ExtensionField::new(MODEL, "model", FieldKind::text()),
        ExtensionField::new(TCB_DATE, "tcbdate", FieldKind::time()),
        ExtensionField::new(ISV_SVN, "isvsvn", FieldKind::typed::<UintOrExpression>()),
        ExtensionField::new(INSTANCE_ID, "instanceid", FieldKind::typed::<UintOrBytes>()),
        ExtensionField::new(PCE_ID, "pceid", FieldKind::text()),
        ExtensionField::new(MISC_SELECT, "miscselect", FieldKind::bytes()),
        ExtensionField::new(ATTRIBUTES, "attributes", FieldKind::bytes()),
        ExtensionField::new(MR_TEE, "mrtee", FieldKind::typed::<DigestsOrExpression>()),
        ExtensionField::new(MR_SIGNER, "mrsigner", FieldKind::typed::<DigestsOrExpression>()),
        ExtensionField::new(ISV_PROD_ID, "isvprodid", FieldKind::typed::<UintOrBytes>()),
        ExtensionField::new(TCB_EVAL_NUM, "tcbevalnum", FieldKind::typed::<UintOrExpression>()),
        ExtensionField::new(TCB_STATUS, "tcbstatus", FieldKind::typed::<StringsOrExpression>()),
        ExtensionField::new(ADVISORY_IDS, "advisoryids", FieldKind::typed::<StringsOrExpression>()),
        ExtensionField::new(EPOCH, "epoch", FieldKind::time()),
        ExtensionField::new(
            TCB_COMP_SVN,
            "tcbcompsvn",
            FieldKind::typed::<Vec<UintOrExpression>>(),
        ),
    ]
}

/// Field declarations and expression checks for TDX measurement values.
pub struct TdxMval {
    fields: Vec<ExtensionField>,
}

impl TdxMval {
    pub fn new() -> Self {
        Self { fields: fields() }
    }
}

impl Default for TdxMval {
    fn default() -> Self {
        Self::new()
    }
}

fn typed<T: serde::de::DeserializeOwned>(mval: &Mval, key: i64, name: &str) -> Result<Option<T>> {
    mval.extensions
        .get(key)
        .map(|v| v.decode())
        .transpose()
        .map_err(|e| Error::validation(format!("{name}: {e}")))
}

fn check_mval(mval: &Mval) -> Result<()> {
    for (key, name) in [(ISV_SVN, "isvsvn"), (TCB_EVAL_NUM, "tcbevalnum")] {
        if let Some(v) = typed::<UintOrExpression>(mval, key, name)? {
            v.valid().context(name)?;
        }
    }

    for (key, name) in [(MR_TEE, "mrtee"), (MR_SIGNER, "mrsigner")] {
        if let Some(v) = typed::<DigestsOrExpression>(mval, key, name)? {
            v.valid().context(name)?;
        }
    }

    for (key, name) in [(TCB_STATUS, "tcbstatus"), (ADVISORY_IDS, "advisoryids")] {
        if let Some(v) = typed::<StringsOrExpression>(mval, key, name)? {
            v.valid().context(name)?;
        }
    }

    if let Some(svns) = typed::<Vec<UintOrExpression>>(mval, TCB_COMP_SVN, "tcbcompsvn")? {
        if svns.len() > MAX_TCB_COMP_SVN {
            return Err(Error::validation(format!(
                "tcbcompsvn has {} entries, at most {MAX_TCB_COMP_SVN} allowed",
                svns.len()
            )));
        }
        for (i, svn) in svns.iter().enumerate() {
            svn.valid().with_context(|| format!("tcbcompsvn at index {i}"))?;
        }
    }

    Ok(())
}

impl Extension for TdxMval {
    fn fields(&self) -> &[ExtensionField] {
        &self.fields
    }

    fn constrain(&self, target: &ExtensionTarget<'_>) -> Result<()> {
        match target {
            ExtensionTarget::Mval(mval) => check_mval(mval),
            _ => Ok(()),
        }
    }
}

/// BER encoding of [`PROFILE_OID`].
const PROFILE_OID_BER: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x86, 0xf8, 0x4d, 0x01, 0x10, 0x01];

pub fn profile_id() -> ProfileId {
    ProfileId::Oid(Oid::from_static_ber(PROFILE_OID_BER))
}

pub fn manifest() -> ProfileManifest {
    ProfileManifest::from_extension(profile_id(), ExtensionPoint::Mval, Arc::new(TdxMval::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ClassId, Comid, ConciseEvidence, Environment, HashAlgorithm, HashEntry, Measurement,
        NumericExpression, NumericType, Operator, SetExpression, UnsignedCorim,
    };

    fn field(key: i64) -> ExtensionField {
        fields().into_iter().find(|f| f.key == key).unwrap()
    }

    fn tdx_mval() -> Mval {
        let mut mval = Mval::new().with_digest(HashEntry::new(HashAlgorithm::SHA384, [0x11; 48]));
        let ext = &mut mval.extensions;
        ext.set(&field(VENDOR), "Intel Corporation").unwrap();
        ext.set(
            &field(ISV_SVN),
            &UintOrExpression::Expression(NumericExpression::new(Operator::Ge, NumericType::Uint(5))),
        )
        .unwrap();
        ext.set(
            &field(TCB_STATUS),
            &StringsOrExpression::Expression(
                SetExpression::new(Operator::Mem, vec!["UpToDate".to_string()]).unwrap(),
            ),
        )
        .unwrap();
        ext.set(
            &field(MR_SIGNER),
            &DigestsOrExpression::Set(vec![HashEntry::new(HashAlgorithm::SHA384, [0x22; 48])]),
        )
        .unwrap();
        ext.set(&field(TCB_COMP_SVN), &vec![UintOrExpression::Uint(1); 3])
            .unwrap();
        mval
    }

    fn tdx_corim(mval: Mval) -> UnsignedCorim {
        let mut comid = Comid::new("tdx-qe");
        comid.add_reference_value(
            Environment::from_class_id(ClassId::Oid("2.16.840.1.113741.1.2.3.4.5".parse().unwrap())),
            vec![Measurement::new(mval)],
        );

        let mut corim = UnsignedCorim::new("tdx").with_profile(profile_id());
        corim.add_comid(comid);
        corim
    }

    #[test]
    fn test_profile_id_matches_dotted_form() {
        assert_eq!(profile_id(), ProfileId::oid(PROFILE_OID).unwrap());
        assert_eq!(profile_id().to_string(), PROFILE_OID);
        assert_eq!(manifest().fields(ExtensionPoint::Mval).len(), fields().len());
    }

    #[test]
    fn test_tdx_fields_round_trip() {
        let corim = tdx_corim(tdx_mval());
        corim.valid().unwrap();

        let decoded = UnsignedCorim::from_cbor(&corim.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, corim);
        decoded.valid().unwrap();

        let mval = &decoded.comids().next().unwrap().triples.reference_values[0].measurements[0].value;
        assert!(mval.extensions.field_cache().is_empty());
        assert_eq!(
            mval.extensions.get_as::<String>(&field(VENDOR)).unwrap().as_deref(),
            Some("Intel Corporation")
        );

        let json = corim.to_json().unwrap();
        assert!(json.contains(r#""isvsvn":{"type":"numeric-expression""#), "{json}");
        let from_json = UnsignedCorim::from_json(&json).unwrap();
        assert_eq!(from_json.to_cbor().unwrap(), corim.to_cbor().unwrap());
    }

    #[test]
    fn test_tcbcompsvn_limit() {
        let mut mval = tdx_mval();
        mval.extensions
            .set(&field(TCB_COMP_SVN), &vec![UintOrExpression::Uint(1); 17])
            .unwrap();

        let err = tdx_corim(mval).valid().unwrap_err().to_string();
        assert!(err.ends_with("tcbcompsvn has 17 entries, at most 16 allowed"), "{err}");
    }

    #[test]
    fn test_mistyped_field_is_a_parse_error_on_decode() {
        let mut mval = tdx_mval();
        mval.extensions.insert(ISV_SVN, Value::Text("five".into()).into());
        let bytes = tdx_corim(mval).to_cbor().unwrap();

        let err = UnsignedCorim::from_cbor(&bytes).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().starts_with("extension field \"isvsvn\" (-73): "));
    }

    #[test]
    fn test_evidence_values_are_bound() {
        let mut evidence = ConciseEvidence::new().with_profile(profile_id());
        evidence.add_evidence(
            Environment::from_class_id(ClassId::Int(1)),
            vec![Measurement::new(tdx_mval())],
        );

        let decoded = ConciseEvidence::from_cbor(&evidence.to_cbor().unwrap()).unwrap();
        let mval = &decoded.triples.evidence_triples[0].measurements[0].value;
        assert!(mval.extensions.field_cache().is_empty());
        decoded.valid().unwrap();
    }

    #[test]
    fn test_uint_or_bytes() {
        let v = UintOrBytes::Bytes(vec![0, 1].into());
        assert_eq!(crate::cbor::to_json(&v).unwrap(), r#"{"type":"bytes","value":"AAE="}"#);
        assert_eq!(crate::cbor::to_vec(&UintOrBytes::Uint(7)).unwrap(), vec![0x07]);
    }
}
