// SPDX-License-Identifier: MIT

//! The crypto-key tagged choice.

use base64::{engine::general_purpose::STANDARD, Engine};
use ciborium::{tag::Required, Value};
use coset::{AsCborValue, CoseKey};
use openssl::{pkey::PKey, x509::X509};
use serde::{Deserialize, Serialize};

use crate::{
    cbor::{
        self, TAG_BYTES, TAG_CERT_PATH_THUMBPRINT, TAG_CERT_THUMBPRINT, TAG_COSE_KEY,
        TAG_PKIX_BASE64_CERT, TAG_PKIX_BASE64_CERT_PATH, TAG_PKIX_BASE64_KEY, TAG_RAW_PUBLIC_KEY,
        TAG_THUMBPRINT,
    },
    choice::{
        de_error, from_cbor, from_json, serialize_envelope, serialize_tagged, split_envelope,
        unexpected_cbor, ChoiceKind, Peeked, RegisteredChoice,
    },
    Bytes, Error, HashEntry, ParseError, Result,
};

/// A verification key, certificate, or key identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum CryptoKey {
    /// PEM-encoded SubjectPublicKeyInfo
    PkixBase64Key(String),
    /// PEM-encoded X.509 certificate
    PkixBase64Cert(String),
    /// PEM-encoded certificate chain, leaf first
    PkixBase64CertPath(Vec<String>),
    /// Digest of a key
    Thumbprint(HashEntry),
    /// Digest of a certificate
    CertThumbprint(HashEntry),
    /// Opaque key identifier, e.g. a PSA signer-id
    Bytes(Bytes),
    CertPathThumbprint(HashEntry),
    RawPublicKey(Bytes),
    /// COSE_Key map, kept as parsed CBOR
    CoseKey(Value),
    Registered(RegisteredChoice),
}

impl CryptoKey {
    pub fn type_name(&self) -> &str {
        match self {
            Self::PkixBase64Key(_) => "pkix-base64-key",
            Self::PkixBase64Cert(_) => "pkix-base64-cert",
            Self::PkixBase64CertPath(_) => "pkix-base64-cert-path",
            Self::Thumbprint(_) => "thumbprint",
            Self::CertThumbprint(_) => "cert-thumbprint",
            Self::Bytes(_) => "bytes",
            Self::CertPathThumbprint(_) => "cert-path-thumbprint",
            Self::RawPublicKey(_) => "raw-public-key",
            Self::CoseKey(_) => "cose-key",
            Self::Registered(r) => &r.type_name,
        }
    }

    /// Wraps a `coset` key, which is stored in its CBOR form.
    pub fn from_cose_key(key: CoseKey) -> Result<Self> {
        key.to_cbor_value()
            .map_err(|e| Error::marshal(format!("COSE_Key: {e:?}")))
            .and_then(cbor::canonicalize)
            .map(Self::CoseKey)
    }

    pub fn valid(&self) -> Result<()> {
        match self {
            Self::PkixBase64Key(pem) => PKey::public_key_from_pem(pem.as_bytes())
                .map(|_| ())
                .map_err(|e| Error::validation(format!("could not parse public key: {e}"))),
            Self::PkixBase64Cert(pem) => X509::from_pem(pem.as_bytes())
                .map(|_| ())
                .map_err(|e| Error::validation(format!("could not parse certificate: {e}"))),
            Self::PkixBase64CertPath(chain) => {
                if chain.is_empty() {
                    return Err(Error::validation("empty certificate path"));
                }
                for (i, pem) in chain.iter().enumerate() {
                    X509::from_pem(pem.as_bytes()).map_err(|e| {
                        Error::validation(format!(
                            "could not parse certificate at index {i}: {e}"
                        ))
                    })?;
                }
                Ok(())
            }
            Self::Thumbprint(h) | Self::CertThumbprint(h) | Self::CertPathThumbprint(h) => {
                h.valid()
            }
            Self::Bytes(b) | Self::RawPublicKey(b) => {
                if b.is_empty() {
                    Err(Error::validation(format!("empty {}", self.type_name())))
                } else {
                    Ok(())
                }
            }
            Self::CoseKey(v) => CoseKey::from_cbor_value(v.clone())
                .map(|_| ())
                .map_err(|e| Error::validation(format!("invalid COSE_Key: {e:?}"))),
            Self::Registered(r) => r.valid(),
        }
    }
}

impl Serialize for CryptoKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = self.type_name();
        match self {
            Self::PkixBase64Key(v) => serialize_tagged::<TAG_PKIX_BASE64_KEY, _, _>(serializer, name, v),
            Self::PkixBase64Cert(v) => {
                serialize_tagged::<TAG_PKIX_BASE64_CERT, _, _>(serializer, name, v)
            }
            Self::PkixBase64CertPath(v) => {
                serialize_tagged::<TAG_PKIX_BASE64_CERT_PATH, _, _>(serializer, name, v)
            }
            Self::Thumbprint(v) => serialize_tagged::<TAG_THUMBPRINT, _, _>(serializer, name, v),
            Self::CertThumbprint(v) => {
                serialize_tagged::<TAG_CERT_THUMBPRINT, _, _>(serializer, name, v)
            }
            Self::Bytes(v) => serialize_tagged::<TAG_BYTES, _, _>(serializer, name, v),
            Self::CertPathThumbprint(v) => {
                serialize_tagged::<TAG_CERT_PATH_THUMBPRINT, _, _>(serializer, name, v)
            }
            Self::RawPublicKey(v) => serialize_tagged::<TAG_RAW_PUBLIC_KEY, _, _>(serializer, name, v),
            Self::CoseKey(v) => {
                if serializer.is_human_readable() {
                    let encoded = cbor::value_to_vec(v).map_err(serde::ser::Error::custom)?;
                    serialize_envelope(serializer, name, &STANDARD.encode(encoded))
                } else {
                    Required::<&Value, TAG_COSE_KEY>(v).serialize(serializer)
                }
            }
            Self::Registered(r) => r.serialize(serializer),
        }
    }
}

impl CryptoKey {
    fn from_peeked(peeked: Peeked) -> Result<Self> {
        match peeked {
            Peeked::Cbor(Value::Tag(tag, inner)) => match tag {
                TAG_PKIX_BASE64_KEY => Ok(Self::PkixBase64Key(from_cbor(*inner)?)),
                TAG_PKIX_BASE64_CERT => Ok(Self::PkixBase64Cert(from_cbor(*inner)?)),
                TAG_PKIX_BASE64_CERT_PATH => Ok(Self::PkixBase64CertPath(from_cbor(*inner)?)),
                TAG_THUMBPRINT => Ok(Self::Thumbprint(from_cbor(*inner)?)),
                TAG_CERT_THUMBPRINT => Ok(Self::CertThumbprint(from_cbor(*inner)?)),
                TAG_BYTES => Ok(Self::Bytes(from_cbor(*inner)?)),
                TAG_CERT_PATH_THUMBPRINT => Ok(Self::CertPathThumbprint(from_cbor(*inner)?)),
                TAG_RAW_PUBLIC_KEY => Ok(Self::RawPublicKey(from_cbor(*inner)?)),
                TAG_COSE_KEY => match *inner {
                    v @ Value::Map(_) => Ok(Self::CoseKey(v)),
                    _ => Err(ParseError::cbor("COSE_Key must be a map").into()),
                },
                _ => RegisteredChoice::from_cbor(ChoiceKind::CryptoKey, tag, *inner)
                    .map(Self::Registered),
            },
            Peeked::Cbor(other) => Err(unexpected_cbor(ChoiceKind::CryptoKey, &other)),
            Peeked::Json(json) => {
                let (typ, value) = split_envelope(json)?;
                match typ.as_str() {
                    "pkix-base64-key" => Ok(Self::PkixBase64Key(from_json(value)?)),
                    "pkix-base64-cert" => Ok(Self::PkixBase64Cert(from_json(value)?)),
                    "pkix-base64-cert-path" => Ok(Self::PkixBase64CertPath(from_json(value)?)),
                    "thumbprint" => Ok(Self::Thumbprint(from_json(value)?)),
                    "cert-thumbprint" => Ok(Self::CertThumbprint(from_json(value)?)),
                    "bytes" => Ok(Self::Bytes(from_json(value)?)),
                    "cert-path-thumbprint" => Ok(Self::CertPathThumbprint(from_json(value)?)),
                    "raw-public-key" => Ok(Self::RawPublicKey(from_json(value)?)),
                    "cose-key" => {
                        let encoded: Bytes = from_json(value)?;
                        match cbor::value_from_slice(&encoded)? {
                            v @ Value::Map(_) => Ok(Self::CoseKey(v)),
                            _ => Err(ParseError::json("COSE_Key must be a map").into()),
                        }
                    }
                    other => RegisteredChoice::from_json(ChoiceKind::CryptoKey, other, value)
                        .map(Self::Registered),
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for CryptoKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_peeked(Peeked::deserialize(deserializer)?).map_err(de_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::EC_P256_PUBLIC_PEM, test::SerdeTestCase, HashAlgorithm};
    use coset::{iana, CoseKeyBuilder};
    use hex_literal::hex;

    #[test]
    fn test_bytes_key() {
        SerdeTestCase {
            value: CryptoKey::Bytes([0xcc; 4].into()),
            expected_json: r#"{"type":"bytes","value":"zMzMzA=="}"#,
            expected_cbor: hex!("d9 02 30 44 cc cc cc cc").to_vec(),
        }
        .run();
    }

    #[test]
    fn test_pkix_key_validation() {
        let key = CryptoKey::PkixBase64Key(EC_P256_PUBLIC_PEM.to_string());
        key.valid().unwrap();

        let bytes = cbor::to_vec(&key).unwrap();
        assert_eq!(&bytes[..3], &hex!("d9 02 2a"));
        assert_eq!(cbor::from_slice::<CryptoKey>(&bytes).unwrap(), key);

        let bad = CryptoKey::PkixBase64Key("not a key".to_string());
        assert!(bad
            .valid()
            .unwrap_err()
            .to_string()
            .starts_with("could not parse public key"));
    }

    #[test]
    fn test_thumbprint() {
        let key = CryptoKey::Thumbprint(HashEntry::new(HashAlgorithm::SHA256, [0u8; 32]));
        key.valid().unwrap();

        let json = cbor::to_json(&key).unwrap();
        assert_eq!(
            json,
            r#"{"type":"thumbprint","value":"sha-256;AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}"#
        );
        assert_eq!(cbor::from_json::<CryptoKey>(&json).unwrap(), key);
    }

    #[test]
    fn test_cose_key() {
        let key = CoseKeyBuilder::new_ec2_pub_key(
            iana::EllipticCurve::P_256,
            vec![1u8; 32],
            vec![2u8; 32],
        )
        .build();
        let key = CryptoKey::from_cose_key(key).unwrap();
        key.valid().unwrap();

        let bytes = cbor::to_vec(&key).unwrap();
        assert_eq!(&bytes[..3], &hex!("d9 02 58"));
        assert_eq!(cbor::from_slice::<CryptoKey>(&bytes).unwrap(), key);

        let json = cbor::to_json(&key).unwrap();
        assert_eq!(cbor::from_json::<CryptoKey>(&json).unwrap(), key);

        let bad = CryptoKey::CoseKey(Value::Map(vec![(Value::from(1), Value::Bytes(vec![0]))]));
        assert!(bad.valid().is_err());
    }

    #[test]
    fn test_unknown_tag() {
        // 1234("x")
        let err = cbor::from_slice::<CryptoKey>(&hex!("d9 04 d2 61 78")).unwrap_err();
        assert!(err
            .to_string()
            .contains("unknown crypto-key variant tag 1234"));
    }
}
