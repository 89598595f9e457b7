// SPDX-License-Identifier: MIT

//! Fixed-length byte arrays.
//!
//! [`FixedBytes`] encodes as a CBOR byte string and as a base64 (standard
//! alphabet, padded) JSON string. Decoding enforces the exact length.
//!
//! ```rust
//! use rats_corim::fixed_bytes::FixedBytes;
//!
//! let bytes: FixedBytes<4> = FixedBytes([1, 2, 3, 4]);
//! assert_eq!(&bytes[..], &[1, 2, 3, 4]);
//! ```
use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD, Engine};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From};
use serde::{
    de::{Error, Visitor},
    Deserialize, Serialize, Serializer,
};

struct FixedBytesVisitor<const N: usize>(PhantomData<[u8; N]>);

impl<'de, const N: usize> Visitor<'de> for FixedBytesVisitor<N> {
    type Value = FixedBytes<N>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a byte array of length {}", N)
    }

    fn visit_borrowed_bytes<E: Error>(self, v: &'de [u8]) -> Result<Self::Value, E> {
        self.visit_bytes(v)
    }

    fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        self.visit_bytes(&v)
    }

    fn visit_bytes<E: Error>(self, value: &[u8]) -> Result<Self::Value, E> {
        FixedBytes::try_from(value).map_err(E::custom)
    }

    fn visit_str<E: Error>(self, value: &str) -> Result<Self::Value, E> {
        let decoded = STANDARD.decode(value).map_err(E::custom)?;
        self.visit_bytes(&decoded)
    }
}

/// A byte array of exactly `N` bytes.
#[derive(From, AsMut, AsRef, Deref, DerefMut, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> TryFrom<&[u8]> for FixedBytes<N> {
    type Error = String;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; N] = value.try_into().map_err(|_| {
            format!(
                "expected a byte array of length {}, but got {}",
                N,
                value.len()
            )
        })?;
        Ok(Self(arr))
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(FixedBytesVisitor(PhantomData))
        } else {
            deserializer.deserialize_bytes(FixedBytesVisitor(PhantomData))
        }
    }
}

impl<const N: usize> std::fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedBytes<{}>{:02x?}", N, &self.0[..])
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_bytes_debug_format() {
        let bytes: FixedBytes<3> = FixedBytes([10, 11, 12]);
        assert_eq!(format!("{:?}", bytes), "FixedBytes<3>[0a, 0b, 0c]");
    }

    #[test]
    fn test_fixed_bytes_derived_access() {
        let mut bytes = FixedBytes::from([0u8; 4]);
        bytes[0] = 0x01;
        let tail: &mut [u8; 4] = bytes.as_mut();
        tail[3] = 0x04;
        assert_eq!(bytes.len(), 4);
        let all: &[u8; 4] = bytes.as_ref();
        assert_eq!(all, &[0x01, 0, 0, 0x04]);
    }

    #[test]
    fn test_fixed_bytes_wrong_length() {
        let err = FixedBytes::<4>::try_from(&[1u8, 2, 3][..]).unwrap_err();
        assert_eq!(err, "expected a byte array of length 4, but got 3");
    }

    #[test]
    fn test_fixed_bytes_serde() {
        let bytes: FixedBytes<2> = FixedBytes([0xde, 0xad]);

        let mut cbor = vec![];
        ciborium::into_writer(&bytes, &mut cbor).unwrap();
        assert_eq!(cbor, vec![0x42, 0xde, 0xad]);

        let json = serde_json::to_string(&bytes).unwrap();
        assert_eq!(json, "\"3q0=\"");

        let back: FixedBytes<2> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bytes);

        assert!(serde_json::from_str::<FixedBytes<3>>(&json).is_err());
    }
}
