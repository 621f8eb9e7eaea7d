//! TLV (Type-Length-Value) encoding and decoding utilities.
//!
//! This module provides functions for encoding and decoding NDN TLV
//! elements. Both the type and the length field use the NDN variable-width
//! number scheme, so multi-byte types such as the NDN-LP Nack header (800)
//! encode correctly.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/* ---------------------------------------------------------------- *
 * TLV type constants
 * ---------------------------------------------------------------- */

pub const TLV_INTEREST: u32 = 0x05;
pub const TLV_DATA: u32 = 0x06;
pub const TLV_NAME: u32 = 0x07;

pub const TLV_GENERIC_COMPONENT: u32 = 0x08;
pub const TLV_KEYWORD_COMPONENT: u32 = 0x20;
pub const TLV_SEGMENT_COMPONENT: u32 = 0x21;
pub const TLV_VERSION_COMPONENT: u32 = 0x23;

pub const TLV_CAN_BE_PREFIX: u32 = 0x21;
pub const TLV_MUST_BE_FRESH: u32 = 0x12;
pub const TLV_NONCE: u32 = 0x0A;
pub const TLV_INTEREST_LIFETIME: u32 = 0x0C;

pub const TLV_META_INFO: u32 = 0x14;
pub const TLV_CONTENT_TYPE: u32 = 0x18;
pub const TLV_FRESHNESS_PERIOD: u32 = 0x19;
pub const TLV_FINAL_BLOCK_ID: u32 = 0x1A;
pub const TLV_CONTENT: u32 = 0x15;
pub const TLV_SIGNATURE_INFO: u32 = 0x16;
pub const TLV_SIGNATURE_TYPE: u32 = 0x1B;
pub const TLV_SIGNATURE_VALUE: u32 = 0x17;

/* ---------------------------------------------------------------- *
 * Variable-width number helpers
 * ---------------------------------------------------------------- */

/// Encode a variable-width TLV number (used for both type and length).
///
/// * `< 253`  -> 1 byte
/// * `<= 65 535`  -> marker 253 + 2-byte value
/// * otherwise -> marker 254 + 4-byte value
pub fn encode_var_number(number: u64, buf: &mut BytesMut) {
    if number < 253 {
        buf.put_u8(number as u8);
    } else if number <= 65_535 {
        buf.put_u8(253);
        buf.put_u16(number as u16);
    } else {
        buf.put_u8(254);
        buf.put_u32(number as u32);
    }
}

/// Decode a variable-width TLV number using NDN rules.
pub fn decode_var_number(buf: &mut impl Buf) -> Result<u64, Error> {
    if !buf.has_remaining() {
        return Err(Error::Tlv("buffer underflow when decoding TLV number".into()));
    }

    let first_byte = buf.get_u8();
    match first_byte {
        0..=252 => Ok(first_byte as u64),
        253 => {
            if buf.remaining() < 2 {
                return Err(Error::Tlv("buffer underflow when decoding 16-bit TLV number".into()));
            }
            Ok(buf.get_u16() as u64)
        }
        254 => {
            if buf.remaining() < 4 {
                return Err(Error::Tlv("buffer underflow when decoding 32-bit TLV number".into()));
            }
            Ok(buf.get_u32() as u64)
        }
        255 => Err(Error::Tlv("64-bit TLV numbers not supported".into())),
    }
}

/// Number of bytes required to encode `number` with the variable-width scheme.
pub fn var_number_size(number: u64) -> usize {
    if number < 253 {
        1
    } else if number <= 65_535 {
        3
    } else {
        5
    }
}

/* ---------------------------------------------------------------- *
 * NonNegativeInteger helpers
 * ---------------------------------------------------------------- */

/// Encode an NDN NonNegativeInteger as the shortest of 1, 2, 4 or 8 bytes.
pub fn encode_nn_int(value: u64) -> Bytes {
    let mut buf = BytesMut::new();
    if value <= 0xFF {
        buf.put_u8(value as u8);
    } else if value <= 0xFFFF {
        buf.put_u16(value as u16);
    } else if value <= 0xFFFF_FFFF {
        buf.put_u32(value as u32);
    } else {
        buf.put_u64(value);
    }
    buf.freeze()
}

/// Decode an NDN NonNegativeInteger from its 1, 2, 4 or 8 byte form.
pub fn decode_nn_int(bytes: &[u8]) -> Result<u64, Error> {
    match bytes.len() {
        1 => Ok(bytes[0] as u64),
        2 => Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as u64),
        4 => Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok(u64::from_be_bytes(raw))
        }
        n => Err(Error::Tlv(format!(
            "invalid NonNegativeInteger length {}",
            n
        ))),
    }
}

/* ---------------------------------------------------------------- *
 * TLV element wrapper
 * ---------------------------------------------------------------- */

/// A generic TLV element consisting of *type*, *length* and *value*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub tlv_type: u32,
    pub value: Bytes,
}

impl TlvElement {
    /// Create a new wrapper from raw parts.
    pub fn new(tlv_type: u32, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    /// Total number of bytes when this element is encoded.
    pub fn len(&self) -> usize {
        let vlen = self.value.len();
        var_number_size(self.tlv_type as u64) + var_number_size(vlen as u64) + vlen
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Encode this element into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_var_number(self.tlv_type as u64, buf);
        encode_var_number(self.value.len() as u64, buf);
        buf.extend_from_slice(&self.value);
    }

    /// Decode a single element from `buf` **in-place**.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < 2 {
            return Err(Error::Tlv("buffer too small for TLV header".into()));
        }

        let tlv_type = decode_var_number(buf)? as u32;
        let length = decode_var_number(buf)? as usize;

        if buf.remaining() < length {
            return Err(Error::Tlv(format!(
                "buffer underflow: TLV value requires {} bytes but only {} available",
                length,
                buf.remaining()
            )));
        }

        let value = buf.copy_to_bytes(length);
        Ok(Self { tlv_type, value })
    }

    /// Decode the element and verify it carries the expected type.
    pub fn decode_expect(buf: &mut impl Buf, expected: u32) -> Result<Self, Error> {
        let element = Self::decode(buf)?;
        if element.tlv_type != expected {
            return Err(Error::Tlv(format!(
                "expected TLV type {}, got {}",
                expected, element.tlv_type
            )));
        }
        Ok(element)
    }

    /// Interpret the value as a NonNegativeInteger.
    pub fn as_nn_int(&self) -> Result<u64, Error> {
        decode_nn_int(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_number_widths() {
        let mut buf = BytesMut::new();
        encode_var_number(100, &mut buf);
        assert_eq!(buf.len(), 1);
        assert_eq!(decode_var_number(&mut buf.clone().freeze()).unwrap(), 100);

        buf.clear();
        encode_var_number(1000, &mut buf);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[0], 253);
        assert_eq!(decode_var_number(&mut buf.clone().freeze()).unwrap(), 1000);

        buf.clear();
        encode_var_number(100_000, &mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], 254);
        assert_eq!(decode_var_number(&mut buf.clone().freeze()).unwrap(), 100_000);
    }

    #[test]
    fn element_roundtrip_multibyte_type() {
        // The LP Nack header type (800) does not fit in a single byte.
        let element = TlvElement::new(0x0320, Bytes::from_static(b"abc"));
        let mut buf = BytesMut::new();
        element.encode(&mut buf);
        assert_eq!(buf.len(), element.len());

        let decoded = TlvElement::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn nn_int_shortest_form() {
        assert_eq!(encode_nn_int(7).len(), 1);
        assert_eq!(encode_nn_int(300).len(), 2);
        assert_eq!(encode_nn_int(70_000).len(), 4);
        assert_eq!(encode_nn_int(u64::MAX).len(), 8);

        for value in [0u64, 255, 256, 65_535, 65_536, u32::MAX as u64 + 1] {
            let wire = encode_nn_int(value);
            assert_eq!(decode_nn_int(&wire).unwrap(), value);
        }
    }

    #[test]
    fn truncated_element_rejected() {
        let mut buf = BytesMut::new();
        encode_var_number(0x05, &mut buf);
        encode_var_number(10, &mut buf);
        buf.extend_from_slice(b"short");

        assert!(TlvElement::decode(&mut buf.freeze()).is_err());
    }
}
