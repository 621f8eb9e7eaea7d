//! NDN-LP link protocol framing.
//!
//! Every packet on the data-plane face travels inside an LpPacket. The one
//! LP field this stack depends on is the PIT token: an 8-byte value the
//! consumer attaches to an Interest and the forwarder copies onto the
//! matching Data or Nack, allowing O(1) demultiplexing without re-parsing
//! names.

use crate::error::Error;
use crate::ndn::{self, Data, Interest, Nack, NackReason};
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;

pub const TLV_LP_PACKET: u32 = 0x64;
pub const TLV_LP_FRAGMENT: u32 = 0x50;
pub const TLV_LP_PIT_TOKEN: u32 = 0x62;
pub const TLV_LP_NACK: u32 = 0x0320;
pub const TLV_LP_NACK_REASON: u32 = 0x0321;

/* ---------------------------------------------------------------- *
 * PIT token
 * ---------------------------------------------------------------- */

/// An opaque 8-byte per-Interest identifier, big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitToken(u64);

impl PitToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The 64-bit token value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The 8-byte network-order wire form.
    pub fn to_wire(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Recover the token from its 8-byte network-order wire form.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 8 {
            return Err(Error::Packet(format!(
                "PIT token must be 8 bytes, got {}",
                bytes.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(Self(u64::from_be_bytes(raw)))
    }
}

impl fmt::Display for PitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/* ---------------------------------------------------------------- *
 * LP frame
 * ---------------------------------------------------------------- */

/// The payload carried by a decoded LP frame.
#[derive(Debug, Clone)]
pub enum LpPayload {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

/// A decoded LP frame: payload plus the PIT token, if present.
#[derive(Debug, Clone)]
pub struct LpFrame {
    pub payload: LpPayload,
    pub pit_token: Option<PitToken>,
}

/// Encode an Interest inside an LpPacket carrying `token`.
pub fn encode_interest(interest: &Interest, token: PitToken) -> Bytes {
    encode_fragment(&interest.to_wire(), Some(token), None)
}

/// Encode a Data inside an LpPacket, echoing the requester's token.
pub fn encode_data(data: &Data, token: Option<PitToken>) -> Bytes {
    encode_fragment(&data.to_wire(), token, None)
}

/// Encode a Nack: the rejected Interest wrapped with an LP Nack header.
pub fn encode_nack(nack: &Nack, token: Option<PitToken>) -> Bytes {
    encode_fragment(&nack.interest.to_wire(), token, Some(nack.reason))
}

fn encode_fragment(fragment: &[u8], token: Option<PitToken>, nack: Option<NackReason>) -> Bytes {
    let mut inner = BytesMut::new();

    if let Some(token) = token {
        TlvElement::new(TLV_LP_PIT_TOKEN, Bytes::copy_from_slice(&token.to_wire()))
            .encode(&mut inner);
    }
    if let Some(reason) = nack {
        let mut nack_value = BytesMut::new();
        TlvElement::new(TLV_LP_NACK_REASON, tlv::encode_nn_int(reason.code()))
            .encode(&mut nack_value);
        TlvElement::new(TLV_LP_NACK, nack_value.freeze()).encode(&mut inner);
    }
    TlvElement::new(TLV_LP_FRAGMENT, Bytes::copy_from_slice(fragment)).encode(&mut inner);

    let mut buf = BytesMut::new();
    TlvElement::new(TLV_LP_PACKET, inner.freeze()).encode(&mut buf);
    buf.freeze()
}

/// Decode a frame received from the face.
///
/// A bare (unwrapped) Interest or Data is accepted as well, since a
/// forwarder may omit the LP layer when no LP field is needed.
pub fn decode_frame(wire: &[u8]) -> Result<LpFrame, Error> {
    match ndn::packet_type(wire) {
        Some(TLV_LP_PACKET) => {}
        Some(tlv::TLV_INTEREST) => {
            return Ok(LpFrame {
                payload: LpPayload::Interest(Interest::from_wire(wire)?),
                pit_token: None,
            });
        }
        Some(tlv::TLV_DATA) => {
            return Ok(LpFrame {
                payload: LpPayload::Data(Data::from_wire(wire)?),
                pit_token: None,
            });
        }
        other => {
            return Err(Error::Packet(format!(
                "unrecognized outer TLV type {:?}",
                other
            )));
        }
    }

    let mut buf = Bytes::copy_from_slice(wire);
    let outer = TlvElement::decode_expect(&mut buf, TLV_LP_PACKET)?;

    let mut pit_token = None;
    let mut nack_reason = None;
    let mut fragment = None;

    let mut inner = outer.value;
    while inner.has_remaining() {
        let element = TlvElement::decode(&mut inner)?;
        match element.tlv_type {
            TLV_LP_PIT_TOKEN => pit_token = Some(PitToken::from_wire(&element.value)?),
            TLV_LP_NACK => {
                // An empty Nack header means reason unspecified
                let mut reason = NackReason::Other(0);
                let mut nv = element.value.clone();
                while nv.has_remaining() {
                    let n = TlvElement::decode(&mut nv)?;
                    if n.tlv_type == TLV_LP_NACK_REASON {
                        reason = NackReason::from_code(n.as_nn_int()?);
                    }
                }
                nack_reason = Some(reason);
            }
            TLV_LP_FRAGMENT => fragment = Some(element.value.clone()),
            _ => {}
        }
    }

    let fragment = fragment.ok_or_else(|| Error::Packet("LpPacket without a fragment".into()))?;

    let payload = match (nack_reason, ndn::packet_type(&fragment)) {
        (Some(reason), Some(tlv::TLV_INTEREST)) => {
            LpPayload::Nack(Nack::new(Interest::from_wire(&fragment)?, reason))
        }
        (Some(_), other) => {
            return Err(Error::Packet(format!(
                "LP Nack fragment is not an Interest (type {:?})",
                other
            )));
        }
        (None, Some(tlv::TLV_INTEREST)) => LpPayload::Interest(Interest::from_wire(&fragment)?),
        (None, Some(tlv::TLV_DATA)) => LpPayload::Data(Data::from_wire(&fragment)?),
        (None, other) => {
            return Err(Error::Packet(format!(
                "LP fragment has unsupported type {:?}",
                other
            )));
        }
    };

    Ok(LpFrame { payload, pit_token })
}
