//! NDN packet types and structures.
//!
//! This module provides the Interest, Data and Nack representations used by
//! the ndnft stack, together with the Name type and the naming-convention
//! components (version, segment, keyword) the file-transfer protocol relies
//! on.

use crate::error::Error;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Maximum size of an NDN packet accepted by this stack.
pub const MAX_NDN_PACKET_SIZE: usize = 8800;

/// Well-known keyword for RDR metadata discovery, `32=metadata`.
pub const METADATA_KEYWORD: &[u8] = b"metadata";

/* ---------------------------------------------------------------- *
 * Name components
 * ---------------------------------------------------------------- */

/// A single, typed NDN name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameComponent {
    typ: u32,
    value: Bytes,
}

impl NameComponent {
    /// Creates a GenericNameComponent from a byte slice.
    pub fn generic(bytes: impl Into<Bytes>) -> Self {
        Self {
            typ: tlv::TLV_GENERIC_COMPONENT,
            value: bytes.into(),
        }
    }

    /// Creates a KeywordNameComponent, `32=<keyword>`.
    pub fn keyword(keyword: impl Into<Bytes>) -> Self {
        Self {
            typ: tlv::TLV_KEYWORD_COMPONENT,
            value: keyword.into(),
        }
    }

    /// Creates a SegmentNameComponent, `33=<segment>`.
    pub fn segment(segment: u64) -> Self {
        Self {
            typ: tlv::TLV_SEGMENT_COMPONENT,
            value: tlv::encode_nn_int(segment),
        }
    }

    /// Creates a VersionNameComponent, `35=<version>`.
    pub fn version(version: u64) -> Self {
        Self {
            typ: tlv::TLV_VERSION_COMPONENT,
            value: tlv::encode_nn_int(version),
        }
    }

    /// Returns the component TLV type.
    pub fn typ(&self) -> u32 {
        self.typ
    }

    /// Returns the component value as bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.value
    }

    pub fn is_generic(&self) -> bool {
        self.typ == tlv::TLV_GENERIC_COMPONENT
    }

    pub fn is_segment(&self) -> bool {
        self.typ == tlv::TLV_SEGMENT_COMPONENT
    }

    pub fn is_version(&self) -> bool {
        self.typ == tlv::TLV_VERSION_COMPONENT
    }

    /// True for the `32=metadata` keyword component.
    pub fn is_metadata_keyword(&self) -> bool {
        self.typ == tlv::TLV_KEYWORD_COMPONENT && self.value == METADATA_KEYWORD
    }

    /// Interpret the component value as a NonNegativeInteger (segment or
    /// version number).
    pub fn as_number(&self) -> Result<u64, Error> {
        tlv::decode_nn_int(&self.value)
    }

    /// Encodes this name component as a TLV element.
    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(self.typ, self.value.clone())
    }

    /// Decodes a name component from a TLV element.
    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        match element.tlv_type {
            tlv::TLV_GENERIC_COMPONENT
            | tlv::TLV_KEYWORD_COMPONENT
            | tlv::TLV_SEGMENT_COMPONENT
            | tlv::TLV_VERSION_COMPONENT => Ok(Self {
                typ: element.tlv_type,
                value: element.value.clone(),
            }),
            other => Err(Error::Packet(format!(
                "unsupported name component type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            tlv::TLV_SEGMENT_COMPONENT => {
                return write!(f, "seg={}", self.as_number().unwrap_or(0));
            }
            tlv::TLV_VERSION_COMPONENT => {
                return write!(f, "v={}", self.as_number().unwrap_or(0));
            }
            tlv::TLV_KEYWORD_COMPONENT => {
                write!(f, "32=")?;
            }
            _ => {}
        }

        // Print printable ASCII characters directly, otherwise use hex
        let printable = self
            .value
            .iter()
            .all(|&b| b.is_ascii_graphic() || b == b' ');

        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.value))
        } else {
            write!(f, "0x")?;
            for &b in self.value.iter() {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

/* ---------------------------------------------------------------- *
 * Name
 * ---------------------------------------------------------------- */

/// An NDN name, a sequence of typed name components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    /// Creates a new empty NDN name.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Creates a name from a string representation with '/' as component
    /// separator. All components become GenericNameComponents.
    pub fn from_string(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(|comp| NameComponent::generic(comp.as_bytes().to_vec()))
            .collect();

        Self { components }
    }

    /// Adds a component to the name.
    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Appends the '/'-separated segments of `path` as generic components.
    pub fn push_path(&mut self, path: &str) -> &mut Self {
        for comp in path.split('/').filter(|comp| !comp.is_empty()) {
            self.components
                .push(NameComponent::generic(comp.as_bytes().to_vec()));
        }
        self
    }

    /// Returns the number of components in the name.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns an iterator over the name components.
    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    /// Gets a component at the specified index.
    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// Gets the last component, if any.
    pub fn last(&self) -> Option<&NameComponent> {
        self.components.last()
    }

    /// Returns a prefix of this name with the specified length.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// Checks if this name is a prefix of another name.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.len() > other.len() {
            return false;
        }

        for (i, component) in self.components.iter().enumerate() {
            if component != &other.components[i] {
                return false;
            }
        }

        true
    }

    /// Encodes this name as a TLV element.
    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();

        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }

        TlvElement::new(tlv::TLV_NAME, buf.freeze())
    }

    /// Decodes a name from a TLV element.
    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_NAME {
            return Err(Error::Packet(format!(
                "expected name TLV type {}, got {}",
                tlv::TLV_NAME,
                element.tlv_type
            )));
        }

        let mut components = Vec::new();
        let mut buf = element.value.clone();

        while buf.has_remaining() {
            let element = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&element)?);
        }

        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }

        for component in &self.components {
            write!(f, "/{}", component)?;
        }

        Ok(())
    }
}

/* ---------------------------------------------------------------- *
 * Interest
 * ---------------------------------------------------------------- */

/// An NDN Interest packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    /// The name requested in the Interest.
    pub name: Name,

    /// Whether this Interest can be satisfied by a Data whose name has the
    /// Interest name as a proper prefix.
    pub can_be_prefix: bool,

    /// Whether cached Data must still be fresh to satisfy the Interest.
    pub must_be_fresh: bool,

    /// A nonce value to detect looping Interests.
    pub nonce: u32,

    /// Interest lifetime in milliseconds.
    pub lifetime_ms: u64,
}

impl Interest {
    /// Creates a new Interest packet with default flags.
    pub fn new(name: Name) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));

        let nonce = (now.as_nanos() % u32::MAX as u128) as u32;

        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            nonce,
            lifetime_ms: 4000,
        }
    }

    /// Sets the Interest lifetime.
    pub fn with_lifetime(mut self, lifetime_ms: u64) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }

    /// Sets the nonce value.
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the can_be_prefix flag.
    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    /// Sets the must_be_fresh flag.
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// The Interest lifetime as a Duration.
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }

    /// Encode this Interest into `buf` in wire format.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut inner = BytesMut::new();

        self.name.to_tlv().encode(&mut inner);
        if self.can_be_prefix {
            TlvElement::new(tlv::TLV_CAN_BE_PREFIX, Bytes::new()).encode(&mut inner);
        }
        if self.must_be_fresh {
            TlvElement::new(tlv::TLV_MUST_BE_FRESH, Bytes::new()).encode(&mut inner);
        }
        TlvElement::new(tlv::TLV_NONCE, Bytes::copy_from_slice(&self.nonce.to_be_bytes()))
            .encode(&mut inner);
        TlvElement::new(tlv::TLV_INTEREST_LIFETIME, tlv::encode_nn_int(self.lifetime_ms))
            .encode(&mut inner);

        TlvElement::new(tlv::TLV_INTEREST, inner.freeze()).encode(buf);
    }

    /// The encoded wire form of this Interest.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode an Interest from its wire form.
    pub fn from_wire(wire: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(wire);
        let outer = TlvElement::decode_expect(&mut buf, tlv::TLV_INTEREST)?;

        let mut name = None;
        let mut can_be_prefix = false;
        let mut must_be_fresh = false;
        let mut nonce = 0u32;
        let mut lifetime_ms = 4000u64;

        let mut inner = outer.value;
        while inner.has_remaining() {
            let element = TlvElement::decode(&mut inner)?;
            match element.tlv_type {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&element)?),
                tlv::TLV_CAN_BE_PREFIX => can_be_prefix = true,
                tlv::TLV_MUST_BE_FRESH => must_be_fresh = true,
                tlv::TLV_NONCE => {
                    if element.value.len() != 4 {
                        return Err(Error::Packet("invalid nonce length".into()));
                    }
                    nonce = u32::from_be_bytes([
                        element.value[0],
                        element.value[1],
                        element.value[2],
                        element.value[3],
                    ]);
                }
                tlv::TLV_INTEREST_LIFETIME => lifetime_ms = element.as_nn_int()?,
                // Unknown non-critical elements are skipped
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::Packet("Interest without a name".into()))?;

        Ok(Self {
            name,
            can_be_prefix,
            must_be_fresh,
            nonce,
            lifetime_ms,
        })
    }
}

/* ---------------------------------------------------------------- *
 * Data
 * ---------------------------------------------------------------- */

/// ContentType values used by this stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Payload bytes.
    Blob,
    /// Application-level negative reply.
    Nack,
    /// Any other registered ContentType value.
    Other(u64),
}

impl ContentType {
    pub fn code(&self) -> u64 {
        match self {
            ContentType::Blob => 0,
            ContentType::Nack => 3,
            ContentType::Other(code) => *code,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            0 => ContentType::Blob,
            3 => ContentType::Nack,
            other => ContentType::Other(other),
        }
    }
}

/// Signature type for the SHA-256 digest signature.
const SIGNATURE_DIGEST_SHA256: u64 = 0;

/// An NDN Data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    /// The name of the Data packet.
    pub name: Name,

    /// The content type carried in the MetaInfo.
    pub content_type: ContentType,

    /// Freshness period in milliseconds.
    pub freshness_ms: u64,

    /// FinalBlockId name component, set on RDR metadata packets.
    pub final_block_id: Option<NameComponent>,

    /// The content of the Data packet.
    pub content: Bytes,

    /// The signature value; filled in by [`Data::sign_digest`].
    pub signature_value: Bytes,
}

impl Data {
    /// Creates a new Data packet with Blob content type.
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content_type: ContentType::Blob,
            freshness_ms: 0,
            final_block_id: None,
            content: content.into(),
            signature_value: Bytes::new(),
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets the freshness period.
    pub fn with_freshness(mut self, freshness_ms: u64) -> Self {
        self.freshness_ms = freshness_ms;
        self
    }

    /// Sets the FinalBlockId component.
    pub fn with_final_block_id(mut self, component: NameComponent) -> Self {
        self.final_block_id = Some(component);
        self
    }

    /// The final block id as a segment number, if present.
    pub fn final_block_id_segment(&self) -> Option<u64> {
        self.final_block_id
            .as_ref()
            .and_then(|c| c.as_number().ok())
    }

    fn meta_info_tlv(&self) -> TlvElement {
        let mut inner = BytesMut::new();

        TlvElement::new(tlv::TLV_CONTENT_TYPE, tlv::encode_nn_int(self.content_type.code()))
            .encode(&mut inner);
        TlvElement::new(tlv::TLV_FRESHNESS_PERIOD, tlv::encode_nn_int(self.freshness_ms))
            .encode(&mut inner);
        if let Some(final_block) = &self.final_block_id {
            let mut fb = BytesMut::new();
            final_block.to_tlv().encode(&mut fb);
            TlvElement::new(tlv::TLV_FINAL_BLOCK_ID, fb.freeze()).encode(&mut inner);
        }

        TlvElement::new(tlv::TLV_META_INFO, inner.freeze())
    }

    fn signature_info_tlv(&self) -> TlvElement {
        let mut inner = BytesMut::new();
        TlvElement::new(
            tlv::TLV_SIGNATURE_TYPE,
            tlv::encode_nn_int(SIGNATURE_DIGEST_SHA256),
        )
        .encode(&mut inner);
        TlvElement::new(tlv::TLV_SIGNATURE_INFO, inner.freeze())
    }

    /// The portion of the packet covered by the signature: Name, MetaInfo,
    /// Content and SignatureInfo.
    fn signed_portion(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.name.to_tlv().encode(&mut buf);
        self.meta_info_tlv().encode(&mut buf);
        TlvElement::new(tlv::TLV_CONTENT, self.content.clone()).encode(&mut buf);
        self.signature_info_tlv().encode(&mut buf);
        buf.freeze()
    }

    /// Computes and stores the SHA-256 digest signature.
    pub fn sign_digest(&mut self) {
        let digest = Sha256::digest(self.signed_portion());
        self.signature_value = Bytes::copy_from_slice(&digest);
    }

    /// Verifies the stored SHA-256 digest signature.
    pub fn verify_digest(&self) -> bool {
        let digest = Sha256::digest(self.signed_portion());
        self.signature_value.as_ref() == digest.as_slice()
    }

    /// Encode this Data into `buf` in wire format.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut inner = BytesMut::new();
        inner.extend_from_slice(&self.signed_portion());
        TlvElement::new(tlv::TLV_SIGNATURE_VALUE, self.signature_value.clone())
            .encode(&mut inner);

        TlvElement::new(tlv::TLV_DATA, inner.freeze()).encode(buf);
    }

    /// The encoded wire form of this Data.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a Data from its wire form.
    pub fn from_wire(wire: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(wire);
        let outer = TlvElement::decode_expect(&mut buf, tlv::TLV_DATA)?;

        let mut name = None;
        let mut content_type = ContentType::Blob;
        let mut freshness_ms = 0u64;
        let mut final_block_id = None;
        let mut content = Bytes::new();
        let mut signature_value = Bytes::new();

        let mut inner = outer.value;
        while inner.has_remaining() {
            let element = TlvElement::decode(&mut inner)?;
            match element.tlv_type {
                tlv::TLV_NAME => name = Some(Name::from_tlv(&element)?),
                tlv::TLV_META_INFO => {
                    let mut meta = element.value.clone();
                    while meta.has_remaining() {
                        let m = TlvElement::decode(&mut meta)?;
                        match m.tlv_type {
                            tlv::TLV_CONTENT_TYPE => {
                                content_type = ContentType::from_code(m.as_nn_int()?);
                            }
                            tlv::TLV_FRESHNESS_PERIOD => freshness_ms = m.as_nn_int()?,
                            tlv::TLV_FINAL_BLOCK_ID => {
                                let mut fb = m.value.clone();
                                let comp = TlvElement::decode(&mut fb)?;
                                final_block_id = Some(NameComponent::from_tlv(&comp)?);
                            }
                            _ => {}
                        }
                    }
                }
                tlv::TLV_CONTENT => content = element.value.clone(),
                tlv::TLV_SIGNATURE_INFO => {
                    // Only the digest signature is supported; the type field
                    // is not enforced on receive.
                }
                tlv::TLV_SIGNATURE_VALUE => signature_value = element.value.clone(),
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::Packet("Data without a name".into()))?;

        Ok(Self {
            name,
            content_type,
            freshness_ms,
            final_block_id,
            content,
            signature_value,
        })
    }
}

/* ---------------------------------------------------------------- *
 * Nack
 * ---------------------------------------------------------------- */

/// NDN-LP Nack reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackReason {
    Congestion,
    Duplicate,
    NoRoute,
    Other(u64),
}

impl NackReason {
    pub fn code(&self) -> u64 {
        match self {
            NackReason::Congestion => 50,
            NackReason::Duplicate => 100,
            NackReason::NoRoute => 150,
            NackReason::Other(code) => *code,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            50 => NackReason::Congestion,
            100 => NackReason::Duplicate,
            150 => NackReason::NoRoute,
            other => NackReason::Other(other),
        }
    }
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NackReason::Congestion => write!(f, "congestion"),
            NackReason::Duplicate => write!(f, "duplicate"),
            NackReason::NoRoute => write!(f, "no route"),
            NackReason::Other(code) => write!(f, "reason {}", code),
        }
    }
}

/// A Nack packet: the rejected Interest together with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    pub interest: Interest,
    pub reason: NackReason,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self { interest, reason }
    }
}

/// Peek at the outer TLV type of an encoded packet without consuming it.
pub fn packet_type(wire: &[u8]) -> Option<u32> {
    let mut buf = Bytes::copy_from_slice(wire);
    tlv::decode_var_number(&mut buf).ok().map(|t| t as u32)
}

#[cfg(test)]
mod tests;
