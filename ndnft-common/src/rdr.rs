//! RDR metadata records for file-transfer discovery.
//!
//! A consumer discovers a file by expressing `<prefix>/<path>/32=metadata`
//! with CanBePrefix and MustBeFresh. The producer replies with a Data packet
//! whose content is the record encoded here: the versioned name, file size,
//! segment size, mode bits and modification time. The final segment index
//! travels as FinalBlockId in the Data MetaInfo, following the RDR
//! convention. A directory record additionally enumerates child names.

use crate::error::Error;
use crate::ndn::{ContentType, Data, Name, NameComponent};
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};

/* ---------------------------------------------------------------- *
 * Record TLV types (application range)
 * ---------------------------------------------------------------- */

pub const TLV_RDR_SEGMENT_SIZE: u32 = 0xF500;
pub const TLV_RDR_SIZE: u32 = 0xF502;
pub const TLV_RDR_MODE: u32 = 0xF504;
pub const TLV_RDR_MTIME: u32 = 0xF506;
pub const TLV_RDR_CHILD: u32 = 0xF508;

/// Mode bit marking a regular file.
pub const MODE_FILE: u64 = 0x1;
/// Mode bit marking a directory.
pub const MODE_DIR: u64 = 0x2;

/// The RDR metadata record describing one file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Name prefix including the discovered version component.
    pub versioned_name: Name,
    /// File size in bytes; zero for directories.
    pub size: u64,
    /// Segment payload size in bytes.
    pub segment_size: u64,
    /// Mode bits, MODE_FILE or MODE_DIR.
    pub mode: u64,
    /// Modification time, nanoseconds since the Unix epoch.
    pub mtime_ns: u64,
    /// Child names; only populated for directories.
    pub children: Vec<String>,
}

impl FileMetadata {
    /// Record for a regular file.
    pub fn new_file(versioned_name: Name, size: u64, segment_size: u64, mtime_ns: u64) -> Self {
        Self {
            versioned_name,
            size,
            segment_size,
            mode: MODE_FILE,
            mtime_ns,
            children: Vec::new(),
        }
    }

    /// Record for a directory listing.
    pub fn new_dir(versioned_name: Name, children: Vec<String>, mtime_ns: u64) -> Self {
        Self {
            versioned_name,
            size: 0,
            segment_size: 0,
            mode: MODE_DIR,
            mtime_ns,
            children,
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode & MODE_FILE != 0
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIR != 0
    }

    /// The discovered version, taken from the versioned name.
    pub fn version(&self) -> Option<u64> {
        self.versioned_name
            .last()
            .filter(|c| c.is_version())
            .and_then(|c| c.as_number().ok())
    }

    /// Index of the last segment. A zero-byte file still occupies one
    /// (empty) segment so the index is well defined.
    pub fn final_block_id(&self) -> u64 {
        if self.size == 0 || self.segment_size == 0 {
            return 0;
        }
        (self.size + self.segment_size - 1) / self.segment_size - 1
    }

    /// Number of segments making up the file.
    pub fn segment_count(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.final_block_id() + 1
        }
    }

    /// Encode the record as Data content.
    pub fn encode_content(&self) -> Bytes {
        let mut buf = BytesMut::new();

        self.versioned_name.to_tlv().encode(&mut buf);
        TlvElement::new(TLV_RDR_SIZE, tlv::encode_nn_int(self.size)).encode(&mut buf);
        TlvElement::new(TLV_RDR_SEGMENT_SIZE, tlv::encode_nn_int(self.segment_size))
            .encode(&mut buf);
        TlvElement::new(TLV_RDR_MODE, tlv::encode_nn_int(self.mode)).encode(&mut buf);
        TlvElement::new(TLV_RDR_MTIME, tlv::encode_nn_int(self.mtime_ns)).encode(&mut buf);
        for child in &self.children {
            TlvElement::new(TLV_RDR_CHILD, Bytes::copy_from_slice(child.as_bytes()))
                .encode(&mut buf);
        }

        buf.freeze()
    }

    /// Decode a record from Data content.
    pub fn decode_content(content: &[u8]) -> Result<Self, Error> {
        let mut versioned_name = None;
        let mut size = 0u64;
        let mut segment_size = 0u64;
        let mut mode = 0u64;
        let mut mtime_ns = 0u64;
        let mut children = Vec::new();

        let mut buf = Bytes::copy_from_slice(content);
        while buf.has_remaining() {
            let element = TlvElement::decode(&mut buf)?;
            match element.tlv_type {
                tlv::TLV_NAME => versioned_name = Some(Name::from_tlv(&element)?),
                TLV_RDR_SIZE => size = element.as_nn_int()?,
                TLV_RDR_SEGMENT_SIZE => segment_size = element.as_nn_int()?,
                TLV_RDR_MODE => mode = element.as_nn_int()?,
                TLV_RDR_MTIME => mtime_ns = element.as_nn_int()?,
                TLV_RDR_CHILD => {
                    children.push(String::from_utf8_lossy(&element.value).into_owned());
                }
                _ => {}
            }
        }

        let versioned_name = versioned_name
            .ok_or_else(|| Error::Packet("metadata record without a versioned name".into()))?;

        Ok(Self {
            versioned_name,
            size,
            segment_size,
            mode,
            mtime_ns,
            children,
        })
    }

    /// Build the signed metadata reply for this record.
    ///
    /// `reply_name` is the name of the Interest being satisfied (with the
    /// discovered version appended per RDR); `freshness_ms` is typically
    /// around one second so consumers re-discover changed files quickly.
    pub fn to_data(&self, reply_name: Name, freshness_ms: u64) -> Data {
        let mut data = Data::new(reply_name, self.encode_content())
            .with_content_type(ContentType::Blob)
            .with_freshness(freshness_ms);
        if self.is_file() {
            data = data.with_final_block_id(NameComponent::segment(self.final_block_id()));
        }
        data.sign_digest();
        data
    }

    /// Parse a metadata reply. Fails with a packet error if the reply is a
    /// file record without FinalBlockId, since the consumer cannot schedule
    /// segments without it.
    pub fn from_data(data: &Data) -> Result<Self, Error> {
        if data.content_type == ContentType::Nack {
            return Err(Error::Packet("metadata reply is a content Nack".into()));
        }

        let record = Self::decode_content(&data.content)?;
        if record.is_file() && data.final_block_id.is_none() {
            return Err(Error::Packet("metadata reply without FinalBlockId".into()));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versioned(path: &str, version: u64) -> Name {
        let mut name = Name::from_string(path);
        name.push(NameComponent::version(version));
        name
    }

    #[test]
    fn file_record_roundtrip() {
        let record = FileMetadata::new_file(versioned("/files/a.bin", 17), 4096, 1024, 1_000_000);
        let data = record.to_data(record.versioned_name.clone(), 1000);

        assert!(data.verify_digest());
        assert_eq!(data.final_block_id_segment(), Some(3));

        let decoded = FileMetadata::from_data(&data).unwrap();
        assert_eq!(decoded.versioned_name, record.versioned_name);
        assert_eq!(decoded.size, 4096);
        assert_eq!(decoded.segment_size, 1024);
        assert_eq!(decoded.final_block_id(), 3);
        assert_eq!(decoded.version(), Some(17));
        assert!(decoded.is_file());
        assert!(!decoded.is_dir());
    }

    #[test]
    fn final_block_id_boundaries() {
        let md = |size| FileMetadata::new_file(versioned("/f", 1), size, 1024, 0);
        assert_eq!(md(1).final_block_id(), 0);
        assert_eq!(md(1024).final_block_id(), 0);
        assert_eq!(md(1025).final_block_id(), 1);
        assert_eq!(md(4096).final_block_id(), 3);
        assert_eq!(md(0).segment_count(), 0);
    }

    #[test]
    fn dir_record_roundtrip() {
        let record = FileMetadata::new_dir(
            versioned("/files", 3),
            vec!["a.bin".into(), "sub".into()],
            7,
        );
        let data = record.to_data(record.versioned_name.clone(), 1000);

        // Directories carry no FinalBlockId
        assert!(data.final_block_id.is_none());

        let decoded = FileMetadata::from_data(&data).unwrap();
        assert!(decoded.is_dir());
        assert_eq!(decoded.children, vec!["a.bin".to_string(), "sub".to_string()]);
    }

    #[test]
    fn file_reply_without_final_block_rejected() {
        let record = FileMetadata::new_file(versioned("/f", 1), 100, 10, 0);
        let mut data = Data::new(record.versioned_name.clone(), record.encode_content());
        data.sign_digest();

        assert!(FileMetadata::from_data(&data).is_err());
    }

    #[test]
    fn content_nack_rejected() {
        let mut data = Data::new(Name::from_string("/missing"), Bytes::new())
            .with_content_type(ContentType::Nack);
        data.sign_digest();

        assert!(FileMetadata::from_data(&data).is_err());
    }
}
