//! Name construction and classification for the file-transfer protocol.
//!
//! Consumer names:
//!   `<prefix>/<path...>/32=metadata`            discovery
//!   `<prefix>/<path...>/35=<version>/33=<seg>`  bulk fetch
//!
//! File paths map to consecutive GenericNameComponents under the prefix.

use ndnft_common::ndn::{Name, NameComponent, METADATA_KEYWORD};
use ndnft_common::{Error, Result};

/// The discovery name for `path` under `prefix`.
pub fn metadata_name(prefix: &Name, path: &str) -> Name {
    let mut name = prefix.clone();
    name.push_path(path);
    name.push(NameComponent::keyword(METADATA_KEYWORD));
    name
}

/// The versioned name for `path` under `prefix`.
pub fn versioned_name(prefix: &Name, path: &str, version: u64) -> Name {
    let mut name = prefix.clone();
    name.push_path(path);
    name.push(NameComponent::version(version));
    name
}

/// The Interest name for one segment of a versioned object.
pub fn segment_name(versioned_name: &Name, segment: u64) -> Name {
    let mut name = versioned_name.clone();
    name.push(NameComponent::segment(segment));
    name
}

/// The segment number, if `name` ends in a segment component.
pub fn segment_of(name: &Name) -> Option<u64> {
    name.last()
        .filter(|c| c.is_segment())
        .and_then(|c| c.as_number().ok())
}

/// Recover the relative path from a versioned name under `prefix`.
pub fn relative_path(prefix: &Name, versioned: &Name) -> Option<String> {
    if !prefix.is_prefix_of(versioned) || versioned.len() < prefix.len() + 2 {
        return None;
    }
    if !versioned.last()?.is_version() {
        return None;
    }

    let mut path = String::new();
    for i in prefix.len()..versioned.len() - 1 {
        let component = versioned.get(i)?;
        if !component.is_generic() {
            return None;
        }
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(&String::from_utf8_lossy(component.as_bytes()));
    }
    Some(path)
}

/// A classified incoming Interest on the producer side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `<prefix>/<path>/32=metadata`
    Metadata { path: String },
    /// `<prefix>/<path>/<version>/<segment>`
    Segment {
        path: String,
        version: u64,
        segment: u64,
    },
}

/// Classify an Interest name arriving under `prefix`.
pub fn classify(prefix: &Name, name: &Name) -> Result<Request> {
    if !prefix.is_prefix_of(name) {
        return Err(Error::Packet(format!(
            "name {} outside served prefix {}",
            name, prefix
        )));
    }

    let last = name
        .last()
        .ok_or_else(|| Error::Packet("empty Interest name".into()))?;

    if last.is_metadata_keyword() {
        let path = join_path(name, prefix.len(), name.len() - 1)?;
        return Ok(Request::Metadata { path });
    }

    if last.is_segment() {
        let version_comp = name
            .get(name.len() - 2)
            .filter(|c| c.is_version())
            .ok_or_else(|| Error::Packet(format!("segment name {} without version", name)))?;

        let path = join_path(name, prefix.len(), name.len() - 2)?;
        return Ok(Request::Segment {
            path,
            version: version_comp.as_number()?,
            segment: last.as_number()?,
        });
    }

    Err(Error::Packet(format!("unrecognized request name {}", name)))
}

/// Join the generic components in `[from, to)` back into a relative path.
fn join_path(name: &Name, from: usize, to: usize) -> Result<String> {
    if from >= to {
        return Err(Error::Packet(format!("name {} carries no path", name)));
    }

    let mut path = String::new();
    for i in from..to {
        let component = name.get(i).filter(|c| c.is_generic()).ok_or_else(|| {
            Error::Packet(format!("non-generic path component in {}", name))
        })?;
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(&String::from_utf8_lossy(component.as_bytes()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> Name {
        Name::from_string("/ndnft")
    }

    #[test]
    fn metadata_request_roundtrip() {
        let name = metadata_name(&prefix(), "dir/file.bin");
        assert_eq!(
            classify(&prefix(), &name).unwrap(),
            Request::Metadata {
                path: "dir/file.bin".to_string()
            }
        );
    }

    #[test]
    fn segment_request_roundtrip() {
        let versioned = versioned_name(&prefix(), "file.bin", 42);
        let name = segment_name(&versioned, 7);

        assert_eq!(segment_of(&name), Some(7));
        assert_eq!(
            classify(&prefix(), &name).unwrap(),
            Request::Segment {
                path: "file.bin".to_string(),
                version: 42,
                segment: 7,
            }
        );
    }

    #[test]
    fn relative_path_roundtrip() {
        let versioned = versioned_name(&prefix(), "dir/file.bin", 9);
        assert_eq!(
            relative_path(&prefix(), &versioned),
            Some("dir/file.bin".to_string())
        );
        assert_eq!(relative_path(&Name::from_string("/other"), &versioned), None);
    }

    #[test]
    fn foreign_prefix_rejected() {
        let name = metadata_name(&Name::from_string("/other"), "f");
        assert!(classify(&prefix(), &name).is_err());
    }

    #[test]
    fn segment_without_version_rejected() {
        let mut name = prefix();
        name.push_path("f");
        name.push(ndnft_common::ndn::NameComponent::segment(0));
        assert!(classify(&prefix(), &name).is_err());
    }

    #[test]
    fn bare_prefix_rejected() {
        let mut name = prefix();
        name.push(ndnft_common::ndn::NameComponent::keyword(METADATA_KEYWORD));
        assert!(classify(&prefix(), &name).is_err());
    }
}
