//! RDR file-transfer producer.
//!
//! Serves a local directory under one name prefix. Metadata Interests are
//! answered with a signed RDR record (freshness about one second so
//! consumers re-discover changed files); segment Interests with the file
//! bytes at `segment * segment_size`. Every error path answers with a
//! ContentType Nack Data rather than dropping the Interest, so consumers
//! fail fast instead of timing out.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use log::{debug, trace, warn};

use ndnft_common::lp::PitToken;
use ndnft_common::metrics::Counter;
use ndnft_common::ndn::{ContentType, Data, Interest, Name};
use ndnft_common::rdr::FileMetadata;
use ndnft_face::face::Face;
use ndnft_face::handler::PacketHandler;

use crate::naming::{self, Request};
use crate::ServerOptions;

/// Freshness of metadata replies.
const METADATA_FRESHNESS_MS: u64 = 1000;

/// Counters published by the producer.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub interests: Counter,
    pub metadata_sent: Counter,
    pub segments_sent: Counter,
    pub nacks_sent: Counter,
}

struct FileHandle {
    file: File,
    size: u64,
    mtime_ns: u64,
}

pub struct FileServer {
    options: ServerOptions,
    prefix: Name,
    handles: HashMap<String, FileHandle>,
    stats: ServerStats,
}

impl FileServer {
    pub fn new(options: ServerOptions) -> Self {
        let prefix = Name::from_string(&options.name_prefix);
        Self {
            options,
            prefix,
            handles: HashMap::new(),
            stats: ServerStats::default(),
        }
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Resolve a request path inside the served root, rejecting traversal.
    fn resolve(&self, rel: &str) -> Option<PathBuf> {
        let rel_path = Path::new(rel);
        for component in rel_path.components() {
            match component {
                Component::Normal(_) => {}
                _ => return None,
            }
        }
        Some(self.options.root_dir.join(rel_path))
    }

    /// A ContentType Nack reply; the producer's only user-visible failure.
    fn nack_data(&self, name: Name) -> Data {
        let mut data = Data::new(name, Bytes::new())
            .with_content_type(ContentType::Nack)
            .with_freshness(METADATA_FRESHNESS_MS);
        data.sign_digest();
        data
    }

    fn metadata_reply(&mut self, path: &str, interest_name: &Name) -> Data {
        let full_path = match self.resolve(path) {
            Some(full_path) => full_path,
            None => return self.nack_data(interest_name.clone()),
        };

        let stat = match fs::metadata(&full_path) {
            Ok(stat) => stat,
            Err(e) => {
                debug!("metadata stat {} failed: {}", full_path.display(), e);
                return self.nack_data(interest_name.clone());
            }
        };

        let mtime_ns = mtime_nanos(&stat);
        let versioned = naming::versioned_name(&self.prefix, path, mtime_ns);

        let record = if stat.is_file() {
            FileMetadata::new_file(versioned, stat.len(), self.options.segment_size, mtime_ns)
        } else if stat.is_dir() {
            match list_children(&full_path) {
                Ok(children) => FileMetadata::new_dir(versioned, children, mtime_ns),
                Err(e) => {
                    debug!("listing {} failed: {}", full_path.display(), e);
                    return self.nack_data(interest_name.clone());
                }
            }
        } else {
            return self.nack_data(interest_name.clone());
        };

        // RDR: the reply name is the discovery name plus the version
        let mut reply_name = interest_name.clone();
        reply_name.push(ndnft_common::ndn::NameComponent::version(mtime_ns));

        record.to_data(reply_name, METADATA_FRESHNESS_MS)
    }

    fn segment_reply(&mut self, path: &str, version: u64, segment: u64, name: &Name) -> Data {
        let full_path = match self.resolve(path) {
            Some(full_path) => full_path,
            None => return self.nack_data(name.clone()),
        };

        // Reopen when the cached handle no longer matches the requested
        // version; the file may have been replaced since discovery.
        let needs_open = match self.handles.get(path) {
            Some(handle) => handle.mtime_ns != version,
            None => true,
        };
        if needs_open {
            match open_handle(&full_path) {
                Ok(handle) => {
                    self.handles.insert(path.to_string(), handle);
                }
                Err(e) => {
                    debug!("open {} failed: {}", full_path.display(), e);
                    return self.nack_data(name.clone());
                }
            }
        }

        let handle = match self.handles.get(path) {
            Some(handle) => handle,
            None => return self.nack_data(name.clone()),
        };

        if handle.mtime_ns != version {
            // The file on disk changed; the requested version is gone
            debug!("version mismatch for {}: want {}, have {}", path, version, handle.mtime_ns);
            return self.nack_data(name.clone());
        }

        let segment_size = self.options.segment_size;
        let offset = segment * segment_size;
        if offset >= handle.size && handle.size > 0 {
            return self.nack_data(name.clone());
        }

        let want = segment_size.min(handle.size - offset) as usize;
        let mut payload = vec![0u8; want];
        if let Err(e) = handle.file.read_exact_at(&mut payload, offset) {
            warn!("read {} segment {} failed: {}", path, segment, e);
            return self.nack_data(name.clone());
        }

        let mut data = Data::new(name.clone(), payload)
            .with_content_type(ContentType::Blob)
            .with_freshness(self.options.freshness_ms);
        data.sign_digest();
        data
    }
}

impl PacketHandler for FileServer {
    fn process_interest(&mut self, face: &mut Face, interest: Interest, token: Option<PitToken>) {
        self.stats.interests.increment();
        trace!("request: {}", interest.name);

        let reply = match naming::classify(&self.prefix, &interest.name) {
            Ok(Request::Metadata { path }) => {
                let data = self.metadata_reply(&path, &interest.name);
                if data.content_type == ContentType::Nack {
                    self.stats.nacks_sent.increment();
                } else {
                    self.stats.metadata_sent.increment();
                }
                data
            }
            Ok(Request::Segment {
                path,
                version,
                segment,
            }) => {
                let data = self.segment_reply(&path, version, segment, &interest.name);
                if data.content_type == ContentType::Nack {
                    self.stats.nacks_sent.increment();
                } else {
                    self.stats.segments_sent.increment();
                }
                data
            }
            Err(e) => {
                debug!("unclassifiable Interest {}: {}", interest.name, e);
                self.stats.nacks_sent.increment();
                self.nack_data(interest.name.clone())
            }
        };

        if let Err(e) = face.put_data(&reply, token) {
            warn!("reply for {} not sent: {}", reply.name, e);
        }
    }
}

fn mtime_nanos(stat: &fs::Metadata) -> u64 {
    stat.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn open_handle(path: &Path) -> io::Result<FileHandle> {
    let file = File::open(path)?;
    let stat = file.metadata()?;
    Ok(FileHandle {
        size: stat.len(),
        mtime_ns: mtime_nanos(&stat),
        file,
    })
}

fn list_children(path: &Path) -> io::Result<Vec<String>> {
    let mut children: Vec<String> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    children.sort();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_traversal() {
        let server = FileServer::new(ServerOptions {
            root_dir: PathBuf::from("/srv/files"),
            ..Default::default()
        });

        assert!(server.resolve("a/b.bin").is_some());
        assert!(server.resolve("../etc/passwd").is_none());
        assert!(server.resolve("/abs/path").is_none());
    }

    #[test]
    fn children_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        assert_eq!(
            list_children(dir.path()).unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }
}
