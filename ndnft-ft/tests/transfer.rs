//! End-to-end file-transfer scenarios: in-process producer and consumer
//! connected over a memif pair.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ndnft_common::lp::{self, LpPayload};
use ndnft_common::ErrorKind;
use ndnft_face::face::Face;
use ndnft_face::handler::Driver;
use ndnft_face::memif::{memif_pair, MemifTx};
use ndnft_face::pipeline::{Pipeline, PipelineType};
use ndnft_face::transport::TransportTx;
use ndnft_ft::client::{Client, FileState, Transfer};
use ndnft_ft::naming;
use ndnft_ft::server::FileServer;
use ndnft_ft::sink::MemorySink;
use ndnft_ft::{ClientOptions, ServerOptions};

/// Drops the producer's first Data reply for one segment, then passes
/// everything through.
struct DropSegmentOnce {
    inner: MemifTx,
    segment: u64,
    dropped: bool,
}

impl TransportTx for DropSegmentOnce {
    fn send(&mut self, frame: &[u8]) -> ndnft_common::Result<()> {
        if !self.dropped {
            if let Ok(decoded) = lp::decode_frame(frame) {
                if let LpPayload::Data(data) = decoded.payload {
                    if naming::segment_of(&data.name) == Some(self.segment) {
                        self.dropped = true;
                        return Ok(());
                    }
                }
            }
        }
        self.inner.send(frame)
    }
}

struct Rig {
    pipeline: Arc<Pipeline>,
    server: JoinHandle<FileServer>,
}

impl Rig {
    /// Stop the consumer side and collect the producer's final state.
    fn shutdown(self) -> FileServer {
        self.pipeline.stop();
        self.server.join().unwrap()
    }
}

fn client_options(streams: usize, lifetime_ms: u64) -> ClientOptions {
    ClientOptions {
        name_prefix: "/ndnft".to_string(),
        lifetime_ms,
        pipeline_type: PipelineType::Fixed,
        pipeline_size: 8,
        streams,
        ..Default::default()
    }
}

/// Wire a consumer pipeline to a producer driver over a memif pair.
/// `drop_segment` makes the producer transport drop that segment's first
/// Data reply.
fn rig(root: &Path, segment_size: u64, drop_segment: Option<u64>) -> Rig {
    let ((client_tx, client_rx), (server_tx, server_rx)) = memif_pair(8800);

    let client_face = Face::new(1, Box::new(client_tx), Box::new(client_rx)).unwrap();

    let server_tx: Box<dyn TransportTx> = match drop_segment {
        Some(segment) => Box::new(DropSegmentOnce {
            inner: server_tx,
            segment,
            dropped: false,
        }),
        None => Box::new(server_tx),
    };
    let server_face = Face::new(2, server_tx, Box::new(server_rx)).unwrap();

    let server = FileServer::new(ServerOptions {
        name_prefix: "/ndnft".to_string(),
        root_dir: root.to_path_buf(),
        segment_size,
        freshness_ms: 0,
        ..Default::default()
    });
    let driver = Driver::new(server_face, server);
    let server = thread::spawn(move || driver.run());

    let pipeline = Arc::new(
        Pipeline::new(client_face, PipelineType::Fixed.controller(8)).unwrap(),
    );

    Rig { pipeline, server }
}

fn fetch_all(
    client: &Client,
    path: &str,
    segment_size: u64,
) -> Result<(Vec<u8>, u64, u64), ErrorKind> {
    let mut transfer = client.open(path)?;
    let sink = Arc::new(Mutex::new(MemorySink::new(segment_size)));
    let progress = AtomicU64::new(0);

    let dyn_sink: Arc<Mutex<dyn ndnft_ft::sink::ContentSink>> = sink.clone();
    let bytes = client.fetch(&mut transfer, dyn_sink, &|b| {
        progress.fetch_add(b, Ordering::SeqCst);
    })?;
    assert_eq!(transfer.state(), FileState::Done);

    let sink = Arc::try_unwrap(sink).ok().unwrap().into_inner().unwrap();
    Ok((sink.into_bytes(), bytes, progress.load(Ordering::SeqCst)))
}

#[test]
fn small_file_transfers_with_exact_packet_counts() {
    let root = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    fs::write(root.path().join("hello"), &content).unwrap();

    let rig = rig(root.path(), 1024, None);
    let client = Client::new(client_options(2, 2000), Arc::clone(&rig.pipeline));

    let (received, bytes, progress) = fetch_all(&client, "hello", 1024).unwrap();
    assert_eq!(bytes, 4096);
    assert_eq!(progress, 4096);
    assert_eq!(received, content);

    let counters = rig.pipeline.counters();
    assert_eq!(counters.tx.value(), 5, "1 metadata + 4 segment Interests");
    assert_eq!(counters.rx.value(), 5);
    assert_eq!(counters.timeout.value(), 0);

    let server = rig.shutdown();
    assert_eq!(server.stats().interests.value(), 5);
    assert_eq!(server.stats().metadata_sent.value(), 1);
    assert_eq!(server.stats().segments_sent.value(), 4);
    assert_eq!(server.stats().nacks_sent.value(), 0);
}

#[test]
fn dropped_segment_is_retried_once_and_recovered() {
    let root = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..4096u32).map(|i| (i / 7) as u8).collect();
    fs::write(root.path().join("lossy"), &content).unwrap();

    let rig = rig(root.path(), 1024, Some(2));
    let client = Client::new(client_options(2, 200), Arc::clone(&rig.pipeline));

    let (received, bytes, _) = fetch_all(&client, "lossy", 1024).unwrap();
    assert_eq!(bytes, 4096);
    assert_eq!(received, content);

    let counters = rig.pipeline.counters();
    assert!(counters.tx.value() >= 6, "retransmission adds an Interest");
    assert_eq!(counters.rx.value(), 5);
    assert!(counters.timeout.value() >= 1);

    let server = rig.shutdown();
    assert_eq!(server.stats().segments_sent.value(), 5);
}

#[test]
fn missing_path_reports_not_found_without_segment_interests() {
    let root = tempfile::tempdir().unwrap();

    let rig = rig(root.path(), 1024, None);
    let client = Client::new(client_options(2, 500), Arc::clone(&rig.pipeline));

    assert_eq!(client.open("missing").unwrap_err(), ErrorKind::NotFound);

    let counters = rig.pipeline.counters();
    assert_eq!(counters.tx.value(), 1, "only the metadata Interest");

    let server = rig.shutdown();
    assert_eq!(server.stats().segments_sent.value(), 0);
    assert_eq!(server.stats().nacks_sent.value(), 1);
}

#[test]
fn two_concurrent_clients_receive_identical_bytes() {
    let root = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
    fs::write(root.path().join("shared"), &content).unwrap();

    let rig = rig(root.path(), 1024, None);
    let segments = (content.len() as u64 + 1023) / 1024;

    let results: Vec<Vec<u8>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = Arc::clone(&rig.pipeline);
                scope.spawn(move || {
                    let client = Client::new(client_options(2, 2000), pipeline);
                    let (received, _, _) = fetch_all(&client, "shared", 1024).unwrap();
                    received
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0], content);
    assert_eq!(results[1], content);

    let server = rig.shutdown();
    // No content store in between: each client's requests reach the handler
    assert_eq!(server.stats().segments_sent.value(), 2 * segments);
    assert_eq!(server.stats().metadata_sent.value(), 2);
}

#[test]
fn transfer_walks_the_discovery_state_machine() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("staged"), vec![7u8; 2048]).unwrap();

    let rig = rig(root.path(), 1024, None);
    let client = Client::new(client_options(1, 2000), Arc::clone(&rig.pipeline));

    let mut transfer = Transfer::new("staged");
    assert_eq!(transfer.state(), FileState::Unopened);
    assert_eq!(transfer.path(), "staged");
    assert!(transfer.metadata().is_none());

    client.discover(&mut transfer).unwrap();
    assert_eq!(transfer.state(), FileState::Open);
    assert_eq!(transfer.metadata().unwrap().size, 2048);

    // Discovery is one-shot; a second pass is a caller error
    assert_eq!(
        client.discover(&mut transfer).unwrap_err(),
        ErrorKind::Protocol
    );
    assert_eq!(transfer.state(), FileState::Open);

    // A failed discovery parks the transfer in the terminal state
    let mut missing = Transfer::new("nope");
    assert_eq!(
        client.discover(&mut missing).unwrap_err(),
        ErrorKind::NotFound
    );
    assert_eq!(missing.state(), FileState::Aborted(ErrorKind::NotFound));

    rig.shutdown();
}

#[test]
fn directory_listing_recurses() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("docs")).unwrap();
    fs::create_dir(root.path().join("docs/sub")).unwrap();
    fs::write(root.path().join("docs/a.txt"), b"aaaa").unwrap();
    fs::write(root.path().join("docs/sub/b.txt"), b"bb").unwrap();

    let rig = rig(root.path(), 1024, None);
    let client = Client::new(client_options(1, 2000), Arc::clone(&rig.pipeline));

    let flat = client.list("docs", false).unwrap();
    assert_eq!(flat.len(), 3, "dir itself plus two children");
    assert!(flat[0].is_dir());
    assert_eq!(flat[0].children, vec!["a.txt".to_string(), "sub".to_string()]);

    let deep = client.list("docs", true).unwrap();
    let files: Vec<u64> = deep.iter().filter(|m| m.is_file()).map(|m| m.size).collect();
    assert_eq!(deep.len(), 4, "docs, a.txt, sub, b.txt");
    assert_eq!(files, vec![4, 2]);

    rig.shutdown();
}

#[test]
fn file_replaced_after_discovery_is_nacked() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("volatile");
    fs::write(&path, vec![1u8; 4096]).unwrap();

    let rig = rig(root.path(), 1024, None);
    let client = Client::new(client_options(1, 500), Arc::clone(&rig.pipeline));

    let mut transfer = client.open("volatile").unwrap();

    // Replace the file; its mtime (and so its version) moves on
    thread::sleep(Duration::from_millis(20));
    fs::write(&path, vec![2u8; 4096]).unwrap();

    let sink: Arc<Mutex<dyn ndnft_ft::sink::ContentSink>> =
        Arc::new(Mutex::new(MemorySink::new(1024)));
    let result = client.fetch(&mut transfer, sink, &|_| {});
    assert_eq!(result.unwrap_err(), ErrorKind::Protocol);
    assert!(matches!(transfer.state(), FileState::Aborted(_)));

    rig.shutdown();
}
