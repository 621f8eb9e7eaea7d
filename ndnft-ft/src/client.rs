//! RDR file-transfer client.
//!
//! Discovery and bulk fetch over the Interest pipeline. A transfer runs
//! `streams` worker pairs: the request side stages segment Interests in
//! chunks, the receive side drains that stream's RxQueue, feeds the sink
//! and retries individual timed-out segments once before aborting the
//! file.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use ndnft_common::ndn::{ContentType, Interest, Name};
use ndnft_common::rdr::FileMetadata;
use ndnft_common::ErrorKind;
use ndnft_face::pipeline::{PendingInterestResult, Pipeline, RxQueue};

use crate::naming;
use crate::sink::ContentSink;
use crate::ClientOptions;

/// Segment Interests staged per enqueue call, to amortise PIT churn.
const ENQUEUE_CHUNK: usize = 64;

/// In-flight plus staged Interests a single stream keeps at the pipeline.
const MAX_STREAM_OUTSTANDING: usize = 128;

/// Retransmissions per segment before the file is abandoned.
const SEGMENT_RETRY_LIMIT: usize = 1;

/// How long the receive side waits for one result before re-checking the
/// stop and failure flags.
const RECEIVE_POLL: Duration = Duration::from_millis(100);

/// Lifecycle of one file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unopened,
    /// Metadata Interest in flight.
    Opening,
    /// Metadata known; segments not yet requested.
    Open,
    Fetching,
    Done,
    Aborted(ErrorKind),
}

/// One file (or directory) moving through the transfer lifecycle.
#[derive(Debug)]
pub struct Transfer {
    path: String,
    metadata: Option<FileMetadata>,
    state: FileState,
}

impl Transfer {
    /// A transfer for `path`, before any discovery has happened.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            metadata: None,
            state: FileState::Unopened,
        }
    }

    /// Adopt metadata discovered by an earlier listing pass, skipping a
    /// second discovery round trip.
    pub fn from_metadata(metadata: FileMetadata) -> Self {
        Self {
            path: metadata.versioned_name.to_string(),
            metadata: Some(metadata),
            state: FileState::Open,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The discovered metadata; `None` until the transfer reaches
    /// [`FileState::Open`].
    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_ref()
    }

    pub fn into_metadata(self) -> Option<FileMetadata> {
        self.metadata
    }

    pub fn state(&self) -> FileState {
        self.state
    }
}

pub struct Client {
    options: ClientOptions,
    pipeline: Arc<Pipeline>,
    prefix: Name,
}

impl Client {
    pub fn new(options: ClientOptions, pipeline: Arc<Pipeline>) -> Self {
        let prefix = Name::from_string(&options.name_prefix);
        Self {
            options,
            pipeline,
            prefix,
        }
    }

    /// Discover the metadata for `path`.
    ///
    /// Convenience wrapper: builds a fresh [`Transfer`] and drives it
    /// through [`Client::discover`].
    pub fn open(&self, path: &str) -> Result<Transfer, ErrorKind> {
        let mut transfer = Transfer::new(path);
        self.discover(&mut transfer)?;
        Ok(transfer)
    }

    /// Drive an unopened transfer through metadata discovery.
    ///
    /// Expresses `<prefix>/<path>/32=metadata` with CanBePrefix and
    /// MustBeFresh; the transfer sits in [`FileState::Opening`] while the
    /// reply is in flight. A reply with ContentType Nack or no content
    /// means the path does not exist at the producer; any failure leaves
    /// the transfer in the terminal [`FileState::Aborted`] state.
    pub fn discover(&self, transfer: &mut Transfer) -> Result<(), ErrorKind> {
        if transfer.state != FileState::Unopened {
            return Err(ErrorKind::Protocol);
        }

        let interest = Interest::new(naming::metadata_name(&self.prefix, &transfer.path))
            .with_can_be_prefix(true)
            .with_must_be_fresh(true)
            .with_lifetime(self.options.lifetime_ms);

        let queue = RxQueue::with_capacity(4);
        if !self.pipeline.enqueue_interest(interest, &queue) {
            transfer.state = FileState::Aborted(ErrorKind::Network);
            return Err(ErrorKind::Network);
        }
        transfer.state = FileState::Opening;
        debug!("opening {}", transfer.path);

        let wait = Duration::from_millis(self.options.lifetime_ms) + RECEIVE_POLL * 10;
        let outcome = match queue.wait_dequeue_timed(wait) {
            Some(PendingInterestResult::Data(data)) => {
                if data.content_type == ContentType::Nack || data.content.is_empty() {
                    Err(ErrorKind::NotFound)
                } else {
                    FileMetadata::from_data(&data).map_err(|e| {
                        warn!("bad metadata reply for {}: {}", transfer.path, e);
                        ErrorKind::Protocol
                    })
                }
            }
            Some(PendingInterestResult::Error { kind, .. }) => Err(kind),
            None => Err(ErrorKind::Timeout),
        };

        match outcome {
            Ok(metadata) => {
                transfer.metadata = Some(metadata);
                transfer.state = FileState::Open;
                Ok(())
            }
            Err(kind) => {
                transfer.state = FileState::Aborted(kind);
                Err(kind)
            }
        }
    }

    /// Discover `path` and, for directories, its children. With
    /// `recursive`, child directories are walked as well.
    pub fn list(&self, path: &str, recursive: bool) -> Result<Vec<FileMetadata>, ErrorKind> {
        let metadata = self
            .open(path)?
            .into_metadata()
            .ok_or(ErrorKind::Protocol)?;
        let mut out = vec![metadata.clone()];

        if metadata.is_dir() {
            for child in &metadata.children {
                let child_path = format!("{}/{}", path.trim_end_matches('/'), child);
                if recursive {
                    out.extend(self.list(&child_path, true)?);
                } else {
                    let child_md = self
                        .open(&child_path)?
                        .into_metadata()
                        .ok_or(ErrorKind::Protocol)?;
                    out.push(child_md);
                }
            }
        }

        Ok(out)
    }

    /// Fetch every segment of an open file into `sink`, reporting received
    /// byte counts through `on_progress`. Returns the total payload bytes.
    pub fn fetch(
        &self,
        transfer: &mut Transfer,
        sink: Arc<Mutex<dyn ContentSink>>,
        on_progress: &(dyn Fn(u64) + Sync),
    ) -> Result<u64, ErrorKind> {
        let metadata = match (&transfer.state, &transfer.metadata) {
            (FileState::Open, Some(metadata)) if metadata.is_file() => metadata.clone(),
            _ => return Err(ErrorKind::Protocol),
        };
        transfer.state = FileState::Fetching;

        if metadata.segment_count() == 0 {
            transfer.state = FileState::Done;
            return Ok(0);
        }
        let metadata = &metadata;

        let streams = self.options.streams.max(1) as u64;
        let final_block = metadata.final_block_id();

        let failed = AtomicBool::new(false);
        let failure = Mutex::new(None::<ErrorKind>);
        let total_bytes = AtomicU64::new(0);

        let fail = |kind: ErrorKind| {
            let mut slot = failure.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(kind);
            }
            failed.store(true, Ordering::Release);
        };

        thread::scope(|scope| {
            for stream in 0..streams {
                let queue = RxQueue::with_capacity(2 * MAX_STREAM_OUTSTANDING);
                let outstanding = Arc::new(AtomicUsize::new(0));

                scope.spawn({
                    let queue = queue.clone();
                    let outstanding = Arc::clone(&outstanding);
                    let fail = &fail;
                    let failed = &failed;
                    move || {
                        self.request_worker(
                            metadata,
                            stream,
                            streams,
                            final_block,
                            &queue,
                            &outstanding,
                            failed,
                            fail,
                        )
                    }
                });

                scope.spawn({
                    let fail = &fail;
                    let failed = &failed;
                    let total_bytes = &total_bytes;
                    let sink = Arc::clone(&sink);
                    move || {
                        self.receive_worker(
                            metadata,
                            stream,
                            streams,
                            final_block,
                            queue,
                            outstanding,
                            sink,
                            on_progress,
                            total_bytes,
                            failed,
                            fail,
                        )
                    }
                });
            }
        });

        if failed.load(Ordering::Acquire) {
            let kind = failure
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .unwrap_or(ErrorKind::Network);
            transfer.state = FileState::Aborted(kind);
            Err(kind)
        } else {
            transfer.state = FileState::Done;
            Ok(total_bytes.load(Ordering::Acquire))
        }
    }

    /// Stage this stream's segment Interests in chunks, pausing while the
    /// pipeline has enough of them.
    #[allow(clippy::too_many_arguments)]
    fn request_worker(
        &self,
        metadata: &FileMetadata,
        stream: u64,
        streams: u64,
        final_block: u64,
        queue: &RxQueue,
        outstanding: &AtomicUsize,
        failed: &AtomicBool,
        fail: &dyn Fn(ErrorKind),
    ) {
        let versioned = &metadata.versioned_name;
        let mut segment = stream;

        while segment <= final_block && !failed.load(Ordering::Acquire) {
            while outstanding.load(Ordering::Acquire) >= MAX_STREAM_OUTSTANDING {
                if failed.load(Ordering::Acquire) {
                    return;
                }
                thread::sleep(Duration::from_micros(200));
            }

            let mut chunk = Vec::with_capacity(ENQUEUE_CHUNK);
            while chunk.len() < ENQUEUE_CHUNK && segment <= final_block {
                chunk.push(
                    Interest::new(naming::segment_name(versioned, segment))
                        .with_lifetime(self.options.lifetime_ms),
                );
                segment += streams;
            }

            outstanding.fetch_add(chunk.len(), Ordering::AcqRel);
            if !self.pipeline.enqueue_interests(chunk, queue) {
                warn!("pipeline refused segment batch for {}", versioned);
                fail(ErrorKind::Network);
                return;
            }
        }
    }

    /// Drain this stream's results: write payloads, retry timed-out
    /// segments up to the cap, abort the file on anything else.
    #[allow(clippy::too_many_arguments)]
    fn receive_worker(
        &self,
        metadata: &FileMetadata,
        stream: u64,
        streams: u64,
        final_block: u64,
        queue: RxQueue,
        outstanding: Arc<AtomicUsize>,
        sink: Arc<Mutex<dyn ContentSink>>,
        on_progress: &(dyn Fn(u64) + Sync),
        total_bytes: &AtomicU64,
        failed: &AtomicBool,
        fail: &dyn Fn(ErrorKind),
    ) {
        if stream > final_block {
            return;
        }
        // Segments stream, stream+streams, ... up to and including final_block
        let mut remaining = (final_block - stream) / streams + 1;
        let mut retries: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();

        while remaining > 0 {
            if failed.load(Ordering::Acquire) {
                return;
            }

            let result = match queue.wait_dequeue_timed(RECEIVE_POLL) {
                Some(result) => result,
                None => {
                    if !self.pipeline.is_valid() {
                        fail(ErrorKind::Network);
                        return;
                    }
                    continue;
                }
            };
            outstanding.fetch_sub(1, Ordering::AcqRel);

            match result {
                PendingInterestResult::Data(data) => {
                    if data.content_type == ContentType::Nack {
                        // Version mismatch or read failure at the producer
                        fail(ErrorKind::Protocol);
                        return;
                    }
                    let segment = match naming::segment_of(&data.name) {
                        Some(segment) => segment,
                        None => {
                            fail(ErrorKind::Protocol);
                            return;
                        }
                    };

                    let written = {
                        let mut sink = sink.lock().unwrap_or_else(|e| e.into_inner());
                        sink.write_segment(segment, &data.content)
                    };
                    if let Err(e) = written {
                        warn!("sink write failed for segment {}: {}", segment, e);
                        fail(ErrorKind::Network);
                        return;
                    }

                    total_bytes.fetch_add(data.content.len() as u64, Ordering::AcqRel);
                    on_progress(data.content.len() as u64);
                    remaining -= 1;
                }
                PendingInterestResult::Error {
                    kind: ErrorKind::Timeout,
                    name: Some(name),
                } => {
                    let segment = match naming::segment_of(&name) {
                        Some(segment) => segment,
                        None => {
                            fail(ErrorKind::Timeout);
                            return;
                        }
                    };
                    let attempts = retries.entry(segment).or_insert(0);
                    if *attempts < SEGMENT_RETRY_LIMIT {
                        *attempts += 1;
                        debug!("retrying segment {} of {}", segment, metadata.versioned_name);
                        let retry =
                            Interest::new(name).with_lifetime(self.options.lifetime_ms);
                        outstanding.fetch_add(1, Ordering::AcqRel);
                        if !self.pipeline.enqueue_interest(retry, &queue) {
                            fail(ErrorKind::Network);
                            return;
                        }
                    } else {
                        fail(ErrorKind::Timeout);
                        return;
                    }
                }
                PendingInterestResult::Error { kind, .. } => {
                    fail(kind);
                    return;
                }
            }
        }
    }
}
