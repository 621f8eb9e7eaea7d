//! The Interest pipeline: PIT, window enforcement and result routing.
//!
//! One worker thread per pipeline owns the Pending Interest Table, the
//! deadline index and the congestion window. Application workers reach it
//! only through the staging queue ([`Pipeline::enqueue_interest`]) and get
//! results back on their own [`RxQueue`]; the face receive thread posts
//! inbound events on a second queue. All PIT mutation therefore happens on
//! one thread and the hot path takes no locks.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{debug, trace, warn};

use ndnft_common::lp::PitToken;
use ndnft_common::metrics::{Counter, Gauge, Histogram};
use ndnft_common::ndn::{Data, Interest, Name, NackReason};
use ndnft_common::ErrorKind;

use crate::congestion::{Aimd, CongestionControl, FixedWindow};
use crate::deadline::DeadlineIndex;
use crate::face::{Face, FaceEvent};
use crate::token::PitTokenGenerator;
use crate::TIMEOUT_SCAN_INTERVAL_MS;

/// How long the worker parks on the face event queue when idle.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Default capacity of an [`RxQueue`].
const DEFAULT_RX_QUEUE_CAPACITY: usize = 4096;

/* ---------------------------------------------------------------- *
 * Public result types
 * ---------------------------------------------------------------- */

/// The single result every enqueued Interest eventually produces.
#[derive(Debug)]
pub enum PendingInterestResult {
    /// The Interest was satisfied.
    Data(Data),
    /// The Interest failed; `name` identifies it when known, so consumers
    /// can retry the exact segment that timed out.
    Error {
        kind: ErrorKind,
        name: Option<Name>,
    },
}

/// Bounded handoff from the pipeline worker to one application worker.
///
/// Cloning shares the underlying channel, so cooperating workers may share
/// one queue; each result is delivered to exactly one of them.
#[derive(Debug, Clone)]
pub struct RxQueue {
    tx: Sender<PendingInterestResult>,
    rx: Receiver<PendingInterestResult>,
}

impl RxQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RX_QUEUE_CAPACITY)
    }

    /// A queue able to hold `capacity` undelivered results. Size it above
    /// the number of Interests the owner keeps outstanding, so the pipeline
    /// worker never has to wait on it.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Dequeue the next result, waiting up to `timeout`.
    pub fn wait_dequeue_timed(&self, timeout: Duration) -> Option<PendingInterestResult> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Dequeue the next result without blocking.
    pub fn try_dequeue(&self) -> Option<PendingInterestResult> {
        self.rx.try_recv().ok()
    }

    fn sender(&self) -> Sender<PendingInterestResult> {
        self.tx.clone()
    }
}

impl Default for RxQueue {
    fn default() -> Self {
        Self::new()
    }
}

/* ---------------------------------------------------------------- *
 * Pipeline configuration
 * ---------------------------------------------------------------- */

/// Which congestion-control policy drives the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineType {
    Fixed,
    Aimd,
}

impl PipelineType {
    /// Build the controller for this policy; `size` is the fixed window or
    /// the initial ssthresh.
    pub fn controller(&self, size: usize) -> Box<dyn CongestionControl> {
        match self {
            PipelineType::Fixed => Box::new(FixedWindow::new(size)),
            PipelineType::Aimd => Box::new(Aimd::new(size)),
        }
    }
}

impl FromStr for PipelineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(PipelineType::Fixed),
            "aimd" => Ok(PipelineType::Aimd),
            other => Err(format!("invalid pipeline type `{}`", other)),
        }
    }
}

/* ---------------------------------------------------------------- *
 * Counters
 * ---------------------------------------------------------------- */

/// Aggregate pipeline counters, readable from any thread.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Interests handed to the face.
    pub tx: Counter,
    /// Data packets matched to a PIT entry.
    pub rx: Counter,
    /// Nacks matched to a PIT entry.
    pub nack: Counter,
    /// Expired PIT entries.
    pub timeout: Counter,
    /// Current PIT occupancy.
    pub pit_size: Gauge,
    /// Express-to-Data delay in microseconds.
    pub rtt_usec: Histogram,
}

impl PipelineCounters {
    /// Average express-to-Data delay in microseconds.
    pub fn average_delay_usec(&self) -> f64 {
        self.rtt_usec.average()
    }
}

/* ---------------------------------------------------------------- *
 * Pipeline handle
 * ---------------------------------------------------------------- */

struct StagedInterest {
    interest: Interest,
    rx: Sender<PendingInterestResult>,
}

/// Handle to a running Interest pipeline. Cheap to share behind an `Arc`.
pub struct Pipeline {
    staging: Sender<StagedInterest>,
    stopping: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
    counters: Arc<PipelineCounters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    /// Start a pipeline over `face` with the given window policy.
    pub fn new(face: Face, control: Box<dyn CongestionControl>) -> ndnft_common::Result<Self> {
        let (staging_tx, staging_rx) = unbounded();
        let stopping = Arc::new(AtomicBool::new(false));
        let broken = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(PipelineCounters::default());

        let worker = {
            let stopping = Arc::clone(&stopping);
            let broken = Arc::clone(&broken);
            let counters = Arc::clone(&counters);
            thread::Builder::new().name("ndnft-pipeline".into()).spawn(move || {
                Worker {
                    face,
                    control,
                    staging: staging_rx,
                    pit: HashMap::new(),
                    deadlines: DeadlineIndex::new(),
                    tokens: PitTokenGenerator::new(),
                    stopping,
                    broken,
                    counters,
                }
                .run()
            })?
        };

        Ok(Self {
            staging: staging_tx,
            stopping,
            broken,
            counters,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stage one Interest for transmission, routing its result to `rx`.
    ///
    /// Non-blocking. Returns false only if the pipeline is stopped or the
    /// transport is broken; otherwise the Interest is guaranteed to produce
    /// exactly one result on `rx`.
    pub fn enqueue_interest(&self, interest: Interest, rx: &RxQueue) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.staging
            .send(StagedInterest {
                interest,
                rx: rx.sender(),
            })
            .is_ok()
    }

    /// Bulk variant of [`Pipeline::enqueue_interest`] with the same
    /// semantics; the batch is staged in order.
    pub fn enqueue_interests(&self, interests: Vec<Interest>, rx: &RxQueue) -> bool {
        if !self.is_valid() {
            return false;
        }
        for interest in interests {
            let staged = StagedInterest {
                interest,
                rx: rx.sender(),
            };
            if self.staging.send(staged).is_err() {
                return false;
            }
        }
        true
    }

    /// True until [`Pipeline::stop`] is called or the face reports a fatal
    /// transport error.
    pub fn is_valid(&self) -> bool {
        !self.stopping.load(Ordering::Acquire) && !self.broken.load(Ordering::Acquire)
    }

    /// Stop the pipeline and join the worker. Idempotent; every pending
    /// Interest is answered with a network error before the worker exits.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/* ---------------------------------------------------------------- *
 * Worker
 * ---------------------------------------------------------------- */

struct PendingEntry {
    interest: Interest,
    rx: Sender<PendingInterestResult>,
    expressed_at: Instant,
}

struct Worker {
    face: Face,
    control: Box<dyn CongestionControl>,
    staging: Receiver<StagedInterest>,
    pit: HashMap<u64, PendingEntry>,
    deadlines: DeadlineIndex,
    tokens: PitTokenGenerator,
    stopping: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
    counters: Arc<PipelineCounters>,
}

impl Worker {
    fn run(mut self) {
        let scan_interval = Duration::from_millis(TIMEOUT_SCAN_INTERVAL_MS);
        let mut next_scan = Instant::now() + scan_interval;

        while !self.stopping.load(Ordering::Acquire) && !self.broken.load(Ordering::Acquire) {
            // Inbound events first: acks open the window for this tick
            while let Some(event) = self.face.try_next_event() {
                self.handle_event(event);
            }

            self.admit_staged();

            let now = Instant::now();
            if now >= next_scan {
                self.scan_expired(now);
                next_scan = now + scan_interval;
            }

            // Park on the face event queue; staged Interests wait at most
            // one IDLE_WAIT before the next admission pass
            if let Some(event) = self.face.next_event_timeout(IDLE_WAIT) {
                self.handle_event(event);
            }
        }

        self.drain_pending();
        self.face.close();
        debug!("pipeline worker exiting");
    }

    /// Move staged Interests into the PIT, up to the window.
    fn admit_staged(&mut self) {
        let window = self.control.window();
        while self.pit.len() < window {
            match self.staging.try_recv() {
                Ok(staged) => self.express(staged),
                Err(_) => break,
            }
            if self.broken.load(Ordering::Acquire) {
                break;
            }
        }
    }

    fn express(&mut self, staged: StagedInterest) {
        let token = self.tokens.next();

        if let Err(e) = self.face.express(&staged.interest, token) {
            warn!("express failed for {}: {}", staged.interest.name, e);
            self.broken.store(true, Ordering::Release);
            deliver(
                &staged.rx,
                PendingInterestResult::Error {
                    kind: ErrorKind::Network,
                    name: Some(staged.interest.name),
                },
            );
            return;
        }

        let now = Instant::now();
        self.deadlines
            .insert(token.value(), now + staged.interest.lifetime());
        self.pit.insert(
            token.value(),
            PendingEntry {
                interest: staged.interest,
                rx: staged.rx,
                expressed_at: now,
            },
        );
        self.counters.tx.increment();
        self.counters.pit_size.set(self.pit.len() as u64);
    }

    fn handle_event(&mut self, event: FaceEvent) {
        match event {
            FaceEvent::Data {
                data,
                token: Some(token),
            } => self.on_data(token, data),
            FaceEvent::Data { data, token: None } => {
                trace!("dropping Data without PIT token: {}", data.name);
            }
            FaceEvent::Nack {
                nack,
                token: Some(token),
            } => self.on_nack(token, nack.reason),
            FaceEvent::Nack { nack, token: None } => {
                trace!("dropping Nack without PIT token: {}", nack.interest.name);
            }
            FaceEvent::Interest { interest, .. } => {
                trace!("consumer face ignoring Interest {}", interest.name);
            }
            FaceEvent::Down => {
                debug!("face reported down");
                self.broken.store(true, Ordering::Release);
            }
        }
    }

    fn on_data(&mut self, token: PitToken, data: Data) {
        let entry = match self.pit.remove(&token.value()) {
            Some(entry) => entry,
            None => {
                // Late arrival after the entry expired
                trace!("Data with unknown PIT token {}", token);
                return;
            }
        };
        self.deadlines.remove(token.value());
        self.counters.rx.increment();
        self.counters.pit_size.set(self.pit.len() as u64);

        let rtt = entry.expressed_at.elapsed();
        self.counters.rtt_usec.observe(rtt.as_micros() as u64);
        self.control.on_ack();
        self.control.on_rtt(rtt);

        deliver(&entry.rx, PendingInterestResult::Data(data));
    }

    fn on_nack(&mut self, token: PitToken, reason: NackReason) {
        let entry = match self.pit.remove(&token.value()) {
            Some(entry) => entry,
            None => {
                trace!("Nack with unknown PIT token {}", token);
                return;
            }
        };
        self.deadlines.remove(token.value());
        self.counters.nack.increment();
        self.counters.pit_size.set(self.pit.len() as u64);

        if reason == NackReason::Congestion {
            self.control.on_loss();
        }

        deliver(
            &entry.rx,
            PendingInterestResult::Error {
                kind: ErrorKind::Nack(reason),
                name: Some(entry.interest.name),
            },
        );
    }

    fn scan_expired(&mut self, now: Instant) {
        for token in self.deadlines.pop_expired(now) {
            let entry = match self.pit.remove(&token) {
                Some(entry) => entry,
                None => continue,
            };
            self.counters.timeout.increment();
            self.counters.pit_size.set(self.pit.len() as u64);
            self.control.on_loss();

            deliver(
                &entry.rx,
                PendingInterestResult::Error {
                    kind: ErrorKind::Timeout,
                    name: Some(entry.interest.name),
                },
            );
        }
    }

    /// Answer everything still queued or pending so no worker blocks
    /// forever after a stop or a transport failure.
    fn drain_pending(&mut self) {
        // Short grace period: an enqueue that passed the validity check
        // right before the stop flag landed may still be in flight
        while let Ok(staged) = self.staging.recv_timeout(Duration::from_millis(5)) {
            deliver(
                &staged.rx,
                PendingInterestResult::Error {
                    kind: ErrorKind::Network,
                    name: Some(staged.interest.name),
                },
            );
        }

        for (_, entry) in self.pit.drain() {
            deliver(
                &entry.rx,
                PendingInterestResult::Error {
                    kind: ErrorKind::Network,
                    name: Some(entry.interest.name),
                },
            );
        }
        self.counters.pit_size.set(0);
    }
}

/// Push a result to a worker's queue. The worker may have sized its queue
/// too small or already gone away; neither may wedge the pipeline thread.
fn deliver(rx: &Sender<PendingInterestResult>, result: PendingInterestResult) {
    match rx.try_send(result) {
        Ok(()) => {}
        Err(TrySendError::Full(result)) => {
            warn!("rx queue full, pipeline worker waiting on consumer");
            let _ = rx.send(result);
        }
        Err(TrySendError::Disconnected(_)) => {
            trace!("rx queue receiver dropped, discarding result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_type_parses() {
        assert_eq!("fixed".parse::<PipelineType>().unwrap(), PipelineType::Fixed);
        assert_eq!("AIMD".parse::<PipelineType>().unwrap(), PipelineType::Aimd);
        assert!("cubic".parse::<PipelineType>().is_err());
    }

    #[test]
    fn controllers_match_type() {
        assert_eq!(PipelineType::Fixed.controller(8).window(), 8);
        assert_eq!(PipelineType::Aimd.controller(64).window(), 2);
    }
}
