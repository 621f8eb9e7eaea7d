//! Data-plane face and Interest pipeline for the ndnft stack.
//!
//! This crate owns everything between the application workers and the
//! forwarder: the shared-memory ring transport, the LP-framed face, the PIT
//! token generator, the Pending Interest Table with its deadline index, the
//! congestion-control window, and the pipeline worker that ties them
//! together.

pub mod congestion;
pub mod deadline;
pub mod face;
pub mod handler;
pub mod memif;
pub mod mgmt;
pub mod pipeline;
pub mod token;
pub mod transport;

pub use congestion::{Aimd, CongestionControl, FixedWindow};
pub use face::{Face, FaceEvent};
pub use pipeline::{
    Pipeline, PipelineCounters, PipelineType, PendingInterestResult, RxQueue,
};
pub use token::PitTokenGenerator;

/// Smallest accepted dataroom for the data-plane face.
pub const MIN_MTU: usize = 64;

/// Largest accepted dataroom for the data-plane face.
pub const MAX_MTU: usize = 9000;

/// Default dataroom when none is configured.
pub const DEFAULT_MTU: usize = 9000;

/// Interval between expiration scans in the pipeline worker.
pub const TIMEOUT_SCAN_INTERVAL_MS: u64 = 2;
