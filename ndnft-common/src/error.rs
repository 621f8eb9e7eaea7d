//! Error types for the ndnft stack.

use std::fmt;

use thiserror::Error;

use crate::ndn::NackReason;

/// All possible errors that can occur within the ndnft libraries.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to NDN packet processing.
    #[error("NDN packet error: {0}")]
    Packet(String),

    /// Error related to the data-plane transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Error related to forwarder face management.
    #[error("face management error: {0}")]
    Mgmt(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("other error: {0}")]
    Other(String),
}

/// Per-Interest failure classification surfaced to pipeline consumers.
///
/// The pipeline reports each terminated Interest with exactly one of these;
/// the file-transfer client adds `Protocol` and `NotFound` for replies that
/// arrived but cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transport is unusable: send failed, face closed, or the pipeline
    /// was stopped while the Interest was pending.
    Network,
    /// The Interest lifetime elapsed without a reply.
    Timeout,
    /// The forwarder or producer answered with a Nack.
    Nack(NackReason),
    /// Malformed packet or missing required field.
    Protocol,
    /// The producer indicated the requested object does not exist.
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Nack(reason) => write!(f, "nack ({})", reason),
            ErrorKind::Protocol => write!(f, "protocol error"),
            ErrorKind::NotFound => write!(f, "not found"),
        }
    }
}
