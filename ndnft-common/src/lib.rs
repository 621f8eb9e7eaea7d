//! Common types and utilities for the ndnft file-transfer stack.
//!
//! This crate provides the packet layer shared by the consumer and producer
//! applications: NDN TLV encoding, Interest/Data/Nack packets, the NDN-LP
//! wrapper carrying the PIT token, the RDR metadata record, and the error
//! and metrics primitives used across the workspace.

pub mod error;
pub mod lp;
pub mod metrics;
pub mod ndn;
pub mod rdr;
pub mod tlv;

/// Reexport of common types
pub use error::{Error, ErrorKind};
pub type Result<T> = std::result::Result<T, Error>;
