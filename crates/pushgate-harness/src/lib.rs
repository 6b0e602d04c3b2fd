//! Test doubles for the Pushgate core.
//!
//! In-memory implementations of the collaborator traits with switches for
//! injecting failures, so tests can drive the router and the dispatch
//! pipeline through every error path without a network, a cache cluster or
//! a broker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod connection;
pub mod idgen;
pub mod queue;

pub use cache::FlakyCache;
pub use connection::MemoryConnection;
pub use idgen::FailingIdGen;
pub use queue::{FailMode, RecordingQueue};
