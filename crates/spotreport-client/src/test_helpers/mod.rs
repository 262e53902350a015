//! Test helpers for client unit tests
//!
//! In-memory transports and processing stages with call logs, so the
//! coordinators can be exercised without a server, FFmpeg or a classifier.

pub mod mock_processing;
pub mod mock_transports;

pub use mock_processing::*;
pub use mock_transports::*;
