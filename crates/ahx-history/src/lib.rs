//! Revision history resolution.
//!
//! Fetches an object's linear revision history through an injected
//! [`SourceControl`] provider and derives the (previous, candidate) pairs a
//! user can compare.
//!
//! # Key Types
//!
//! - [`SourceControl`] -- Provider contract: fetch history, load snapshots
//! - [`RevisionHistory`] -- Newest-first revisions and their derived pairs
//! - [`RevisionHistoryResolver`] -- Async query state machine with cancellation
//! - [`InMemorySourceControl`] / [`DirectorySourceControl`] -- Providers

pub mod error;
pub mod fs;
pub mod history;
pub mod memory;
pub mod provider;
pub mod resolver;

pub use error::{HistoryError, HistoryResult};
pub use fs::{ContentDigest, DirectorySourceControl};
pub use history::RevisionHistory;
pub use memory::{FetchCall, InMemorySourceControl};
pub use provider::{OperationId, SourceControl};
pub use resolver::{HistoryConfig, HistoryObserver, QueryState, RevisionHistoryResolver};
