//! Diff sessions over an object's revision history.
//!
//! A [`DiffSessionController`] ties the history resolver, the comparator,
//! the difference tree and its navigator together for one object. Hosts
//! listen through a [`SessionObserver`].

pub mod config;
pub mod controller;
pub mod error;
pub mod observer;

pub use config::{DiffConfig, SessionConfig};
pub use controller::{DiffSessionController, SessionStatus};
pub use error::{SessionError, SessionResult};
pub use observer::SessionObserver;
