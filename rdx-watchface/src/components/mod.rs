//! Contains the building blocks a controller is assembled from.
//!
//! This module provides the stream watchers that marshal inbound events onto
//! the host's dispatch queue, and the self-correcting ticker that keeps the
//! display aligned to whole seconds.

pub mod ticker;
pub mod watcher;
