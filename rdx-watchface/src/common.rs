//! Contains common, primitive types shared across the controller.
//!
//! This module defines the key types used to identify subscriptions and wake
//! requests, plus the attachment state and the fixed wake cadence.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::time::Duration;

new_key_type! {
    /// Uniquely identifies a repeating wake request held by a `WakeScheduler`.
    ///
    /// The controller keeps the id it was handed at attach time and cancels
    /// exactly that request at detach.
    pub struct WakeRequestId;

    /// Identifies one live stream subscription owned by a controller.
    pub struct SubscriptionId;
}

/// Delay before the first low-power wake-up after attaching.
pub const WAKE_START_OFFSET: Duration = Duration::from_millis(1000);

/// Interval between low-power wake-ups while the host is dimmed.
pub const WAKE_INTERVAL: Duration = Duration::from_millis(1000);

/// Whether a controller is currently bound to its host's window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentState {
    #[default]
    Detached,
    Attached,
}

impl AttachmentState {
    pub fn is_attached(self) -> bool {
        self == AttachmentState::Attached
    }
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentState::Detached => f.write_str("detached"),
            AttachmentState::Attached => f.write_str("attached"),
        }
    }
}
