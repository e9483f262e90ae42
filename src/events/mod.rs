//! Events delivered to hotkey listeners
//!
//! Serialized with a `type` tag so the shapes read as
//! `{"type":"keydown","time":12}` and
//! `{"type":"error","code":"tap_disabled","time":40}`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Error code: a listener panicked during dispatch
pub const LISTENER_PANICKED: &str = "listener_panicked";
/// Error code: the OS disabled the event tap; held keys were released
pub const TAP_DISABLED: &str = "tap_disabled";
/// Error code: the raw event queue overflowed and events were lost
pub const EVENTS_DROPPED: &str = "events_dropped";
/// Error code: an input device went away
pub const DEVICE_LOST: &str = "device_lost";

/// Notification delivered to a listener
///
/// `time` is milliseconds since the engine was created (monotonic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotkeyEvent {
    /// The combination became fully pressed
    Keydown { time: u64 },

    /// A member of an active combination was released
    Keyup { time: u64 },

    /// Something went wrong outside the listener's control
    Error { code: String, time: u64 },
}

impl HotkeyEvent {
    pub fn time(&self) -> u64 {
        match self {
            HotkeyEvent::Keydown { time }
            | HotkeyEvent::Keyup { time }
            | HotkeyEvent::Error { time, .. } => *time,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, HotkeyEvent::Error { .. })
    }
}

impl std::fmt::Display for HotkeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotkeyEvent::Keydown { time } => write!(f, "KEYDOWN ({}ms)", time),
            HotkeyEvent::Keyup { time } => write!(f, "KEYUP ({}ms)", time),
            HotkeyEvent::Error { code, time } => write!(f, "ERROR {} ({}ms)", code, time),
        }
    }
}

/// Monotonic clock origin for event timestamps
#[derive(Debug, Clone, Copy)]
pub struct Epoch(Instant);

impl Epoch {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Milliseconds from the epoch to `at`, saturating at zero
    pub fn millis(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.0).as_millis() as u64
    }
}
