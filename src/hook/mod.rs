//! OS keyboard hook adapters
//!
//! Each adapter installs a system-wide interception mechanism on a
//! dedicated thread. The OS callback only translates the native event
//! into a [`RawKeyEvent`] and does a non-blocking `try_send`; matching
//! and listener dispatch happen elsewhere so the callback stays within
//! the OS latency budget.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
mod virtual_hook;
#[cfg(target_os = "windows")]
mod windows;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::PlatformError;
use crate::keys::Keymap;

pub use virtual_hook::{VirtualHook, VirtualKeyboard};

/// Direction of a physical key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// One physical key transition as reported by the OS
#[derive(Debug, Clone, Copy)]
pub struct RawKeyEvent {
    /// Native code in the hook's [`Keymap`]
    pub code: u32,
    pub action: KeyAction,
    pub timestamp: Instant,
}

/// Messages from a hook to the matcher
#[derive(Debug, Clone)]
pub enum HookEvent {
    Key(RawKeyEvent),
    /// Events may have been missed; carries an error code
    Interrupted(&'static str),
}

/// A system-wide keyboard interception mechanism
///
/// `install` blocks until the OS confirms the hook is in place.
/// Both operations are idempotent.
pub trait KeyboardHook: Send {
    /// Code space of the events this hook reports
    fn keymap(&self) -> Keymap;

    fn install(&mut self, sender: RawEventSender) -> Result<(), PlatformError>;

    /// Remove the hook; the sender passed to `install` is dropped
    /// before this returns
    fn uninstall(&mut self) -> Result<(), PlatformError>;

    fn is_installed(&self) -> bool;
}

/// Non-blocking producer half of the raw event queue
#[derive(Debug, Clone)]
pub struct RawEventSender {
    tx: mpsc::Sender<HookEvent>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half of the raw event queue
#[derive(Debug)]
pub struct RawEventReceiver {
    rx: mpsc::Receiver<HookEvent>,
    dropped: Arc<AtomicU64>,
}

/// Create a bounded raw event queue
pub fn raw_channel(capacity: usize) -> (RawEventSender, RawEventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        RawEventSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        RawEventReceiver { rx, dropped },
    )
}

impl RawEventSender {
    /// Enqueue a key transition stamped with the current time
    ///
    /// Never blocks. Returns `false` if the event was dropped.
    pub fn key(&self, code: u32, action: KeyAction) -> bool {
        self.send(HookEvent::Key(RawKeyEvent {
            code,
            action,
            timestamp: Instant::now(),
        }))
    }

    /// Report that events may have been missed
    pub fn interrupted(&self, code: &'static str) -> bool {
        self.send(HookEvent::Interrupted(code))
    }

    fn send(&self, event: HookEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("raw event queue closed");
                false
            }
        }
    }
}

impl RawEventReceiver {
    pub async fn recv(&mut self) -> Option<HookEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HookEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting events; queued ones can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Number of events dropped since the last call
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// The hook for the platform this binary was built for
pub fn platform() -> Box<dyn KeyboardHook> {
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::EventTapHook::new())
    }
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::EvdevHook::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::LowLevelHook::new())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Box::new(UnsupportedHook)
    }
}

/// Placeholder for platforms without a hook implementation
#[allow(dead_code)]
struct UnsupportedHook;

impl KeyboardHook for UnsupportedHook {
    fn keymap(&self) -> Keymap {
        Keymap::native()
    }

    fn install(&mut self, _sender: RawEventSender) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}
