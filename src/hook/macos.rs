//! Global keyboard hook using macOS CGEventTap
//!
//! Listens to KeyDown, KeyUp and FlagsChanged on a dedicated thread
//! with its own CFRunLoop. Modifier presses only arrive as FlagsChanged,
//! so their direction is read from the device-dependent flag bits,
//! which distinguish left from right.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use tracing::{debug, error, info, warn};

use super::{KeyAction, KeyboardHook, RawEventSender};
use crate::error::PlatformError;
use crate::events::TAP_DISABLED;
use crate::keys::Keymap;

/// Device-dependent modifier bits (`NX_DEVICE*KEYMASK`) by virtual key
fn modifier_mask(keycode: u32) -> Option<u64> {
    match keycode {
        0x3B => Some(0x0000_0001), // left control
        0x38 => Some(0x0000_0002), // left shift
        0x3C => Some(0x0000_0004), // right shift
        0x37 => Some(0x0000_0008), // left command
        0x36 => Some(0x0000_0010), // right command
        0x3A => Some(0x0000_0020), // left option
        0x3D => Some(0x0000_0040), // right option
        0x3E => Some(0x0000_2000), // right control
        _ => None,
    }
}

/// Caps lock's flag bit tracks the lock, not the key
const CAPS_LOCK: u32 = 0x39;

/// Key transitions implied by a FlagsChanged event
fn flag_transitions(keycode: u32, flags: u64) -> &'static [KeyAction] {
    if keycode == CAPS_LOCK {
        // only one event per physical press, so report a tap
        return &[KeyAction::Down, KeyAction::Up];
    }

    match modifier_mask(keycode) {
        Some(mask) if flags & mask != 0 => &[KeyAction::Down],
        Some(_) => &[KeyAction::Up],
        None => &[],
    }
}

/// CGEventTap-backed hook
pub struct EventTapHook {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventTapHook {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl KeyboardHook for EventTapHook {
    fn keymap(&self) -> Keymap {
        Keymap::MacOs
    }

    /// Spawn the run loop thread and wait until the tap is enabled
    fn install(&mut self, sender: RawEventSender) -> Result<(), PlatformError> {
        if self.thread.is_some() {
            debug!("event tap already installed");
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let handle = thread::Builder::new()
            .name("hotkey-event-tap".to_string())
            .spawn(move || {
                info!("event tap thread started");
                run_event_loop(sender, running, ready_tx);
                info!("event tap thread stopped");
            })
            .map_err(|e| PlatformError::ThreadSpawn(e.to_string()))?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(PlatformError::Install(
                "event tap thread exited before reporting".to_string(),
            ))
        });

        match ready {
            Ok(()) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            // the run loop wakes at least every 100ms to check the flag
            handle
                .join()
                .map_err(|_| PlatformError::Uninstall("event tap thread panicked".to_string()))?;
        }

        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.thread.is_some()
    }
}

fn keycode(event: &CGEvent) -> u32 {
    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u32
}

/// Create the tap, report readiness, then spin the run loop until stopped
fn run_event_loop(
    sender: RawEventSender,
    running: Arc<AtomicBool>,
    ready_tx: std_mpsc::Sender<Result<(), PlatformError>>,
) {
    let disabled = Arc::new(AtomicBool::new(false));
    let disabled_in_callback = Arc::clone(&disabled);

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown => {
                sender.key(keycode(event), KeyAction::Down);
            }
            CGEventType::KeyUp => {
                sender.key(keycode(event), KeyAction::Up);
            }
            CGEventType::FlagsChanged => {
                let code = keycode(event);
                for action in flag_transitions(code, event.get_flags().bits()) {
                    sender.key(code, *action);
                }
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                disabled_in_callback.store(true, Ordering::SeqCst);
                sender.interrupted(TAP_DISABLED);
            }
            _ => {}
        }
        Some(event.clone())
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            error!("failed to create event tap - is Accessibility permission granted?");
            let _ = ready_tx.send(Err(PlatformError::PermissionDenied(
                "failed to create event tap - check Accessibility permissions".to_string(),
            )));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready_tx.send(Err(PlatformError::Install(
                "failed to create run loop source for event tap".to_string(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();

    info!("event tap created and enabled");
    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }

        if disabled.swap(false, Ordering::SeqCst) {
            warn!("event tap disabled by the system, re-enabling");
            tap.enable();
        }
    }

    unsafe {
        run_loop.remove_source(&source, kCFRunLoopCommonModes);
    }
    // tap (and the sender captured by its callback) drops here
}
