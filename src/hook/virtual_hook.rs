//! In-process hook driven by synthetic key presses

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::{KeyAction, KeyboardHook, RawEventSender};
use crate::error::PlatformError;
use crate::keys::{Keymap, LogicalKey};

type Slot = Arc<Mutex<Option<RawEventSender>>>;

/// A hook that reports whatever its [`VirtualKeyboard`] types
///
/// Uses the evdev code space on every platform.
pub struct VirtualHook {
    slot: Slot,
    refuse: Option<String>,
}

/// Handle for typing on a [`VirtualHook`]
#[derive(Clone)]
pub struct VirtualKeyboard {
    slot: Slot,
}

impl VirtualHook {
    pub fn new() -> (Self, VirtualKeyboard) {
        let slot: Slot = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
                refuse: None,
            },
            VirtualKeyboard { slot },
        )
    }

    /// A hook whose installation always fails with `PermissionDenied`
    pub fn refusing(reason: impl Into<String>) -> (Self, VirtualKeyboard) {
        let (mut hook, keyboard) = Self::new();
        hook.refuse = Some(reason.into());
        (hook, keyboard)
    }
}

impl KeyboardHook for VirtualHook {
    fn keymap(&self) -> Keymap {
        Keymap::Evdev
    }

    fn install(&mut self, sender: RawEventSender) -> Result<(), PlatformError> {
        if let Some(reason) = &self.refuse {
            return Err(PlatformError::PermissionDenied(reason.clone()));
        }

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(sender);
            debug!("virtual hook installed");
        }
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            debug!("virtual hook removed");
        }
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl VirtualKeyboard {
    /// Press the key with the given code string
    ///
    /// Returns `false` when the hook is not installed, the code has no
    /// native key (merged modifiers, unknown names), or the queue is full.
    pub fn press(&self, code: &str) -> bool {
        self.emit(code, KeyAction::Down)
    }

    pub fn release(&self, code: &str) -> bool {
        self.emit(code, KeyAction::Up)
    }

    /// Press every key in order, then release them in reverse order
    pub fn tap(&self, codes: &[&str]) -> bool {
        let pressed = codes.iter().all(|code| self.press(code));
        let released = codes.iter().rev().all(|code| self.release(code));
        pressed && released
    }

    /// Send a native code that may not be in the key table
    pub fn raw(&self, code: u32, action: KeyAction) -> bool {
        match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(sender) => sender.key(code, action),
            None => false,
        }
    }

    /// Simulate the OS dropping the hook
    pub fn interrupt(&self, code: &'static str) -> bool {
        match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(sender) => sender.interrupted(code),
            None => false,
        }
    }

    fn emit(&self, code: &str, action: KeyAction) -> bool {
        let native = code
            .parse::<LogicalKey>()
            .ok()
            .and_then(|key| Keymap::Evdev.native_code(key));

        match native {
            Some(native) => self.raw(native, action),
            None => false,
        }
    }
}
