//! Global keyboard hook using a Windows low-level keyboard hook
//!
//! `WH_KEYBOARD_LL` callbacks run on the thread that installed the hook,
//! inside its message loop. The hook procedure is a plain function, so
//! the active sender lives in a process-wide slot; only one engine per
//! process can hold the low-level hook at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    KBDLLHOOKSTRUCT, LLKHF_EXTENDED, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use super::{KeyAction, KeyboardHook, RawEventSender};
use crate::error::PlatformError;
use crate::keys::{Keymap, WINDOWS_EXTENDED};

const VK_RETURN: u32 = 0x0D;

/// Sender used by the hook procedure
static SINK: Mutex<Option<RawEventSender>> = Mutex::new(None);
/// Whether some engine currently owns [`SINK`]
static CLAIMED: AtomicBool = AtomicBool::new(false);

/// `WH_KEYBOARD_LL`-backed hook
pub struct LowLevelHook {
    thread: Option<(u32, JoinHandle<()>)>,
}

impl LowLevelHook {
    pub fn new() -> Self {
        Self { thread: None }
    }
}

/// Low-level keyboard hook procedure
unsafe extern "system" fn keyboard_proc(ncode: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if ncode >= 0 {
        let action = match wparam.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyAction::Down),
            WM_KEYUP | WM_SYSKEYUP => Some(KeyAction::Up),
            _ => None,
        };

        if let Some(action) = action {
            let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            let mut code = info.vkCode;
            if code == VK_RETURN && (info.flags.0 & LLKHF_EXTENDED.0) != 0 {
                code |= WINDOWS_EXTENDED;
            }

            if let Some(sender) = &*SINK.lock().unwrap_or_else(PoisonError::into_inner) {
                sender.key(code, action);
            }
        }
    }

    CallNextHookEx(None, ncode, wparam, lparam)
}

impl KeyboardHook for LowLevelHook {
    fn keymap(&self) -> Keymap {
        Keymap::Windows
    }

    fn install(&mut self, sender: RawEventSender) -> Result<(), PlatformError> {
        if self.thread.is_some() {
            debug!("low-level keyboard hook already installed");
            return Ok(());
        }

        if CLAIMED.swap(true, Ordering::SeqCst) {
            return Err(PlatformError::Install(
                "another engine in this process owns the low-level keyboard hook".to_string(),
            ));
        }

        *SINK.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let spawned = thread::Builder::new()
            .name("hotkey-ll-hook".to_string())
            .spawn(move || {
                info!("low-level hook thread started");
                run_message_loop(ready_tx);
                info!("low-level hook thread stopped");
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                release_sink();
                return Err(PlatformError::ThreadSpawn(e.to_string()));
            }
        };

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(PlatformError::Install(
                "hook thread exited before reporting".to_string(),
            ))
        });

        match ready {
            Ok(thread_id) => {
                self.thread = Some((thread_id, handle));
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                release_sink();
                Err(e)
            }
        }
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        let Some((thread_id, handle)) = self.thread.take() else {
            return Ok(());
        };

        let posted = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        if let Err(e) = posted {
            warn!(error = %e, "failed to post WM_QUIT to hook thread");
        }

        let joined = handle.join();
        release_sink();
        joined.map_err(|_| PlatformError::Uninstall("hook thread panicked".to_string()))
    }

    fn is_installed(&self) -> bool {
        self.thread.is_some()
    }
}

fn release_sink() {
    SINK.lock().unwrap_or_else(PoisonError::into_inner).take();
    CLAIMED.store(false, Ordering::SeqCst);
}

/// Install the hook on this thread and pump messages until `WM_QUIT`
fn run_message_loop(ready_tx: std_mpsc::Sender<Result<u32, PlatformError>>) {
    let module = unsafe { GetModuleHandleW(None) }
        .ok()
        .map(|module| HINSTANCE(module.0));

    let hook = match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), module, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready_tx.send(Err(PlatformError::Install(e.to_string())));
            return;
        }
    };

    let thread_id = unsafe { GetCurrentThreadId() };
    info!(thread_id, "low-level keyboard hook installed");
    let _ = ready_tx.send(Ok(thread_id));

    let mut msg = MSG::default();
    // hook callbacks are delivered while this thread waits in GetMessageW
    while unsafe { GetMessageW(&mut msg, None, 0, 0) }.as_bool() {}

    if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
        warn!(error = %e, "failed to remove low-level keyboard hook");
    }
}
