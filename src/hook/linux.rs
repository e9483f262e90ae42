//! Global keyboard hook reading Linux input devices through evdev
//!
//! Reads `/dev/input/event*` directly, so it works under both X11 and
//! Wayland. The process needs read access to those devices, which
//! usually means membership in the `input` group.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use evdev::{Device, EventType, Key};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info, warn};

use super::{KeyAction, KeyboardHook, RawEventSender};
use crate::error::PlatformError;
use crate::events::DEVICE_LOST;
use crate::keys::Keymap;

const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_REPEAT: i32 = 2;

/// How often to look for a keyboard once none is left
const RESCAN_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// evdev-backed hook
pub struct EvdevHook {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EvdevHook {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

/// Readable devices that look like keyboards
fn find_keyboards() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(_, device)| {
            device
                .supported_keys()
                .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_SPACE))
        })
        .collect()
}

impl KeyboardHook for EvdevHook {
    fn keymap(&self) -> Keymap {
        Keymap::Evdev
    }

    /// Open every keyboard, then hand them to the reader thread
    fn install(&mut self, sender: RawEventSender) -> Result<(), PlatformError> {
        if self.thread.is_some() {
            debug!("evdev hook already installed");
            return Ok(());
        }

        let devices = find_keyboards();
        if devices.is_empty() {
            return Err(PlatformError::PermissionDenied(
                "no readable keyboard under /dev/input - is the user in the `input` group?"
                    .to_string(),
            ));
        }

        for (path, device) in &devices {
            info!(
                path = %path.display(),
                name = device.name().unwrap_or("unknown"),
                "listening to keyboard"
            );
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("hotkey-evdev".to_string())
            .spawn(move || {
                info!("evdev reader thread started");
                run_read_loop(devices, sender, running);
                info!("evdev reader thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                PlatformError::ThreadSpawn(e.to_string())
            })?;

        self.thread = Some(handle);
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), PlatformError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| PlatformError::Uninstall("evdev reader thread panicked".to_string()))?;
        }

        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.thread.is_some()
    }
}

/// Poll every device with a 100ms timeout so the stop flag is honoured
fn run_read_loop(
    mut devices: Vec<(PathBuf, Device)>,
    sender: RawEventSender,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        if devices.is_empty() {
            warn!("no keyboards left to read, waiting for one to appear");
            devices = wait_for_keyboards(&running);
            if !devices.is_empty() {
                info!(count = devices.len(), "keyboards reattached");
            }
            continue;
        }

        let ready: Vec<usize> = {
            let mut fds: Vec<PollFd> = devices
                .iter()
                .map(|(_, device)| {
                    // SAFETY: the fd belongs to a device that outlives this poll.
                    let fd = unsafe { BorrowedFd::borrow_raw(device.as_raw_fd()) };
                    PollFd::new(fd, PollFlags::POLLIN)
                })
                .collect();

            match poll(&mut fds, PollTimeout::from(POLL_INTERVAL.as_millis() as u16)) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(nix::Error::EINTR) => continue,
                Err(e) => {
                    // dropping the sender tells the engine the hook is gone
                    error!(error = %e, "poll error on input devices");
                    return;
                }
            }

            fds.iter()
                .enumerate()
                .filter(|(_, fd)| fd.revents().is_some_and(|flags| !flags.is_empty()))
                .map(|(index, _)| index)
                .collect()
        };

        let mut lost = Vec::new();
        for index in ready {
            let (path, device) = &mut devices[index];
            match device.fetch_events() {
                Ok(events) => {
                    for event in events {
                        if event.event_type() != EventType::KEY {
                            continue;
                        }
                        let action = match event.value() {
                            KEY_RELEASE => KeyAction::Up,
                            KEY_PRESS | KEY_REPEAT => KeyAction::Down,
                            _ => continue,
                        };
                        sender.key(u32::from(event.code()), action);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "input device lost");
                    lost.push(index);
                }
            }
        }

        if !lost.is_empty() {
            for index in lost.into_iter().rev() {
                devices.remove(index);
            }
            sender.interrupted(DEVICE_LOST);
        }
    }
    // devices and sender drop here
}

/// Rescan until a keyboard shows up or the hook is stopped
fn wait_for_keyboards(running: &AtomicBool) -> Vec<(PathBuf, Device)> {
    let mut last_scan = Instant::now();
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
        if last_scan.elapsed() < RESCAN_INTERVAL {
            continue;
        }

        last_scan = Instant::now();
        let devices = find_keyboards();
        if !devices.is_empty() {
            return devices;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_creation() {
        let mut hook = EvdevHook::new();
        assert!(!hook.is_installed());
        assert_eq!(hook.keymap(), Keymap::Evdev);
        assert!(hook.uninstall().is_ok());
    }

    #[test]
    fn test_rescan_returns_once_stopped() {
        let running = AtomicBool::new(false);
        assert!(wait_for_keyboards(&running).is_empty());
    }

    #[test]
    fn test_evdev_codes_match_key_table() {
        assert_eq!(
            Keymap::Evdev.lookup(u32::from(Key::KEY_A.code())).map(|k| k.code()),
            Some("KeyA")
        );
        assert_eq!(
            Keymap::Evdev.lookup(u32::from(Key::KEY_LEFTCTRL.code())).map(|k| k.code()),
            Some("ControlLeft")
        );
        assert_eq!(
            Keymap::Evdev.lookup(u32::from(Key::KEY_RIGHTMETA.code())).map(|k| k.code()),
            Some("MetaRight")
        );
        assert_eq!(
            Keymap::Evdev.lookup(u32::from(Key::KEY_SPACE.code())).map(|k| k.code()),
            Some("Space")
        );
    }
}
