//! Listener dispatch
//!
//! Matched events arrive over a bounded FIFO channel and listeners run
//! on the dispatcher task, never on the hook thread. A panicking
//! listener is contained here and reported as an `error` event.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, trace};

use crate::error::ListenerError;
use crate::events::{Epoch, HotkeyEvent, LISTENER_PANICKED};
use crate::registry::Registration;

/// An event addressed to one registration
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub registration: Arc<Registration>,
    pub event: HotkeyEvent,
}

/// Invoke one listener, containing any panic
///
/// Returns `Ok(false)` when the registration was unsubscribed and the
/// event was discarded.
pub fn deliver(dispatch: Dispatch) -> Result<bool, ListenerError> {
    let Dispatch {
        registration,
        event,
    } = dispatch;

    if !registration.is_subscribed() {
        trace!(id = registration.id(), "dropping event for unsubscribed listener");
        return Ok(false);
    }

    let listener = registration.listener();
    panic::catch_unwind(AssertUnwindSafe(|| listener(event)))
        .map(|()| true)
        .map_err(|payload| ListenerError {
            registration: registration.id(),
            combination: registration.combination().to_string(),
            message: panic_message(payload.as_ref()),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Consumer side of the dispatch queue
pub struct Dispatcher {
    rx: mpsc::Receiver<Dispatch>,
    errors: broadcast::Sender<HotkeyEvent>,
    epoch: Epoch,
}

impl Dispatcher {
    pub fn new(
        rx: mpsc::Receiver<Dispatch>,
        errors: broadcast::Sender<HotkeyEvent>,
        epoch: Epoch,
    ) -> Self {
        Self { rx, errors, epoch }
    }

    /// Deliver events in order until every sender is gone
    pub async fn run(mut self) {
        debug!("dispatcher started");

        while let Some(dispatch) = self.rx.recv().await {
            if let Err(err) = deliver(dispatch) {
                error!(%err, "listener panicked");
                let _ = self.errors.send(HotkeyEvent::Error {
                    code: LISTENER_PANICKED.to_string(),
                    time: self.epoch.millis(Instant::now()),
                });
            }
        }

        debug!("dispatcher drained");
    }
}
