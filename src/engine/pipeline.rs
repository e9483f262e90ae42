//! Matching stage: raw hook events in, listener dispatches out

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::dispatch::Dispatch;
use crate::events::{Epoch, HotkeyEvent, DEVICE_LOST, EVENTS_DROPPED};
use crate::hook::{HookEvent, RawEventReceiver};
use crate::lifecycle::LifecycleState;
use crate::matcher::{Matched, Matcher, Transition};
use crate::registry::Registry;

/// The dispatcher went away; nothing more can be delivered
struct Closed;

/// Sole owner of pressed-key state for one activation
pub(crate) struct Pipeline {
    pub matcher: Matcher,
    pub registry: Registry,
    pub raw_rx: RawEventReceiver,
    pub dispatch_tx: mpsc::Sender<Dispatch>,
    pub errors: broadcast::Sender<HotkeyEvent>,
    pub state_rx: watch::Receiver<LifecycleState>,
    pub epoch: Epoch,
    pub verbose: bool,
}

impl Pipeline {
    /// Process raw events until `shutdown` fires, then drain what the
    /// hook queued before it was removed
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        debug!("matcher started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                event = self.raw_rx.recv() => match event {
                    Some(event) => {
                        if self.handle(event).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        if *self.state_rx.borrow() == LifecycleState::Active {
                            warn!("keyboard hook stopped on its own, engine is inert until reactivated");
                            let _ = self.interrupt(DEVICE_LOST).await;
                        }
                        break;
                    }
                },
            }
        }

        self.raw_rx.close();
        while let Some(event) = self.raw_rx.try_recv() {
            if self.handle(event).await.is_err() {
                return;
            }
        }

        debug!(held = self.matcher.pressed().len(), "matcher stopped");
    }

    async fn handle(&mut self, event: HookEvent) -> Result<(), Closed> {
        match event {
            HookEvent::Key(raw) => {
                let snapshot = self.registry.snapshot();
                let matched = self.matcher.process(&raw, &snapshot);
                self.forward(matched).await?;
            }
            HookEvent::Interrupted(code) => self.interrupt(code).await?,
        }

        let dropped = self.raw_rx.take_dropped();
        if dropped > 0 {
            warn!(dropped, "raw event queue overflowed");
            self.interrupt(EVENTS_DROPPED).await?;
        }

        Ok(())
    }

    /// Release everything and tell every listener that events were missed
    async fn interrupt(&mut self, code: &'static str) -> Result<(), Closed> {
        warn!(code, "keyboard hook interrupted, releasing held keys");

        let now = Instant::now();
        let snapshot = self.registry.snapshot();
        let released = self.matcher.release_all(now, &snapshot);
        self.forward(released).await?;

        let event = HotkeyEvent::Error {
            code: code.to_string(),
            time: self.epoch.millis(now),
        };
        for registration in snapshot.iter() {
            self.send(Dispatch {
                registration: registration.clone(),
                event: event.clone(),
            })
            .await?;
        }

        let _ = self.errors.send(event);
        Ok(())
    }

    async fn forward(&self, matched: Vec<Matched>) -> Result<(), Closed> {
        for Matched {
            registration,
            transition,
            timestamp,
        } in matched
        {
            let time = self.epoch.millis(timestamp);
            let event = match transition {
                Transition::Activated => HotkeyEvent::Keydown { time },
                Transition::Deactivated => HotkeyEvent::Keyup { time },
            };

            if self.verbose {
                info!(
                    id = registration.id(),
                    combination = %registration.combination(),
                    %event,
                    "hotkey"
                );
            } else {
                trace!(
                    id = registration.id(),
                    combination = %registration.combination(),
                    %event,
                    "hotkey"
                );
            }

            self.send(Dispatch {
                registration,
                event,
            })
            .await?;
        }
        Ok(())
    }

    async fn send(&self, dispatch: Dispatch) -> Result<(), Closed> {
        self.dispatch_tx.send(dispatch).await.map_err(|_| {
            debug!("dispatch queue closed");
            Closed
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::TAP_DISABLED;
    use crate::hook::{raw_channel, KeyAction};
    use crate::keys::{Key, Keymap, LogicalKey, Side};
    use crate::registry::Combination;

    fn evdev(code: &str) -> u32 {
        let key: LogicalKey = code.parse().unwrap();
        Keymap::Evdev.native_code(key).unwrap()
    }

    struct Harness {
        registry: Registry,
        raw_tx: crate::hook::RawEventSender,
        dispatch_rx: mpsc::Receiver<Dispatch>,
        errors_rx: broadcast::Receiver<HotkeyEvent>,
        shutdown: oneshot::Sender<()>,
        _state_tx: watch::Sender<LifecycleState>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(raw_capacity: usize) -> Harness {
        let registry = Registry::new();
        let (raw_tx, raw_rx) = raw_channel(raw_capacity);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        let (errors, errors_rx) = broadcast::channel(8);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(LifecycleState::Active);

        let pipeline = Pipeline {
            matcher: Matcher::new(Keymap::Evdev),
            registry: registry.clone(),
            raw_rx,
            dispatch_tx,
            errors,
            state_rx,
            epoch: Epoch::now(),
            verbose: false,
        };
        let task = tokio::spawn(pipeline.run(shutdown_rx));

        Harness {
            registry,
            raw_tx,
            dispatch_rx,
            errors_rx,
            shutdown,
            _state_tx: state_tx,
            task,
        }
    }

    impl Harness {
        async fn finish(mut self) -> (Vec<Dispatch>, broadcast::Receiver<HotkeyEvent>) {
            let _ = self.shutdown.send(());
            self.task.await.unwrap();
            let mut out = Vec::new();
            while let Some(dispatch) = self.dispatch_rx.recv().await {
                out.push(dispatch);
            }
            (out, self.errors_rx)
        }
    }

    #[tokio::test]
    async fn test_queued_events_are_processed_before_shutdown() {
        let harness = start(16);
        let _sub = harness.registry.insert(
            Combination::parse(["Shift", "Space"]).unwrap(),
            Arc::new(|_: HotkeyEvent| {}),
        );

        harness.raw_tx.key(evdev("ShiftLeft"), KeyAction::Down);
        harness.raw_tx.key(evdev("Space"), KeyAction::Down);
        harness.raw_tx.key(evdev("Space"), KeyAction::Up);

        let (out, _) = harness.finish().await;
        let events: Vec<_> = out.into_iter().map(|d| d.event).collect();
        assert!(matches!(events[..], [HotkeyEvent::Keydown { .. }, HotkeyEvent::Keyup { .. }]));
    }

    #[tokio::test]
    async fn test_interruption_releases_and_reports() {
        let mut harness = start(16);
        let _sub = harness.registry.insert(
            Combination::from_keys([
                LogicalKey::sided(Key::Control, Side::Left).unwrap(),
                LogicalKey::new(Key::KeyK),
            ])
            .unwrap(),
            Arc::new(|_: HotkeyEvent| {}),
        );

        harness.raw_tx.key(evdev("ControlLeft"), KeyAction::Down);
        harness.raw_tx.key(evdev("KeyK"), KeyAction::Down);
        harness.raw_tx.interrupted(TAP_DISABLED);
        // the matcher forgot both keys, so these releases are ignored
        harness.raw_tx.key(evdev("KeyK"), KeyAction::Up);
        harness.raw_tx.key(evdev("ControlLeft"), KeyAction::Up);

        let broadcast = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            harness.errors_rx.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(broadcast, HotkeyEvent::Error { ref code, .. } if code == TAP_DISABLED));

        let (out, _) = harness.finish().await;
        let events: Vec<_> = out.into_iter().map(|d| d.event).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], HotkeyEvent::Keydown { .. }));
        assert!(matches!(events[1], HotkeyEvent::Keyup { .. }));
        assert!(matches!(events[2], HotkeyEvent::Error { ref code, .. } if code == TAP_DISABLED));
    }

    #[tokio::test]
    async fn test_overflow_is_reported_as_dropped_events() {
        let harness = start(1);
        let _sub = harness.registry.insert(
            Combination::parse(["KeyA"]).unwrap(),
            Arc::new(|_: HotkeyEvent| {}),
        );

        // the matcher task has not run yet, so the second send overflows
        assert!(harness.raw_tx.key(evdev("KeyA"), KeyAction::Down));
        assert!(!harness.raw_tx.key(evdev("KeyA"), KeyAction::Up));

        let (out, mut errors_rx) = harness.finish().await;
        let events: Vec<_> = out.into_iter().map(|d| d.event).collect();
        assert!(matches!(events[0], HotkeyEvent::Keydown { .. }));
        assert!(matches!(events[1], HotkeyEvent::Keyup { .. }));
        assert!(matches!(events[2], HotkeyEvent::Error { ref code, .. } if code == EVENTS_DROPPED));
        assert!(errors_rx.try_recv().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_hook_stopping_while_active_releases_and_reports() {
        let harness = start(16);
        let _sub = harness.registry.insert(
            Combination::parse(["KeyA"]).unwrap(),
            Arc::new(|_: HotkeyEvent| {}),
        );

        harness.raw_tx.key(evdev("KeyA"), KeyAction::Down);
        let Harness {
            registry: _registry,
            raw_tx,
            mut dispatch_rx,
            mut errors_rx,
            shutdown: _shutdown,
            _state_tx,
            task,
        } = harness;
        drop(raw_tx);
        task.await.unwrap();

        let mut events = Vec::new();
        while let Some(dispatch) = dispatch_rx.recv().await {
            events.push(dispatch.event);
        }
        assert!(matches!(events[0], HotkeyEvent::Keydown { .. }));
        assert!(matches!(events[1], HotkeyEvent::Keyup { .. }));
        assert!(matches!(events[2], HotkeyEvent::Error { ref code, .. } if code == DEVICE_LOST));
        assert!(errors_rx.try_recv().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_hook_stopping_during_shutdown_is_silent() {
        let harness = start(16);
        let _sub = harness.registry.insert(
            Combination::parse(["KeyA"]).unwrap(),
            Arc::new(|_: HotkeyEvent| {}),
        );

        harness.raw_tx.key(evdev("KeyA"), KeyAction::Down);
        harness._state_tx.send_replace(LifecycleState::Inactivating);
        let Harness {
            raw_tx,
            mut dispatch_rx,
            mut errors_rx,
            shutdown: _shutdown,
            _state_tx,
            task,
            ..
        } = harness;
        drop(raw_tx);
        task.await.unwrap();

        let mut events = Vec::new();
        while let Some(dispatch) = dispatch_rx.recv().await {
            events.push(dispatch.event);
        }
        assert!(matches!(events[..], [HotkeyEvent::Keydown { .. }]));
        assert!(errors_rx.try_recv().is_err());
    }
}
