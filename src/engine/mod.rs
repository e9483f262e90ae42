//! The global hotkey engine
//!
//! Ties the pieces together: one keyboard hook, a matcher task that owns
//! the pressed-key state, and a dispatcher task where listeners run.
//! Registrations live in the engine and survive any number of
//! activate/inactivate cycles.

mod pipeline;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, PlatformError};
use crate::events::{Epoch, HotkeyEvent};
use crate::hook::{self, raw_channel, KeyboardHook};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::matcher::Matcher;
use crate::registry::{Combination, Registry, Snapshot, Subscription};

use self::pipeline::Pipeline;

type SharedHook = Arc<Mutex<Box<dyn KeyboardHook>>>;

/// Options for [`Engine::activate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivateOptions {
    /// Log every matched hotkey at `info` instead of `trace`
    pub verbose: bool,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    matcher: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Owned handles a lifecycle task needs from the engine
struct Wiring {
    registry: Registry,
    config: EngineConfig,
    epoch: Epoch,
    errors: broadcast::Sender<HotkeyEvent>,
    state_rx: watch::Receiver<LifecycleState>,
}

struct Controller {
    lifecycle: Lifecycle,
    hook: SharedHook,
    running: Option<Running>,
}

impl Controller {
    async fn activate(&mut self, wiring: Wiring, options: ActivateOptions) -> Result<(), EngineError> {
        if self.lifecycle.state() == LifecycleState::Active {
            debug!("engine already active");
            return Ok(());
        }

        self.lifecycle.transition_to(LifecycleState::Activating)?;

        let (sender, raw_rx) = raw_channel(wiring.config.raw_queue_capacity);
        let keymap = lock_hook(&self.hook).keymap();
        let installed = run_blocking(&self.hook, move |hook| hook.install(sender)).await;
        if let Err(err) = installed {
            error!(%err, "failed to install keyboard hook");
            self.lifecycle.transition_to(LifecycleState::Inactive)?;
            return Err(err.into());
        }

        let (dispatch_tx, dispatch_rx) = mpsc::channel(wiring.config.dispatch_queue_capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();

        let registrations = wiring.registry.len();
        let pipeline = Pipeline {
            matcher: Matcher::new(keymap),
            registry: wiring.registry,
            raw_rx,
            dispatch_tx,
            errors: wiring.errors.clone(),
            state_rx: wiring.state_rx,
            epoch: wiring.epoch,
            verbose: options.verbose,
        };
        let dispatcher = Dispatcher::new(dispatch_rx, wiring.errors, wiring.epoch);

        self.running = Some(Running {
            shutdown,
            matcher: tokio::spawn(pipeline.run(shutdown_rx)),
            dispatcher: tokio::spawn(dispatcher.run()),
        });
        self.lifecycle.transition_to(LifecycleState::Active)?;

        info!(
            ?keymap,
            registrations,
            verbose = options.verbose,
            "engine activated"
        );
        Ok(())
    }

    async fn inactivate(&mut self) -> Result<(), EngineError> {
        if self.lifecycle.state() == LifecycleState::Inactive {
            debug!("engine already inactive");
            return Ok(());
        }

        self.lifecycle.transition_to(LifecycleState::Inactivating)?;

        let uninstalled = run_blocking(&self.hook, |hook| hook.uninstall()).await;
        if let Err(err) = &uninstalled {
            error!(%err, "failed to remove keyboard hook");
        }

        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            if let Err(err) = running.matcher.await {
                warn!(%err, "matcher task ended abnormally");
            }
            if let Err(err) = running.dispatcher.await {
                warn!(%err, "dispatcher task ended abnormally");
            }
        }

        self.lifecycle.transition_to(LifecycleState::Inactive)?;
        info!("engine inactivated");

        uninstalled.map_err(EngineError::from)
    }
}

/// A system-wide hotkey engine
pub struct Engine {
    registry: Registry,
    controller: Arc<tokio::sync::Mutex<Controller>>,
    config: EngineConfig,
    epoch: Epoch,
    errors: broadcast::Sender<HotkeyEvent>,
    state_rx: watch::Receiver<LifecycleState>,
}

impl Engine {
    /// Create an engine backed by this platform's keyboard hook
    pub fn new(config: EngineConfig) -> Self {
        Self::with_hook(config, hook::platform())
    }

    /// Create an engine backed by a specific hook
    pub fn with_hook(config: EngineConfig, hook: Box<dyn KeyboardHook>) -> Self {
        let lifecycle = Lifecycle::new();
        let state_rx = lifecycle.subscribe();
        let (errors, _) = broadcast::channel(config.error_channel_capacity.max(1));

        Self {
            registry: Registry::new(),
            controller: Arc::new(tokio::sync::Mutex::new(Controller {
                lifecycle,
                hook: Arc::new(Mutex::new(hook)),
                running: None,
            })),
            config,
            epoch: Epoch::now(),
            errors,
            state_rx,
        }
    }

    /// Install the hook and start delivering events
    ///
    /// Calling this on an active engine does nothing. The change runs on
    /// its own task: dropping the returned future does not abort it, and
    /// later lifecycle calls wait for it to finish.
    pub async fn activate(&self, options: ActivateOptions) -> Result<(), EngineError> {
        let controller = Arc::clone(&self.controller);
        let wiring = self.wiring();
        join(tokio::spawn(async move {
            let mut controller = controller.lock_owned().await;
            controller.activate(wiring, options).await
        }))
        .await
    }

    /// Remove the hook and stop delivering events
    ///
    /// Events the hook produced before removal are still delivered; once
    /// this resolves no listener runs. Calling this on an inactive
    /// engine does nothing. Like [`activate`](Engine::activate), the
    /// change completes even if the returned future is dropped.
    pub async fn inactivate(&self) -> Result<(), EngineError> {
        let controller = Arc::clone(&self.controller);
        join(tokio::spawn(async move {
            let mut controller = controller.lock_owned().await;
            controller.inactivate().await
        }))
        .await
    }

    /// Register a listener for a key combination
    ///
    /// `codes` are key code strings such as `"ShiftLeft"`, `"Shift"` or
    /// `"KeyA"`, in any order. Works in any lifecycle state. The listener
    /// runs on the dispatcher task and receives `keydown`, `keyup` and
    /// `error` events until the returned subscription is unsubscribed.
    pub fn register<I, S, F>(&self, codes: I, listener: F) -> Result<Subscription, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(HotkeyEvent) + Send + Sync + 'static,
    {
        let combination = Combination::parse(codes)?;
        Ok(self.registry.insert(combination, Arc::new(listener)))
    }

    /// Engine-wide error events
    pub fn errors(&self) -> broadcast::Receiver<HotkeyEvent> {
        self.errors.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    /// Current registrations, in registration order
    pub fn registrations(&self) -> Snapshot {
        self.registry.snapshot()
    }

    fn wiring(&self) -> Wiring {
        Wiring {
            registry: self.registry.clone(),
            config: self.config.clone(),
            epoch: self.epoch,
            errors: self.errors.clone(),
            state_rx: self.state_rx.clone(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let Ok(mut controller) = self.controller.try_lock() else {
            debug!("engine dropped during a lifecycle change");
            return;
        };

        if let Some(running) = controller.running.take() {
            if let Err(err) = lock_hook(&controller.hook).uninstall() {
                warn!(%err, "failed to remove keyboard hook on drop");
            }
            running.matcher.abort();
            running.dispatcher.abort();
            debug!("engine dropped while active");
        }
    }
}

/// Wait for a lifecycle task
async fn join(task: JoinHandle<Result<(), EngineError>>) -> Result<(), EngineError> {
    task.await.map_err(|err| {
        error!(%err, "lifecycle task failed");
        PlatformError::Unavailable
    })?
}

fn lock_hook(hook: &SharedHook) -> std::sync::MutexGuard<'_, Box<dyn KeyboardHook>> {
    hook.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run a hook operation on the blocking pool
async fn run_blocking<F>(hook: &SharedHook, op: F) -> Result<(), PlatformError>
where
    F: FnOnce(&mut dyn KeyboardHook) -> Result<(), PlatformError> + Send + 'static,
{
    let hook = Arc::clone(hook);
    tokio::task::spawn_blocking(move || op(&mut **lock_hook(&hook)))
        .await
        .map_err(|err| {
            error!(%err, "keyboard hook task failed");
            PlatformError::Unavailable
        })?
}
