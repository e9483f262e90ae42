//! hotkeyd: logs configured global hotkeys
//!
//! Loads bindings from `$HOTKEYD_CONFIG` (or
//! `~/.config/hotkeyd/config.json`), activates the engine and logs every
//! keydown/keyup until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hotkey_engine::config::Config;
use hotkey_engine::lifecycle::ShutdownSignal;
use hotkey_engine::{ActivateOptions, Engine, HotkeyEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hotkeyd starting");

    let config = Config::load().context("failed to load configuration")?;
    info!(bindings = config.bindings.len(), verbose = config.verbose, "configuration loaded");

    let shutdown = ShutdownSignal::new();
    let engine = Engine::new(config.engine.clone());

    let mut subscriptions = Vec::with_capacity(config.bindings.len());
    for binding in &config.bindings {
        let name = binding.name.clone();
        let registered = engine.register(&binding.keys, move |event: HotkeyEvent| match event {
            HotkeyEvent::Error { code, time } => warn!(binding = %name, %code, time, "hotkey error"),
            event => info!(binding = %name, %event, "hotkey"),
        });

        match registered {
            Ok(subscription) => {
                info!(binding = %binding.name, combination = %subscription.combination(), "binding registered");
                subscriptions.push(subscription);
            }
            Err(e) => {
                error!(binding = %binding.name, error = %e, "skipping invalid binding");
            }
        }
    }

    engine
        .activate(ActivateOptions {
            verbose: config.verbose,
        })
        .await
        .context("failed to activate hotkey engine (check input permissions)")?;

    let mut errors = engine.errors();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = async {
            loop {
                match errors.recv().await {
                    Ok(event) => warn!(%event, "engine error"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "error receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("error channel closed");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    info!("shutting down...");

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    engine.inactivate().await?;

    info!("hotkeyd stopped");

    Ok(())
}
