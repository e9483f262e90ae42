//! hotkey-engine: system-wide keyboard shortcuts
//!
//! Register combinations of physical keys and receive `keydown`/`keyup`
//! notifications regardless of which window has focus.
//!
//! ```no_run
//! use hotkey_engine::{ActivateOptions, Engine, EngineConfig, HotkeyEvent};
//!
//! # async fn run() -> Result<(), hotkey_engine::EngineError> {
//! let engine = Engine::new(EngineConfig::default());
//! let subscription = engine.register(["Shift", "Space"], |event: HotkeyEvent| {
//!     println!("{event}");
//! })?;
//! engine.activate(ActivateOptions::default()).await?;
//! # subscription.unsubscribe();
//! # engine.inactivate().await
//! # }
//! ```
//!
//! Pipeline:
//! - an OS hook thread translates native events and hands them off
//!   without blocking
//! - the matcher task owns the pressed-key state and decides which
//!   registrations change state
//! - the dispatcher task runs listeners in order, one at a time

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod hook;
pub mod keys;
pub mod lifecycle;
pub mod matcher;
pub mod registry;

pub use config::EngineConfig;
pub use engine::{ActivateOptions, Engine};
pub use error::{EngineError, LifecycleError, ListenerError, PlatformError, ValidationError};
pub use events::HotkeyEvent;
pub use keys::{Key, LogicalKey, Side};
pub use lifecycle::LifecycleState;
pub use registry::{Combination, Subscription};
