//! Error taxonomy for the engine

use crate::lifecycle::LifecycleState;

/// Errors returned by the public engine API
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Malformed registration input; raised before the registry is touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing shortcut keys to register")]
    EmptyCombination,

    #[error("unknown key code: {0:?}")]
    UnknownKey(String),
}

/// The OS refused or failed to install/remove the keyboard hook
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed to install keyboard hook: {0}")]
    Install(String),

    #[error("failed to remove keyboard hook: {0}")]
    Uninstall(String),

    #[error("failed to spawn hook thread: {0}")]
    ThreadSpawn(String),

    #[error("global keyboard hooks are not supported on this platform")]
    Unsupported,

    #[error("keyboard hook is unavailable after an earlier failure")]
    Unavailable,
}

/// An illegal lifecycle transition was requested
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// A listener panicked while handling an event
///
/// Contained at the dispatch boundary; never returned to callers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("listener for {combination} (registration {registration}) panicked: {message}")]
pub struct ListenerError {
    pub registration: u64,
    pub combination: String,
    pub message: String,
}
