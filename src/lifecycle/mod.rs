//! Engine lifecycle: activation state machine and process shutdown

mod machine;
mod shutdown;

pub use machine::{Lifecycle, LifecycleState};
pub use shutdown::ShutdownSignal;
