//! # Lifecycle Coordinator
//!
//! Brings the webhook subsystem up and tears it down.
//!
//! ```text
//! Idle → ReceiverBound → TunnelOpen → SubscriptionActive
//!   └──────────┴──────────────┴──────────────┴──→ ShuttingDown → Terminated
//! ```
//!
//! Startup stops at the first step that cannot proceed and leaves the
//! subsystem degraded but running. Shutdown releases resources in reverse
//! order of acquisition and attempts every step exactly once.
//!
//! Startup is cancelled cooperatively through a [`StartupCancel`]: the step
//! in flight runs to completion (within its timeout) so whatever it acquired
//! is recorded and released by shutdown; no further step is started.

pub mod coordinator;
pub mod retry;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use coordinator::{LifecycleCoordinator, ShutdownReport, StepOutcome, TeardownStep};
pub use retry::{with_timeout_retry, STARTUP_ATTEMPTS};

/// Shared flag asking an in-progress startup to stop after its current step.
#[derive(Debug, Clone, Default)]
pub struct StartupCancel(Arc<AtomicBool>);

impl StartupCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where the webhook subsystem currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    ReceiverBound,
    TunnelOpen,
    SubscriptionActive,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ReceiverBound => "receiver-bound",
            Self::TunnelOpen => "tunnel-open",
            Self::SubscriptionActive => "subscription-active",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
