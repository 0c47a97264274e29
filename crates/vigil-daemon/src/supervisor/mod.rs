mod cancellation;
mod core;
mod digest;
mod reset;
mod state;
mod stats;

pub use cancellation::{CancelHandle, CancellationToken};
pub use self::core::{Supervisor, SupervisorParts};
pub use digest::StatusDigest;
pub use reset::{ResetInbox, ResetRequest};
pub use state::{SlotHandle, StatusCounts, WorkerSlot, WorkerStateTable};
pub use stats::{ShutdownReport, SupervisorStats, TickReport};

#[cfg(test)]
mod tests;
