mod discovery;
mod store;

pub use discovery::{DiscoverySource, ProcessScanDiscovery, RosterDiscovery};
pub use store::{RegistryDelta, WorkerRegistry};
