mod backoff;
mod journal;
mod persistence;
mod snapshot;
mod store;
mod writer;

pub use backoff::RetryBackoff;
pub use journal::Journal;
pub use persistence::{MemoryPersistence, ProfilePersistence};
pub use snapshot::{ProfileRow, ProfileSnapshot};
pub use store::ProfileStore;
pub use writer::{PendingWrite, PersistenceWriter, WriteStatus, WriterStats};
