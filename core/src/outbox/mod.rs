// core/src/outbox/mod.rs

//! Transactional outbox.
//!
//! A service writes its state change and the event describing it in the same
//! transaction (an `OutboxRecord`). The relay later claims pending records,
//! publishes them and marks them published, so an event is emitted if and
//! only if the state change committed.

pub mod record;
pub mod relay;
pub mod store;
pub mod table;

pub use record::{OutboxRecord, OutboxStatus};
pub use relay::{DrainReport, OutboxRelay, RelaySettings};
pub use store::{OutboxStore, SharedOutbox};
pub use table::OutboxTable;
