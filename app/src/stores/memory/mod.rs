// app/src/stores/memory/mod.rs

//! In-process stores. Each service's tables and outbox sit behind one
//! `parking_lot::Mutex`, so a state change and its events land together.

mod deliveries;
mod notifications;
mod orders;
mod payments;

pub use deliveries::MemoryDeliveryStore;
pub use notifications::MemoryNotificationStore;
pub use orders::MemoryOrderStore;
pub use payments::MemoryPaymentStore;
