// app/src/stores/postgres/mod.rs

//! Postgres stores. Queries are built at runtime; statuses are stored as
//! their lowercase literals and line items as JSONB.

mod bus;
mod deliveries;
mod notifications;
mod orders;
mod outbox;
mod payments;

pub use bus::PgEventBus;
pub use deliveries::PgDeliveryStore;
pub use notifications::PgNotificationStore;
pub use orders::PgOrderStore;
pub use outbox::PgOutbox;
pub use payments::PgPaymentStore;

fn is_unique_violation(err: &sqlx::Error) -> bool {
  matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
