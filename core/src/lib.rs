// core/src/lib.rs

//! tiffin-core: the messaging kernel shared by the tiffin services.
//!
//!  - `Pipeline`: named async steps with before/on/after hooks over a shared context.
//!  - `EventBus`: partitioned, at-least-once delivery with per-group offsets.
//!  - `Consumer`: topic routing with commit / retry / dead-letter decisions.
//!  - `outbox`: transactional outbox records and the relay that publishes them.

pub mod bus;
pub mod consumer;
pub mod core;
pub mod error;
pub mod outbox;
pub mod pipeline;

pub use crate::core::context::Handler;
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::bus::{partition_for_key, DeadLetter, Delivery, Envelope, EventBus, InMemoryBus, Position};
pub use crate::consumer::{Consumer, ConsumerSettings, RoundReport};
pub use crate::outbox::{DrainReport, OutboxRecord, OutboxRelay, OutboxStatus, OutboxStore, OutboxTable, RelaySettings, SharedOutbox};

pub use crate::error::{CoreError, CoreResult, FailureKind};
