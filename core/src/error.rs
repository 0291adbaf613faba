// core/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Error in handler or external operation. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Payload for topic '{topic}' could not be encoded: {source}")]
  Encode {
    topic: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("Envelope {envelope_id} on topic '{topic}' could not be decoded: {source}")]
  Decode {
    envelope_id: Uuid,
    topic: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("No handler registered for topic '{topic}' in consumer group '{group}'")]
  NoRoute { group: String, topic: String },

  #[error("Event bus unavailable: {0}")]
  BusUnavailable(String),

  #[error("Outbox store failure. Source: {source}")]
  Outbox {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal kernel error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for CoreError {
  fn from(err: AnyhowError) -> Self {
    CoreError::HandlerError { source: err }
  }
}

pub type CoreResult<T, E = CoreError> = std::result::Result<T, E>;

/// Classifies a failure reported by a consumer handler.
///
/// Transient failures leave the message uncommitted so the bus redelivers it.
/// Permanent failures (poison messages) are dead-lettered immediately, since
/// redelivering them can never succeed and would block their partition.
pub trait FailureKind {
  fn is_transient(&self) -> bool;
}

impl FailureKind for CoreError {
  fn is_transient(&self) -> bool {
    !matches!(
      self,
      CoreError::Encode { .. } | CoreError::Decode { .. } | CoreError::NoRoute { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_failures_are_permanent() {
    let source = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
    let err = CoreError::Decode {
      envelope_id: Uuid::new_v4(),
      topic: "payment.succeeded".to_string(),
      source,
    };
    assert!(!err.is_transient());
    assert!(CoreError::BusUnavailable("closed".to_string()).is_transient());
  }

  #[test]
  fn anyhow_errors_become_handler_errors() {
    let err: CoreError = anyhow::anyhow!("db went away").into();
    assert!(matches!(err, CoreError::HandlerError { .. }));
    assert!(err.to_string().contains("db went away"));
  }
}
