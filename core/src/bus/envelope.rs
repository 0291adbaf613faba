// core/src/bus/envelope.rs
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport wrapper around one event.
///
/// `id` is unique per published event and stable across redeliveries, which
/// is what consumers key their idempotency on when they need to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
  pub id: Uuid,
  pub topic: String,
  /// Partition key. Messages with equal keys keep their relative order.
  pub key: String,
  pub schema_version: u16,
  pub occurred_at: DateTime<Utc>,
  pub payload: serde_json::Value,
}

impl Envelope {
  /// Serializes `payload` into a new envelope.
  pub fn encode<T: Serialize>(
    topic: impl Into<String>,
    key: impl Into<String>,
    schema_version: u16,
    payload: &T,
  ) -> CoreResult<Self> {
    let topic = topic.into();
    let payload = serde_json::to_value(payload).map_err(|source| CoreError::Encode {
      topic: topic.clone(),
      source,
    })?;
    Ok(Self {
      id: Uuid::new_v4(),
      topic,
      key: key.into(),
      schema_version,
      occurred_at: Utc::now(),
      payload,
    })
  }

  pub fn decode<T: DeserializeOwned>(&self) -> CoreResult<T> {
    serde_json::from_value(self.payload.clone()).map_err(|source| CoreError::Decode {
      envelope_id: self.id,
      topic: self.topic.clone(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[derive(Debug, Serialize, Deserialize, PartialEq)]
  #[serde(rename_all = "camelCase")]
  struct Paid {
    order_id: String,
    amount: i64,
  }

  #[test]
  fn envelope_wire_format_is_camel_case() {
    let env = Envelope::encode("payment.succeeded", "o-1", 1, &Paid {
      order_id: "o-1".into(),
      amount: 500,
    })
    .unwrap();
    let wire = serde_json::to_value(&env).unwrap();
    assert_eq!(wire["schemaVersion"], json!(1));
    assert_eq!(wire["payload"]["orderId"], json!("o-1"));
    assert!(wire.get("occurredAt").is_some());
  }

  #[test]
  fn decode_reports_topic_and_id_on_shape_mismatch() {
    let mut env = Envelope::encode("payment.succeeded", "o-1", 1, &json!({"orderId": "o-1"})).unwrap();
    env.payload = json!({"orderId": 7});
    let err = env.decode::<Paid>().unwrap_err();
    match err {
      CoreError::Decode { envelope_id, topic, .. } => {
        assert_eq!(envelope_id, env.id);
        assert_eq!(topic, "payment.succeeded");
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}
