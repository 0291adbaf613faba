// core/src/outbox/record.rs
use crate::bus::Envelope;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
  Pending,
  InFlight,
  Published,
  /// Gave up after too many attempts; needs an operator.
  Failed,
}

impl OutboxStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OutboxStatus::Pending => "pending",
      OutboxStatus::InFlight => "in_flight",
      OutboxStatus::Published => "published",
      OutboxStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for OutboxStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OutboxStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(OutboxStatus::Pending),
      "in_flight" => Ok(OutboxStatus::InFlight),
      "published" => Ok(OutboxStatus::Published),
      "failed" => Ok(OutboxStatus::Failed),
      other => Err(format!("unknown outbox status '{other}'")),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
  pub id: Uuid,
  pub envelope: Envelope,
  pub status: OutboxStatus,
  pub attempts: u32,
  pub created_at: DateTime<Utc>,
  pub locked_by: Option<String>,
  pub locked_until: Option<DateTime<Utc>>,
  pub published_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

impl OutboxRecord {
  pub fn new(envelope: Envelope) -> Self {
    Self {
      id: envelope.id,
      created_at: envelope.occurred_at,
      envelope,
      status: OutboxStatus::Pending,
      attempts: 0,
      locked_by: None,
      locked_until: None,
      published_at: None,
      last_error: None,
    }
  }

  /// Pending records, and in-flight records whose lease ran out, can be claimed.
  pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
    match self.status {
      OutboxStatus::Pending => true,
      OutboxStatus::InFlight => self.locked_until.map_or(true, |until| until <= now),
      OutboxStatus::Published | OutboxStatus::Failed => false,
    }
  }

  pub fn claim(&mut self, worker: &str, lease: Duration, now: DateTime<Utc>) {
    self.status = OutboxStatus::InFlight;
    self.attempts += 1;
    self.locked_by = Some(worker.to_string());
    self.locked_until = Some(now + lease);
  }

  pub fn complete(&mut self, now: DateTime<Utc>) {
    self.status = OutboxStatus::Published;
    self.published_at = Some(now);
    self.locked_by = None;
    self.locked_until = None;
    self.last_error = None;
  }

  /// Returns the record to `Pending` so a later drain retries it.
  pub fn release(&mut self, error: &str) {
    self.status = OutboxStatus::Pending;
    self.locked_by = None;
    self.locked_until = None;
    self.last_error = Some(error.to_string());
  }

  pub fn fail(&mut self, error: &str) {
    self.status = OutboxStatus::Failed;
    self.locked_by = None;
    self.locked_until = None;
    self.last_error = Some(error.to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn record() -> OutboxRecord {
    OutboxRecord::new(Envelope::encode("order.created", "o-1", 1, &json!({})).unwrap())
  }

  #[test]
  fn expired_lease_makes_in_flight_record_claimable_again() {
    let now = Utc::now();
    let mut r = record();
    r.claim("relay-a", Duration::seconds(30), now);
    assert!(!r.is_claimable(now + Duration::seconds(10)));
    assert!(r.is_claimable(now + Duration::seconds(31)));
    assert_eq!(r.attempts, 1);
  }

  #[test]
  fn published_records_are_never_claimable() {
    let now = Utc::now();
    let mut r = record();
    r.claim("relay-a", Duration::seconds(30), now);
    r.complete(now);
    assert!(!r.is_claimable(now + Duration::days(1)));
    assert_eq!("in_flight".parse::<OutboxStatus>().unwrap(), OutboxStatus::InFlight);
  }
}
