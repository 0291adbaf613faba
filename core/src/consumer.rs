// core/src/consumer.rs

//! Consumer groups: route bus deliveries to per-topic handlers and decide
//! whether each message is committed, retried or dead-lettered.

use crate::bus::{Delivery, EventBus};
use crate::error::{CoreError, FailureKind};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn, Instrument};

pub type TopicHandler<Err> =
  Box<dyn Fn(Delivery) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
  pub poll_interval: Duration,
  pub batch_size: usize,
  /// Deliveries after which a transiently failing message is dead-lettered.
  pub max_deliveries: u32,
  pub retry_backoff: Duration,
}

impl Default for ConsumerSettings {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(200),
      batch_size: 32,
      max_deliveries: 8,
      retry_backoff: Duration::from_millis(100),
    }
  }
}

/// Counters for one `process_available` round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
  pub fetched: usize,
  pub handled: usize,
  pub retried: usize,
  pub dead_lettered: usize,
}

/// A named consumer group subscribed to one or more topics.
///
/// Handlers must be idempotent: a message is only committed after its handler
/// returns `Ok`, so a crash in between means the handler sees it again.
pub struct Consumer<Err>
where
  Err: std::error::Error + FailureKind + Send + Sync + 'static,
{
  group: String,
  bus: Arc<dyn EventBus>,
  handlers: HashMap<String, TopicHandler<Err>>,
  settings: ConsumerSettings,
}

impl<Err> Consumer<Err>
where
  Err: std::error::Error + FailureKind + Send + Sync + 'static,
{
  pub fn new(group: impl Into<String>, bus: Arc<dyn EventBus>, settings: ConsumerSettings) -> Self {
    Self {
      group: group.into(),
      bus,
      handlers: HashMap::new(),
      settings,
    }
  }

  pub fn group(&self) -> &str {
    &self.group
  }

  pub fn topics(&self) -> Vec<String> {
    let mut topics: Vec<String> = self.handlers.keys().cloned().collect();
    topics.sort();
    topics
  }

  /// Subscribes `handler` to `topic`. A later registration for the same topic replaces the earlier one.
  pub fn on_topic<F>(&mut self, topic: &str, handler: impl Fn(Delivery) -> F + Send + Sync + 'static) -> &mut Self
  where
    F: Future<Output = Result<(), Err>> + Send + 'static,
  {
    let boxed: TopicHandler<Err> = Box::new(move |delivery| Box::pin(handler(delivery)));
    self.handlers.insert(topic.to_string(), boxed);
    self
  }

  /// Fetches whatever is available and handles it once.
  #[instrument(name = "consumer::round", skip(self), fields(group = %self.group))]
  pub async fn process_available(&self) -> Result<RoundReport, CoreError> {
    let topics = self.topics();
    let deliveries = self.bus.fetch(&self.group, &topics, self.settings.batch_size).await?;
    let mut report = RoundReport {
      fetched: deliveries.len(),
      ..RoundReport::default()
    };

    for delivery in deliveries {
      let topic = delivery.position.topic.clone();
      let Some(handler) = self.handlers.get(&topic) else {
        let reason = CoreError::NoRoute {
          group: self.group.clone(),
          topic,
        }
        .to_string();
        self.bus.dead_letter(&self.group, &delivery, &reason).await?;
        self.bus.commit(&self.group, &delivery.position).await?;
        report.dead_lettered += 1;
        continue;
      };

      let span = tracing::info_span!(
        "consume",
        topic = %topic,
        envelope_id = %delivery.envelope.id,
        attempt = delivery.attempt
      );
      let position = delivery.position.clone();
      let attempt = delivery.attempt;
      let outcome = handler(delivery.clone()).instrument(span).await;

      match outcome {
        Ok(()) => {
          self.bus.commit(&self.group, &position).await?;
          report.handled += 1;
        }
        Err(e) if e.is_transient() && attempt < self.settings.max_deliveries => {
          warn!(topic = %topic, attempt, error = %e, "Handler failed, message will be redelivered.");
          report.retried += 1;
        }
        Err(e) => {
          error!(topic = %topic, attempt, error = %e, "Handler failed permanently.");
          self.bus.dead_letter(&self.group, &delivery, &e.to_string()).await?;
          self.bus.commit(&self.group, &position).await?;
          report.dead_lettered += 1;
        }
      }
    }

    if report.fetched > 0 {
      debug!(?report, "Consumer round finished.");
    }
    Ok(report)
  }

  /// Polls until `shutdown` flips to `true`.
  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    info!(group = %self.group, topics = ?self.topics(), "Consumer started.");
    loop {
      if *shutdown.borrow() {
        break;
      }
      let pause = match self.process_available().await {
        Ok(report) if report.retried > 0 => Some(self.settings.retry_backoff),
        Ok(report) if report.fetched > 0 => None,
        Ok(_) => Some(self.settings.poll_interval),
        Err(e) => {
          error!(group = %self.group, error = %e, "Consumer round failed.");
          Some(self.settings.poll_interval)
        }
      };
      if let Some(pause) = pause {
        tokio::select! {
          _ = self.bus.wait_for_messages(pause) => {}
          _ = shutdown.changed() => {}
        }
      }
    }
    info!(group = %self.group, "Consumer stopped.");
  }
}
