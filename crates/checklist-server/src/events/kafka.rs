//! Kafka event bus on top of `rskafka`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::bus::{Event, EventBus, EventBusError};
use super::murmur2::partition_for_key;
use crate::config::KafkaSettings;

/// Upper bound on broker bootstrap and topic discovery.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes events to one topic, partitioned by Kafka's murmur2 of the key.
pub struct KafkaEventBus {
    topic: String,
    /// One client per partition, indexed by partition id. `None` once closed.
    partitions: RwLock<Option<Arc<Vec<PartitionClient>>>>,
}

impl KafkaEventBus {
    /// Connects to the broker in `settings` and discovers the topic partitions.
    pub async fn connect(settings: &KafkaSettings) -> Result<Self, EventBusError> {
        Self::connect_with_timeout(&settings.broker(), &settings.topic, DEFAULT_CONNECT_TIMEOUT)
            .await
    }

    #[instrument(skip(timeout))]
    pub async fn connect_with_timeout(
        broker: &str,
        topic: &str,
        timeout: Duration,
    ) -> Result<Self, EventBusError> {
        let partitions = tokio::time::timeout(timeout, Self::discover(broker, topic))
            .await
            .map_err(|_| EventBusError::Connection {
                message: format!("timed out after {timeout:?} connecting to {broker}"),
            })??;

        info!(broker, topic, partitions = partitions.len(), "Connected to Kafka");

        Ok(Self {
            topic: topic.to_string(),
            partitions: RwLock::new(Some(Arc::new(partitions))),
        })
    }

    async fn discover(broker: &str, topic: &str) -> Result<Vec<PartitionClient>, EventBusError> {
        let client = ClientBuilder::new(vec![broker.to_string()])
            .build()
            .await
            .map_err(connection_error)?;

        let ids: BTreeSet<i32> = client
            .list_topics()
            .await
            .map_err(connection_error)?
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions)
            .ok_or_else(|| EventBusError::Connection {
                message: format!("topic '{topic}' does not exist"),
            })?;

        if ids.is_empty() {
            return Err(EventBusError::Connection {
                message: format!("topic '{topic}' has no partitions"),
            });
        }

        let mut partitions = Vec::with_capacity(ids.len());
        for id in ids {
            let partition = client
                .partition_client(topic, id, UnknownTopicHandling::Retry)
                .await
                .map_err(connection_error)?;
            partitions.push(partition);
        }
        Ok(partitions)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn send(&self, events: Vec<Event>) -> Result<(), EventBusError> {
        if events.is_empty() {
            return Ok(());
        }

        let partitions = self
            .partitions
            .read()
            .await
            .clone()
            .ok_or(EventBusError::Closed)?;

        let count = events.len();
        for (partition, batch) in assign_partitions(&events, partitions.len()) {
            let records: Vec<Record> = batch.into_iter().map(to_record).collect();
            partitions[partition]
                .produce(records, Compression::NoCompression)
                .await
                .map_err(|err| EventBusError::Publish {
                    count,
                    message: err.to_string(),
                })?;
        }

        debug!(topic = %self.topic, count, "Published events");
        Ok(())
    }

    async fn close(&self) -> Result<(), EventBusError> {
        if self.partitions.write().await.take().is_some() {
            info!(topic = %self.topic, "Kafka event bus closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for KafkaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaEventBus")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Groups events by target partition, keeping their relative order.
fn assign_partitions(events: &[Event], partitions: usize) -> BTreeMap<usize, Vec<&Event>> {
    let mut grouped: BTreeMap<usize, Vec<&Event>> = BTreeMap::new();
    for event in events {
        grouped
            .entry(partition_for_key(&event.key(), partitions))
            .or_default()
            .push(event);
    }
    grouped
}

fn to_record(event: &Event) -> Record {
    Record {
        key: Some(event.key()),
        value: Some(event.encode_value()),
        headers: BTreeMap::new(),
        timestamp: Utc::now(),
    }
}

fn connection_error(err: rskafka::client::error::Error) -> EventBusError {
    EventBusError::Connection {
        message: err.to_string(),
    }
}
