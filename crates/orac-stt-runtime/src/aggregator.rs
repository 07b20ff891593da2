//! Heartbeat aggregation and per-Core fan-out.
//!
//! Edge producers post one batched heartbeat per instance; the aggregator
//! keeps exactly one record per instance id (latest wins), lazily registers
//! every named topic, and every few seconds fans the active topics out to the
//! Core endpoint each topic routes to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orac_stt_core::heartbeat::{
    CoreHeartbeatRequest, HeartbeatRequest, HeartbeatResponse, ModelHeartbeat, TopicHeartbeat,
    FORWARD_SOURCE, UPSTREAM_SOURCE,
};
use orac_stt_core::topics::TopicMetadata;
use orac_stt_core::TopicRegistry;

use crate::core_client::CoreResolver;

/// Aggregator policy.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Instance records older than this are purged (producers idle-beat at
    /// 60 s, so double that).
    pub ttl: Duration,
    /// Minimum spacing between forward cycles.
    pub forward_interval: Duration,
    /// This service's identifier on forwarded batches.
    pub instance_id: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            forward_interval: Duration::from_secs(5),
            instance_id: "orac_stt_001".to_string(),
        }
    }
}

struct InstanceRecord {
    source: String,
    timestamp: DateTime<Utc>,
    models: Vec<ModelHeartbeat>,
    received_at: DateTime<Utc>,
}

/// Snapshot of one tracked instance for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub source: String,
    pub age_seconds: f64,
    pub is_stale: bool,
    pub active_models: usize,
    pub inactive_models: usize,
    pub last_heartbeat: DateTime<Utc>,
}

/// Aggregator status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorStatus {
    pub instance_count: usize,
    pub instances: Vec<InstanceStatus>,
    pub total_active_topics: usize,
    pub total_inactive_topics: usize,
    pub registered_topics: usize,
}

pub struct HeartbeatAggregator {
    config: AggregatorConfig,
    records: StdMutex<HashMap<String, InstanceRecord>>,
    last_forward: StdMutex<Option<DateTime<Utc>>>,
    /// At most one forward cycle in flight.
    forward_gate: Mutex<()>,
    registry: Arc<TopicRegistry>,
    core: Arc<dyn CoreResolver>,
    cancel: CancellationToken,
}

impl HeartbeatAggregator {
    pub fn new(
        config: AggregatorConfig,
        registry: Arc<TopicRegistry>,
        core: Arc<dyn CoreResolver>,
    ) -> Self {
        Self {
            config,
            records: StdMutex::new(HashMap::new()),
            last_forward: StdMutex::new(None),
            forward_gate: Mutex::new(()),
            registry,
            core,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle one inbound heartbeat: upsert the instance record, register
    /// its topics, and kick a forward cycle when the batching window allows.
    pub async fn process(&self, request: HeartbeatRequest) -> HeartbeatResponse {
        let active = request
            .models
            .iter()
            .filter(|m| m.status.is_active())
            .count();

        info!(
            instance = %request.instance_id,
            active,
            total = request.models.len(),
            "heartbeat received"
        );

        for model in &request.models {
            let mut metadata = TopicMetadata::new();
            metadata.insert("wake_word".into(), serde_json::json!(model.wake_word));
            metadata.insert("trigger_count".into(), serde_json::json!(model.trigger_count));
            metadata.insert(
                "last_triggered".into(),
                serde_json::json!(model.last_triggered.map(|t| t.to_rfc3339())),
            );
            metadata.insert("status".into(), serde_json::json!(model.status));
            self.registry.auto_register(&model.topic, Some(metadata));
        }

        {
            let mut records = self.records.lock().unwrap();
            records.insert(
                request.instance_id.clone(),
                InstanceRecord {
                    source: request.source.clone(),
                    timestamp: request.timestamp,
                    models: request.models.clone(),
                    received_at: Utc::now(),
                },
            );
        }

        if active > 0 && self.should_forward() {
            self.forward_cycle().await;
        }

        HeartbeatResponse::ok(format!("Processed {active} active models"), active)
    }

    /// Fan active topics out to their Core endpoints.
    ///
    /// Serialized by the forward gate; the last-forward timestamp moves only
    /// after every group was attempted, whether or not any delivery failed.
    pub async fn forward_cycle(&self) {
        let _gate = self.forward_gate.lock().await;
        let now = Utc::now();

        let (topics, names) = {
            let mut records = self.records.lock().unwrap();
            self.prune_locked(&mut records, now);

            let mut topics = Vec::new();
            let mut names = Vec::new();
            for record in records.values() {
                for model in &record.models {
                    if model.status.is_active() {
                        topics.push(TopicHeartbeat {
                            name: model.topic.clone(),
                            status: model.status,
                            last_triggered: model.last_triggered,
                            trigger_count: model.trigger_count,
                            wake_word: model.wake_word.clone(),
                        });
                        names.push(model.topic.clone());
                    }
                }
            }
            (topics, names)
        };

        if topics.is_empty() {
            debug!("no active topics to forward");
            return;
        }

        let grouped = self.registry.group_by_core_url(&names);
        for (core_url, group) in grouped {
            let batch: Vec<TopicHeartbeat> = topics
                .iter()
                .filter(|t| group.contains(&t.name))
                .cloned()
                .collect();
            if batch.is_empty() {
                continue;
            }

            let sink = self.core.resolve(core_url.as_deref());
            let request = CoreHeartbeatRequest {
                source: FORWARD_SOURCE.to_string(),
                upstream_source: UPSTREAM_SOURCE.to_string(),
                instance_id: self.config.instance_id.clone(),
                timestamp: Utc::now(),
                topics: batch,
            };

            let core_desc = core_url.as_deref().unwrap_or("default");
            match sink.forward_heartbeat(&request).await {
                Ok(()) => {
                    info!(topics = request.topics.len(), core = core_desc, "heartbeat batch forwarded");
                }
                Err(e) => {
                    // Per-group failures do not abort the cycle.
                    warn!(core = core_desc, error = %e, "heartbeat batch delivery failed");
                }
            }
        }

        *self.last_forward.lock().unwrap() = Some(Utc::now());
    }

    /// Purge instance records older than the TTL. Returns how many went.
    pub fn cleanup_stale(&self) -> usize {
        let mut records = self.records.lock().unwrap();
        self.prune_locked(&mut records, Utc::now())
    }

    /// Periodic sweep so records expire even when no heartbeats arrive.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = aggregator.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = aggregator.cleanup_stale();
                        if removed > 0 {
                            debug!(removed, "stale heartbeat sweep");
                        }
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> AggregatorStatus {
        let now = Utc::now();
        let ttl_secs = self.config.ttl.as_secs_f64();
        let records = self.records.lock().unwrap();

        let mut instances = Vec::with_capacity(records.len());
        let mut total_active = 0;
        let mut total_inactive = 0;
        for (instance_id, record) in records.iter() {
            let age = (now - record.received_at).num_milliseconds() as f64 / 1000.0;
            let active = record.models.iter().filter(|m| m.status.is_active()).count();
            let inactive = record.models.len() - active;
            total_active += active;
            total_inactive += inactive;
            instances.push(InstanceStatus {
                instance_id: instance_id.clone(),
                source: record.source.clone(),
                age_seconds: age,
                is_stale: age > ttl_secs,
                active_models: active,
                inactive_models: inactive,
                last_heartbeat: record.timestamp,
            });
        }
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));

        AggregatorStatus {
            instance_count: records.len(),
            instances,
            total_active_topics: total_active,
            total_inactive_topics: total_inactive,
            registered_topics: self.registry.len(),
        }
    }

    fn should_forward(&self) -> bool {
        let last = self.last_forward.lock().unwrap();
        match *last {
            None => true,
            Some(t) => {
                Utc::now().signed_duration_since(t).num_milliseconds()
                    >= self.config.forward_interval.as_millis() as i64
            }
        }
    }

    fn prune_locked(
        &self,
        records: &mut HashMap<String, InstanceRecord>,
        now: DateTime<Utc>,
    ) -> usize {
        let ttl_secs = self.config.ttl.as_secs_f64();
        let stale: Vec<String> = records
            .iter()
            .filter(|(_, r)| (now - r.received_at).num_milliseconds() as f64 / 1000.0 > ttl_secs)
            .map(|(id, _)| id.clone())
            .collect();
        for instance_id in &stale {
            records.remove(instance_id);
            info!(instance = %instance_id, "removed stale heartbeat record");
        }
        stale.len()
    }
}
