//! Boundary to the pub/sub transport.
//!
//! The engine only needs to publish values for an entity id and to be told about
//! inbound commands; [`Bus`] is that contract. The MQTT integration implements it for
//! real deployments, [`LogBus`] stands in when there is no broker and [`MemoryBus`]
//! keeps everything in-process for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use super::entity::EntityKind;
use super::entity::Publish;
use super::value::SensorValue;

/// Device an entity is grouped under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub id: String,
    pub name: String,
}

/// Descriptive metadata announced for an entity before it publishes anything
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub id: String,
    pub name: String,
    pub device: DeviceRef,
    pub icon: Option<String>,
    pub device_class: Option<String>,
    pub unit_of_measurement: Option<String>,
}

/// Receives inbound command payloads for one entity.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle_command(&self, payload: &str);
}

pub trait Bus: Send + Sync {
    /// Make an entity known to subscribers. Called once, before any publish.
    fn announce(&self, _kind: EntityKind, _info: &EntityInfo) {}

    /// Hand a new value for `entity_id` to the transport. Must not block for long.
    fn publish(&self, entity_id: &str, value: SensorValue);

    /// Route inbound commands for `entity_id` to `handler`.
    fn on_command(&self, entity_id: &str, handler: Arc<dyn CommandHandler>);
}

/// Publish function bound to a single entity id
pub fn publisher(bus: Arc<dyn Bus>, entity_id: &str) -> Publish {
    let entity_id = entity_id.to_string();
    Arc::new(move |value| bus.publish(&entity_id, value))
}

/// Bus for running without a broker: values are logged and commands never arrive.
pub struct LogBus;

impl Bus for LogBus {
    fn publish(&self, entity_id: &str, value: SensorValue) {
        info!("[{}] {}", entity_id, value);
    }

    fn on_command(&self, entity_id: &str, _handler: Arc<dyn CommandHandler>) {
        warn!("[{}] No broker configured, commands cannot be received", entity_id);
    }
}

/// In-process bus: logs and records every publish, commands are injected by hand.
#[derive(Default)]
pub struct MemoryBus {
    announced: Mutex<Vec<(EntityKind, EntityInfo)>>,
    published: Mutex<Vec<(String, SensorValue)>>,
    handlers: Mutex<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn announced(&self) -> Vec<(EntityKind, EntityInfo)> {
        self.announced
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Every publish so far, in order
    pub fn published(&self) -> Vec<(String, SensorValue)> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Values published for one entity, in order
    pub fn published_for(&self, entity_id: &str) -> Vec<SensorValue> {
        self.published()
            .into_iter()
            .filter(|(id, _)| id == entity_id)
            .map(|(_, value)| value)
            .collect()
    }

    pub fn has_handler(&self, entity_id: &str) -> bool {
        self.handlers
            .lock()
            .map(|h| h.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Deliver a command payload as the transport would. Returns false if nothing is
    /// registered for `entity_id`.
    pub async fn send_command(&self, entity_id: &str, payload: &str) -> bool {
        let handler = self
            .handlers
            .lock()
            .ok()
            .and_then(|h| h.get(entity_id).cloned());

        match handler {
            Some(handler) => {
                handler.handle_command(payload).await;
                true
            }
            None => {
                warn!("No command handler for {}", entity_id);
                false
            }
        }
    }
}

impl Bus for MemoryBus {
    fn announce(&self, kind: EntityKind, info: &EntityInfo) {
        info!("Announced {} {} ({})", kind, info.id, info.name);
        if let Ok(mut announced) = self.announced.lock() {
            announced.push((kind, info.clone()));
        }
    }

    fn publish(&self, entity_id: &str, value: SensorValue) {
        info!("{} -> {}", entity_id, value);
        if let Ok(mut published) = self.published.lock() {
            published.push((entity_id.to_string(), value));
        }
    }

    fn on_command(&self, entity_id: &str, handler: Arc<dyn CommandHandler>) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(entity_id.to_string(), handler);
        }
    }
}
