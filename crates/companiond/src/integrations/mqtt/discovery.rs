//! Home Assistant MQTT discovery payloads and topic layout.

use serde::Serialize;

use crate::engine::EntityInfo;
use crate::engine::EntityKind;
use crate::engine::SensorValue;

pub const PAYLOAD_ON: &str = "ON";
pub const PAYLOAD_OFF: &str = "OFF";

/// Discovery message announcing one entity
///
/// Serialized as the retained JSON payload on the entity's discovery topic.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryMessage {
    /// Human-readable name of the entity
    pub name: String,

    /// Unique identifier for this entity
    pub unique_id: String,

    /// Topic the entity's state is published on
    pub state_topic: String,

    /// Topic commands are received on (switches and buttons)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,

    /// Device information
    pub device: DeviceInfo,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    /// Device class (e.g., "temperature", "connectivity")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,
}

/// Device information shared by every entity on a device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// List of identifiers for this device
    pub identifiers: Vec<String>,

    /// Device name
    pub name: String,
}

/// Topic layout for one set of prefixes
#[derive(Debug, Clone)]
pub struct Topics {
    pub discovery_prefix: String,
    pub state_prefix: String,
}

impl Topics {
    /// `{discovery_prefix}/{component}/{object_id}/config`
    pub fn discovery(&self, kind: EntityKind, entity_id: &str) -> String {
        format!(
            "{}/{}/{}/config",
            self.discovery_prefix,
            kind,
            object_id(entity_id)
        )
    }

    /// `{state_prefix}/{component}/{object_id}/state`
    pub fn state(&self, kind: EntityKind, entity_id: &str) -> String {
        format!("{}/{}/{}/state", self.state_prefix, kind, object_id(entity_id))
    }

    /// `{state_prefix}/{component}/{object_id}/command`
    pub fn command(&self, kind: EntityKind, entity_id: &str) -> String {
        format!(
            "{}/{}/{}/command",
            self.state_prefix,
            kind,
            object_id(entity_id)
        )
    }

    pub fn discovery_message(&self, kind: EntityKind, info: &EntityInfo) -> DiscoveryMessage {
        let accepts_commands = matches!(kind, EntityKind::Switch | EntityKind::Button);
        let on_off = matches!(kind, EntityKind::BinarySensor | EntityKind::Switch);

        DiscoveryMessage {
            name: info.name.clone(),
            unique_id: object_id(&info.id),
            state_topic: self.state(kind, &info.id),
            command_topic: accepts_commands.then(|| self.command(kind, &info.id)),
            device: DeviceInfo {
                identifiers: vec![object_id(&info.device.id)],
                name: info.device.name.clone(),
            },
            icon: info.icon.clone(),
            unit_of_measurement: info.unit_of_measurement.clone(),
            device_class: info.device_class.clone(),
            payload_on: on_off.then(|| PAYLOAD_ON.to_string()),
            payload_off: on_off.then(|| PAYLOAD_OFF.to_string()),
        }
    }
}

/// Topic-safe form of an entity id: anything outside `[A-Za-z0-9_-]` becomes `_`
pub fn object_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// State payload for a value published by an entity of `kind`
pub fn render_value(kind: EntityKind, value: &SensorValue) -> String {
    match (kind, value) {
        (EntityKind::BinarySensor | EntityKind::Switch, SensorValue::Bool(true)) => {
            PAYLOAD_ON.to_string()
        }
        (EntityKind::BinarySensor | EntityKind::Switch, SensorValue::Bool(false)) => {
            PAYLOAD_OFF.to_string()
        }
        (_, value) => value.to_string(),
    }
}
