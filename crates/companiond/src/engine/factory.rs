//! Builds entities from declarative records and wires them to the bus.

use std::collections::HashMap;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use tracing::error;
use tracing::info;

use super::bus::publisher;
use super::bus::Bus;
use super::bus::DeviceRef;
use super::bus::EntityInfo;
use super::button::Button;
use super::entity::BinarySensor;
use super::entity::CommandSensor;
use super::entity::Entity;
use super::entity::EntityKind;
use super::entity::Sensor;
use super::entity::Sink;
use super::error::ConstructionError;
use super::parser::ParserChain;
use super::poller::PollSpec;
use super::poller::Poller;
use super::record::EntityRecord;
use super::record::PollRecord;
use super::record::COMMAND_SOURCE;
use super::registry::EntityRegistry;
use super::switch::Switch;

/// Devices entities can be grouped under
#[derive(Debug, Clone)]
pub struct Devices {
    /// Used by records that do not name a device
    pub default: DeviceRef,
    pub additional: HashMap<String, DeviceRef>,
}

impl Devices {
    pub fn new(default: DeviceRef) -> Self {
        Self {
            default,
            additional: HashMap::new(),
        }
    }

    fn resolve(&self, record: &EntityRecord) -> Result<DeviceRef, ConstructionError> {
        match &record.device {
            None => Ok(self.default.clone()),
            Some(key) => {
                self.additional
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ConstructionError::UnknownDevice {
                        entity: record.id().to_string(),
                        device: key.clone(),
                    })
            }
        }
    }
}

pub struct EntityFactory {
    bus: Arc<dyn Bus>,
    devices: Devices,
}

impl EntityFactory {
    pub fn new(bus: Arc<dyn Bus>, devices: Devices) -> Self {
        Self { bus, devices }
    }

    /// Create an entity of the kind named by `kind` (e.g. `"binary_sensor"`).
    pub fn create(
        &self,
        kind: &str,
        record: &EntityRecord,
    ) -> Result<Arc<dyn Entity>, ConstructionError> {
        let kind = EntityKind::from_str(kind)
            .map_err(|_| ConstructionError::UnknownKind(kind.to_string()))?;
        self.create_kind(kind, record)
    }

    /// Create an entity and start whatever drives it.
    ///
    /// Everything is validated before the bus hears about the entity, so a failed
    /// record leaves nothing behind.
    pub fn create_kind(
        &self,
        kind: EntityKind,
        record: &EntityRecord,
    ) -> Result<Arc<dyn Entity>, ConstructionError> {
        let entity: Arc<dyn Entity> = match kind {
            EntityKind::Sensor | EntityKind::BinarySensor => {
                let (spec, chain) = poll_setup(record.id(), &record.poll)?;
                let info = self.entity_info(record)?;
                self.bus.announce(kind, &info);

                let sensor = Sensor::new(publisher(self.bus.clone(), &info.id));
                let sink: Arc<dyn Sink> = if kind == EntityKind::BinarySensor {
                    Arc::new(BinarySensor::new(sensor))
                } else {
                    Arc::new(sensor)
                };

                let poller = Poller::start(info.id.clone(), spec, chain, sink);
                Arc::new(CommandSensor::new(info.id, kind, poller))
            }
            EntityKind::Switch => {
                let command_on = required(record, record.command_on.as_ref(), "command_on")?;
                let command_off = required(record, record.command_off.as_ref(), "command_off")?;
                let state_poll = record
                    .binary_sensor
                    .as_ref()
                    .map(|poll| poll_setup(record.id(), poll))
                    .transpose()?;
                let info = self.entity_info(record)?;
                self.bus.announce(kind, &info);

                let sensor: Arc<dyn Sink> = Arc::new(BinarySensor::new(Sensor::new(publisher(
                    self.bus.clone(),
                    &info.id,
                ))));
                let mut switch = Switch::new(
                    info.id.clone(),
                    command_on,
                    command_off,
                    record.shell(),
                    Some(sensor.clone()),
                );
                if let Some((spec, chain)) = state_poll {
                    let poller = Poller::start(format!("{}_state", info.id), spec, chain, sensor);
                    switch = switch.with_poller(poller);
                }

                let switch = Arc::new(switch);
                self.bus.on_command(&info.id, switch.clone());
                switch
            }
            EntityKind::Button => {
                let command = required(record, record.poll.command.as_ref(), "command")?;
                let info = self.entity_info(record)?;
                self.bus.announce(kind, &info);

                let button = Arc::new(Button::new(info.id.clone(), command, record.shell()));
                self.bus.on_command(&info.id, button.clone());
                button
            }
        };

        info!("Created {} {}", kind, entity.id());
        Ok(entity)
    }

    /// Create every record, skipping (and reporting) the ones that fail.
    pub fn create_all<'a>(
        &self,
        records: impl IntoIterator<Item = (EntityKind, &'a EntityRecord)>,
    ) -> (EntityRegistry, Vec<ConstructionError>) {
        let mut registry = EntityRegistry::new();
        let mut failures = Vec::new();
        let mut seen = HashSet::new();

        for (kind, record) in records {
            if seen.contains(record.id()) {
                let e = ConstructionError::DuplicateId(record.id().to_string());
                error!("Skipping {} {}: {}", kind, record.id(), e);
                failures.push(e);
                continue;
            }

            // Only created entities claim their id
            match self.create_kind(kind, record) {
                Ok(entity) => {
                    seen.insert(record.id().to_string());
                    registry.register(entity);
                }
                Err(e) => {
                    error!("Skipping {} {}: {}", kind, record.id(), e);
                    failures.push(e);
                }
            }
        }

        (registry, failures)
    }

    fn entity_info(&self, record: &EntityRecord) -> Result<EntityInfo, ConstructionError> {
        Ok(EntityInfo {
            id: record.id().to_string(),
            name: record.name.clone(),
            device: self.devices.resolve(record)?,
            icon: record.icon.clone(),
            device_class: record.device_class.clone(),
            unit_of_measurement: record.unit_of_measurement.clone(),
        })
    }
}

/// Check a record the way [`EntityFactory::create_kind`] would, without creating it.
pub fn validate(
    kind: EntityKind,
    record: &EntityRecord,
    devices: &Devices,
) -> Result<(), ConstructionError> {
    match kind {
        EntityKind::Sensor | EntityKind::BinarySensor => {
            poll_setup(record.id(), &record.poll)?;
        }
        EntityKind::Switch => {
            required(record, record.command_on.as_ref(), "command_on")?;
            required(record, record.command_off.as_ref(), "command_off")?;
            if let Some(poll) = &record.binary_sensor {
                poll_setup(record.id(), poll)?;
            }
        }
        EntityKind::Button => {
            required(record, record.poll.command.as_ref(), "command")?;
        }
    }
    devices.resolve(record)?;
    Ok(())
}

fn required(
    record: &EntityRecord,
    value: Option<&String>,
    field: &'static str,
) -> Result<String, ConstructionError> {
    value.cloned().ok_or_else(|| ConstructionError::MissingField {
        entity: record.id().to_string(),
        field,
    })
}

/// Validate a poll record and resolve its schedule and parser chain.
pub fn poll_setup(
    entity: &str,
    poll: &PollRecord,
) -> Result<(PollSpec, ParserChain), ConstructionError> {
    if let Some(source) = &poll.source {
        if source != COMMAND_SOURCE {
            return Err(ConstructionError::UnknownSensorType {
                entity: entity.to_string(),
                source_type: source.clone(),
            });
        }
    }

    let command = poll
        .command
        .clone()
        .ok_or_else(|| ConstructionError::MissingField {
            entity: entity.to_string(),
            field: "command",
        })?;

    let interval = PollSpec::interval_for_rate(poll.polling_rate).ok_or_else(|| {
        ConstructionError::InvalidPollingRate {
            entity: entity.to_string(),
            rate: poll.polling_rate,
        }
    })?;

    let chain = ParserChain::from_specs(&poll.parse)?;
    let spec = PollSpec {
        command,
        shell: poll.shell(),
        interval,
    };

    Ok((spec, chain))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::bus::MemoryBus;
    use crate::engine::parser::ParserKind;
    use crate::engine::parser::ParserSpec;
    use crate::engine::value::SensorValue;

    fn devices() -> Devices {
        let mut devices = Devices::new(DeviceRef {
            id: "hass-companion".to_string(),
            name: "Hass Companion".to_string(),
        });
        devices.additional.insert(
            "nas".to_string(),
            DeviceRef {
                id: "nas".to_string(),
                name: "NAS".to_string(),
            },
        );
        devices
    }

    fn factory() -> (EntityFactory, Arc<MemoryBus>) {
        let bus = Arc::new(MemoryBus::new());
        (EntityFactory::new(bus.clone(), devices()), bus)
    }

    fn sensor_record(name: &str, command: &str) -> EntityRecord {
        let mut record = EntityRecord::new(name);
        record.poll.command = Some(command.to_string());
        record.poll.shell = Some("sh".into());
        record
    }

    async fn wait_for_publish(bus: &MemoryBus, id: &str) -> Vec<SensorValue> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let values = bus.published_for(id);
                if !values.is_empty() {
                    return values;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let (factory, bus) = factory();
        let err = factory
            .create("light", &sensor_record("x", "true"))
            .err()
            .unwrap();
        assert!(matches!(err, ConstructionError::UnknownKind(k) if k == "light"));
        assert!(bus.announced().is_empty());
    }

    #[tokio::test]
    async fn test_sensor_publishes_parsed_value() {
        let (factory, bus) = factory();
        let mut record = sensor_record("Answer", "echo 42");
        record.poll.parse = vec![ParserSpec::of(ParserKind::Int)];

        let entity = factory.create("sensor", &record).unwrap();
        assert_eq!(entity.kind(), EntityKind::Sensor);
        assert_eq!(wait_for_publish(&bus, "Answer").await[0], SensorValue::Int(42));

        entity.stop();
        entity.join().await;

        let (kind, info) = &bus.announced()[0];
        assert_eq!(*kind, EntityKind::Sensor);
        assert_eq!(info.device.name, "Hass Companion");
    }

    #[tokio::test]
    async fn test_binary_sensor_rejects_non_bool_chain() {
        let (factory, bus) = factory();
        let mut record = sensor_record("Flag", "echo yes");
        record.poll.polling_rate = 50.0;

        let entity = factory.create("binary_sensor", &record).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        entity.stop();
        entity.join().await;
        assert!(bus.published_for("Flag").is_empty());

        record.poll.parse = vec![ParserSpec::of(ParserKind::Bool)];
        record.id = Some("flag2".to_string());
        let entity = factory.create("binary_sensor", &record).unwrap();
        assert_eq!(wait_for_publish(&bus, "flag2").await[0], SensorValue::Bool(true));
        entity.stop();
        entity.join().await;
    }

    #[tokio::test]
    async fn test_construction_errors_leave_nothing_behind() {
        let (factory, bus) = factory();

        let mut bad_parser = sensor_record("a", "true");
        bad_parser.poll.parse = vec![ParserSpec {
            kind: "compare".to_string(),
            operator: Some("~=".to_string()),
            value: Some(SensorValue::Int(1)),
            ..Default::default()
        }];
        assert!(matches!(
            factory.create("sensor", &bad_parser).err().unwrap(),
            ConstructionError::InvalidOperator(_)
        ));

        let mut bad_rate = sensor_record("b", "true");
        bad_rate.poll.polling_rate = 0.0;
        assert!(matches!(
            factory.create("sensor", &bad_rate).err().unwrap(),
            ConstructionError::InvalidPollingRate { .. }
        ));

        // An interval too long for a Duration is rejected, not a panic
        bad_rate.poll.polling_rate = 1e-30;
        assert!(matches!(
            factory.create("sensor", &bad_rate).err().unwrap(),
            ConstructionError::InvalidPollingRate { .. }
        ));
        assert!(matches!(
            validate(EntityKind::Sensor, &bad_rate, &devices()),
            Err(ConstructionError::InvalidPollingRate { .. })
        ));

        let no_command = EntityRecord::new("c");
        assert!(matches!(
            factory.create("sensor", &no_command).err().unwrap(),
            ConstructionError::MissingField { field: "command", .. }
        ));

        let mut bad_device = sensor_record("d", "true");
        bad_device.device = Some("garage".to_string());
        assert!(matches!(
            factory.create("sensor", &bad_device).err().unwrap(),
            ConstructionError::UnknownDevice { .. }
        ));

        let mut bad_type = sensor_record("e", "true");
        bad_type.poll.source = Some("http".to_string());
        assert!(matches!(
            factory.create("sensor", &bad_type).err().unwrap(),
            ConstructionError::UnknownSensorType { .. }
        ));

        let mut switch = EntityRecord::new("f");
        switch.command_on = Some("true".to_string());
        assert!(matches!(
            factory.create("switch", &switch).err().unwrap(),
            ConstructionError::MissingField { field: "command_off", .. }
        ));

        assert!(bus.announced().is_empty());
    }

    #[tokio::test]
    async fn test_switch_registers_command_handler() {
        let (factory, bus) = factory();
        let mut record = EntityRecord::new("Lamp");
        record.id = Some("lamp".to_string());
        record.device = Some("nas".to_string());
        record.command_on = Some("true".to_string());
        record.command_off = Some("true".to_string());
        record.poll.shell = Some("sh".into());

        let entity = factory.create("switch", &record).unwrap();
        assert!(bus.has_handler("lamp"));
        assert_eq!(bus.announced()[0].1.device.id, "nas");

        bus.send_command("lamp", "ON").await;
        bus.send_command("lamp", "OFF").await;
        assert_eq!(
            bus.published_for("lamp"),
            vec![SensorValue::Bool(true), SensorValue::Bool(false)]
        );

        entity.stop();
        entity.join().await;
    }

    #[tokio::test]
    async fn test_switch_state_poller_publishes_through_same_sensor() {
        let (factory, bus) = factory();
        let mut record = EntityRecord::new("Service");
        record.command_on = Some("true".to_string());
        record.command_off = Some("true".to_string());
        record.poll.shell = Some("sh".into());
        record.binary_sensor = Some(PollRecord {
            command: Some("echo active".to_string()),
            shell: Some("sh".into()),
            parse: vec![ParserSpec {
                kind: "compare".to_string(),
                operator: Some("==".to_string()),
                value: Some(SensorValue::from("active")),
                ..Default::default()
            }],
            ..Default::default()
        });

        let entity = factory.create("switch", &record).unwrap();
        assert_eq!(
            wait_for_publish(&bus, "Service").await[0],
            SensorValue::Bool(true)
        );
        entity.stop();
        entity.join().await;
    }

    #[tokio::test]
    async fn test_button_registers_command_handler() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pressed");
        let (factory, bus) = factory();
        let record = sensor_record("Reboot", &format!("touch '{}'", marker.display()));

        let entity = factory.create("button", &record).unwrap();
        assert_eq!(entity.kind(), EntityKind::Button);
        assert!(bus.send_command("Reboot", "PRESS").await);
        assert!(marker.exists());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_create_all_skips_failures() {
        let (factory, _bus) = factory();
        let good = sensor_record("good", "true");
        let duplicate = sensor_record("good", "true");
        let bad = EntityRecord::new("bad");

        let (registry, failures) = factory.create_all([
            (EntityKind::Sensor, &good),
            (EntityKind::Sensor, &duplicate),
            (EntityKind::Button, &bad),
        ]);

        assert_eq!(registry.len(), 1);
        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0], ConstructionError::DuplicateId(_)));
        registry.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_create_all_failed_record_does_not_claim_id() {
        let (factory, _bus) = factory();
        let broken = EntityRecord::new("shared");
        let working = sensor_record("shared", "true");

        let (registry, failures) = factory.create_all([
            (EntityKind::Button, &broken),
            (EntityKind::Sensor, &working),
        ]);

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            ConstructionError::MissingField { field: "command", .. }
        ));
        assert_eq!(registry.get("shared").unwrap().kind(), EntityKind::Sensor);
        registry.shutdown(Duration::from_secs(5)).await;
    }
}
