//! Entity abstractions for companiond
//!
//! Value-receiving entities implement [`Sink`]; everything the registry owns
//! implements [`Entity`]. Binary sensors are a validating wrapper around another sink
//! rather than a separate sensor type, so a poller can drive any of them.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::EntityError;
use super::poller::Poller;
use super::value::SensorValue;

/// Hands a new value to whoever publishes it (usually the bus, bound to an entity id).
pub type Publish = Arc<dyn Fn(SensorValue) + Send + Sync>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Switch,
    Button,
}

/// Something that accepts values.
pub trait Sink: Send + Sync {
    fn update(&self, value: SensorValue) -> Result<(), EntityError>;
}

/// Base trait for everything the registry owns
#[async_trait]
pub trait Entity: Send + Sync {
    /// Unique id used for publishing and command routing
    fn id(&self) -> &str;

    fn kind(&self) -> EntityKind;

    /// Ask background work to stop. Idempotent, callable from any context.
    fn stop(&self);

    /// Wait until background work has finished. Entities without any return at once.
    async fn join(&self) {}

    /// Abort background work that did not finish on its own
    fn abort(&self) {}
}

/// Forwards every value to its publish function.
pub struct Sensor {
    publish: Publish,
}

impl Sensor {
    pub fn new(publish: Publish) -> Self {
        Self { publish }
    }
}

impl Sink for Sensor {
    fn update(&self, value: SensorValue) -> Result<(), EntityError> {
        (self.publish)(value);
        Ok(())
    }
}

/// Only lets booleans through to the wrapped sink.
pub struct BinarySensor<S = Sensor> {
    inner: S,
}

impl<S: Sink> BinarySensor<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn on(&self) -> Result<(), EntityError> {
        self.update(SensorValue::Bool(true))
    }

    pub fn off(&self) -> Result<(), EntityError> {
        self.update(SensorValue::Bool(false))
    }
}

impl<S: Sink> Sink for BinarySensor<S> {
    fn update(&self, value: SensorValue) -> Result<(), EntityError> {
        match value {
            SensorValue::Bool(_) => self.inner.update(value),
            got => Err(EntityError::InvalidValue {
                entity: "binary_sensor",
                expected: "bool",
                got,
            }),
        }
    }
}

/// Keeps the last value locally without telling anyone.
#[derive(Debug, Default)]
pub struct OptimisticSensor {
    state: Mutex<Option<SensorValue>>,
}

impl OptimisticSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value received, if any
    pub fn state(&self) -> Option<SensorValue> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl Sink for OptimisticSensor {
    fn update(&self, value: SensorValue) -> Result<(), EntityError> {
        if let Ok(mut state) = self.state.lock() {
            *state = Some(value);
        }
        Ok(())
    }
}

/// A sensor or binary sensor whose value comes from a polled command.
pub struct CommandSensor {
    id: String,
    kind: EntityKind,
    poller: Poller,
}

impl CommandSensor {
    pub fn new(id: String, kind: EntityKind, poller: Poller) -> Self {
        Self { id, kind, poller }
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }
}

#[async_trait]
impl Entity for CommandSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn stop(&self) {
        self.poller.stop();
    }

    async fn join(&self) {
        self.poller.join().await;
    }

    fn abort(&self) {
        self.poller.abort();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Publish function that records everything it is given
    pub(crate) fn recording_publish() -> (Publish, Arc<Mutex<Vec<SensorValue>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        let publish: Publish = Arc::new(move |value| sink.lock().unwrap().push(value));
        (publish, published)
    }

    #[test]
    fn test_sensor_publishes_everything() {
        let (publish, published) = recording_publish();
        let sensor = Sensor::new(publish);

        sensor.update(SensorValue::Int(1)).unwrap();
        sensor.update(SensorValue::Int(1)).unwrap();
        sensor.update(SensorValue::None).unwrap();

        assert_eq!(
            *published.lock().unwrap(),
            vec![SensorValue::Int(1), SensorValue::Int(1), SensorValue::None]
        );
    }

    #[test]
    fn test_binary_sensor_accepts_bool() {
        let (publish, published) = recording_publish();
        let sensor = BinarySensor::new(Sensor::new(publish));

        sensor.update(SensorValue::Bool(true)).unwrap();
        sensor.off().unwrap();
        sensor.on().unwrap();

        assert_eq!(
            *published.lock().unwrap(),
            vec![
                SensorValue::Bool(true),
                SensorValue::Bool(false),
                SensorValue::Bool(true)
            ]
        );
    }

    #[test]
    fn test_binary_sensor_rejects_non_bool() {
        let (publish, published) = recording_publish();
        let sensor = BinarySensor::new(Sensor::new(publish));

        let err = sensor.update(SensorValue::from("true")).unwrap_err();
        assert_eq!(
            err,
            EntityError::InvalidValue {
                entity: "binary_sensor",
                expected: "bool",
                got: SensorValue::from("true"),
            }
        );
        assert!(sensor.update(SensorValue::Int(1)).is_err());
        assert!(published.lock().unwrap().is_empty());
    }

    #[test]
    fn test_optimistic_sensor_keeps_last_value() {
        let sensor = OptimisticSensor::new();
        assert_eq!(sensor.state(), None);

        sensor.update(SensorValue::Bool(true)).unwrap();
        sensor.update(SensorValue::Bool(false)).unwrap();
        assert_eq!(sensor.state(), Some(SensorValue::Bool(false)));
    }

    #[test]
    fn test_binary_sensor_over_optimistic() {
        let sensor = BinarySensor::new(OptimisticSensor::new());
        sensor.on().unwrap();
        assert!(sensor.update(SensorValue::from("on")).is_err());
        assert_eq!(sensor.inner.state(), Some(SensorValue::Bool(true)));
    }

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::BinarySensor.to_string(), "binary_sensor");
        assert_eq!("switch".parse::<EntityKind>().unwrap(), EntityKind::Switch);
        assert!("light".parse::<EntityKind>().is_err());
    }
}
