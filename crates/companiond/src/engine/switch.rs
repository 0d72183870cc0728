use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::bus::CommandHandler;
use super::entity::Entity;
use super::entity::EntityKind;
use super::entity::OptimisticSensor;
use super::entity::Sink;
use super::error::ActuatorError;
use super::executor;
use super::poller::Poller;
use super::value::SensorValue;

/// Payload that turns a switch on
pub const PAYLOAD_ON: &str = "ON";
/// Payload that turns a switch off
pub const PAYLOAD_OFF: &str = "OFF";

/// Actuator with an on and an off command.
///
/// After a command runs, the switch reports the commanded state to its bound sensor;
/// that sensor is the only way the state leaves the switch. When the real state can
/// be read back, a poller may drive the same sensor.
pub struct Switch {
    id: String,
    command_on: String,
    command_off: String,
    shell: PathBuf,
    sensor: Arc<dyn Sink>,
    poller: Option<Poller>,
}

impl Switch {
    /// Create a switch. Without a sensor the state is only tracked locally.
    pub fn new(
        id: impl Into<String>,
        command_on: impl Into<String>,
        command_off: impl Into<String>,
        shell: impl Into<PathBuf>,
        sensor: Option<Arc<dyn Sink>>,
    ) -> Self {
        Self {
            id: id.into(),
            command_on: command_on.into(),
            command_off: command_off.into(),
            shell: shell.into(),
            sensor: sensor.unwrap_or_else(|| Arc::new(OptimisticSensor::new())),
            poller: None,
        }
    }

    /// Attach the poller reading the switch's real state. Stopping the switch stops it.
    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn poller(&self) -> Option<&Poller> {
        self.poller.as_ref()
    }

    pub async fn turn_on(&self) -> Result<(), ActuatorError> {
        self.switch(true).await
    }

    pub async fn turn_off(&self) -> Result<(), ActuatorError> {
        self.switch(false).await
    }

    async fn switch(&self, on: bool) -> Result<(), ActuatorError> {
        let command = if on {
            &self.command_on
        } else {
            &self.command_off
        };
        info!("[{}] Turning {}", self.id, if on { "on" } else { "off" });

        // Output is irrelevant, only whether the command could run
        executor::run(command, &self.shell).await?;
        self.sensor.update(SensorValue::Bool(on))?;
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Switch {
    async fn handle_command(&self, payload: &str) {
        let result = match payload {
            PAYLOAD_ON => self.turn_on().await,
            PAYLOAD_OFF => self.turn_off().await,
            other => {
                warn!("[{}] Ignoring unknown switch payload {:?}", self.id, other);
                return;
            }
        };

        if let Err(e) = result {
            error!("[{}] {}", self.id, e);
        }
    }
}

#[async_trait]
impl Entity for Switch {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Switch
    }

    fn stop(&self) {
        if let Some(poller) = &self.poller {
            poller.stop();
        }
    }

    async fn join(&self) {
        if let Some(poller) = &self.poller {
            poller.join().await;
        }
    }

    fn abort(&self) {
        if let Some(poller) = &self.poller {
            poller.abort();
        }
    }
}
