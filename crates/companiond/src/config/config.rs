use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

use super::env::interpolate_strings;
use crate::engine::validate_record;
use crate::engine::ConstructionError;
use crate::engine::DeviceRef;
use crate::engine::Devices;
use crate::engine::EntityKind;
use crate::engine::EntityRecord;
#[cfg(feature = "integration_mqtt")]
use crate::integrations::mqtt::MqttConfig;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// MQTT broker to publish to; entities only log their values without it
    #[cfg(feature = "integration_mqtt")]
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,

    /// The device entities belong to unless they name another one
    #[serde(default)]
    pub device: DeviceConfig,

    /// Additional devices, keyed by the name entities use to reference them
    #[serde(default)]
    pub devices: HashMap<String, DeviceConfig>,

    /// How long shutdown waits for pollers before aborting them
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub sensors: Vec<EntityRecord>,

    #[serde(default)]
    pub binary_sensors: Vec<EntityRecord>,

    #[serde(default)]
    pub switches: Vec<EntityRecord>,

    #[serde(default)]
    pub buttons: Vec<EntityRecord>,
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"companiond::engine" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: Option<String>,
    pub id: Option<String>,
}

const DEFAULT_DEVICE_NAME: &str = "Hass Companion";
const DEFAULT_DEVICE_ID: &str = "hass-companion";

impl Config {
    /// Load configuration from a TOML file, substituting environment variables
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::parse(&contents, |name| std::env::var(name).ok())
    }

    /// Parse configuration text, resolving `${VAR}` references in string values with
    /// `lookup`. Substituted text is taken literally, never parsed as TOML.
    pub fn parse(
        contents: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut document = toml::Value::Table(toml::from_str::<toml::Table>(contents)?);
        interpolate_strings(&mut document, &lookup);
        Ok(document.try_into::<Self>()?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Resolve the main device and the additional ones
    pub fn devices(&self) -> Devices {
        let mut devices = Devices::new(DeviceRef {
            id: self
                .device
                .id
                .clone()
                .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
            name: self
                .device
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
        });

        for (key, device) in &self.devices {
            devices.additional.insert(
                key.clone(),
                DeviceRef {
                    id: device.id.clone().unwrap_or_else(|| key.clone()),
                    name: device.name.clone().unwrap_or_else(|| key.clone()),
                },
            );
        }

        devices
    }

    /// Every entity record with its kind, in creation order
    pub fn entity_records(&self) -> impl Iterator<Item = (EntityKind, &EntityRecord)> {
        let kinds = [
            (EntityKind::Sensor, &self.sensors),
            (EntityKind::BinarySensor, &self.binary_sensors),
            (EntityKind::Switch, &self.switches),
            (EntityKind::Button, &self.buttons),
        ];
        kinds
            .into_iter()
            .flat_map(|(kind, records)| records.iter().map(move |record| (kind, record)))
    }

    /// Check every entity record without starting anything
    pub fn validate(&self) -> Vec<ConstructionError> {
        let devices = self.devices();
        let mut seen = std::collections::HashSet::new();
        let mut errors = Vec::new();

        for (kind, record) in self.entity_records() {
            if seen.contains(record.id()) {
                errors.push(ConstructionError::DuplicateId(record.id().to_string()));
                continue;
            }
            match validate_record(kind, record, &devices) {
                Ok(()) => {
                    seen.insert(record.id());
                }
                Err(e) => errors.push(e),
            }
        }

        errors
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::engine::SensorValue;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("", no_env).unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.entity_records().count(), 0);
        assert!(config.validate().is_empty());

        let devices = config.devices();
        assert_eq!(devices.default.name, "Hass Companion");
        assert_eq!(devices.default.id, "hass-companion");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            shutdown_timeout_secs = 2

            [logging]
            level = "debug"
            [logging.overrides]
            "companiond::engine" = "trace"

            [device]
            name = "Server"
            id = "server"

            [devices.nas]
            name = "NAS"

            [[sensors]]
            name = "CPU"
            command = "echo 42"
            parse = [{ type = "int" }]

            [[binary_sensors]]
            name = "Online"
            command = "ping -c1 host >/dev/null && echo yes"
            device = "nas"
            parse = [{ type = "bool" }]

            [[switches]]
            name = "VPN"
            command_on = "start"
            command_off = "stop"

            [[buttons]]
            name = "Reboot"
            command = "reboot"
        "#;

        let config = Config::parse(toml, no_env).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.overrides.get("companiond::engine"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));

        let devices = config.devices();
        assert_eq!(devices.default.name, "Server");
        assert_eq!(devices.additional["nas"].id, "nas");

        let kinds: Vec<_> = config
            .entity_records()
            .map(|(kind, record)| (kind, record.id().to_string()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EntityKind::Sensor, "CPU".to_string()),
                (EntityKind::BinarySensor, "Online".to_string()),
                (EntityKind::Switch, "VPN".to_string()),
                (EntityKind::Button, "Reboot".to_string()),
            ]
        );
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_env_substitution() {
        let toml = r#"
            [[sensors]]
            name = "${SENSOR_NAME:Default}"
            command = "echo ${VALUE}"
        "#;

        let config = Config::parse(toml, |name| {
            (name == "VALUE").then(|| "7".to_string())
        })
        .unwrap();
        assert_eq!(config.sensors[0].name, "Default");
        assert_eq!(config.sensors[0].poll.command.as_deref(), Some("echo 7"));
    }

    #[cfg(feature = "integration_mqtt")]
    #[test]
    fn test_substituted_values_are_literal() {
        let toml = r#"
            [mqtt]
            broker = "localhost"
            password = "${P}"
            username = "plain"
        "#;

        let secret = r#"pa"ss\tb"#;
        let config = Config::parse(toml, |name| (name == "P").then(|| secret.to_string()))
            .unwrap();
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.password.as_deref(), Some(secret));
        assert_eq!(mqtt.username.as_deref(), Some("plain"));
    }

    #[test]
    fn test_substitution_reaches_nested_strings() {
        let toml = r#"
            [[switches]]
            name = "svc"
            command_on = "systemctl start ${UNIT}"
            command_off = "systemctl stop ${UNIT}"
            [switches.binary_sensor]
            command = "systemctl is-active ${UNIT}"
            parse = [{ type = "compare", operator = "==", value = "${STATE:active}" }]
        "#;

        let config = Config::parse(toml, |name| (name == "UNIT").then(|| "vpn".to_string()))
            .unwrap();
        let switch = &config.switches[0];
        assert_eq!(switch.command_off.as_deref(), Some("systemctl stop vpn"));
        let state = switch.binary_sensor.as_ref().unwrap();
        assert_eq!(state.command.as_deref(), Some("systemctl is-active vpn"));
        assert_eq!(state.parse[0].value, Some(SensorValue::from("active")));
    }

    #[test]
    fn test_validate_reports_every_bad_record() {
        let toml = r#"
            [[sensors]]
            name = "a"
            command = "true"
            parse = [{ type = "compare", operator = "~=", value = 1 }]

            [[sensors]]
            name = "b"
            command = "true"
            parse = [{ type = "regex", regex = "(" }]

            [[sensors]]
            name = "e"
            command = "true"

            # "a" failed above, so this one may use the id
            [[binary_sensors]]
            name = "a"
            command = "true"

            [[binary_sensors]]
            name = "e"
            command = "true"

            [[switches]]
            name = "c"
            command_on = "true"
            device = "garage"
            command_off = "true"

            [[buttons]]
            name = "d"
        "#;

        let config = Config::parse(toml, no_env).unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ConstructionError::InvalidOperator(_)));
        assert!(matches!(errors[1], ConstructionError::InvalidRegex { .. }));
        assert!(matches!(&errors[2], ConstructionError::DuplicateId(id) if id == "e"));
        assert!(matches!(errors[3], ConstructionError::UnknownDevice { .. }));
        assert!(matches!(
            errors[4],
            ConstructionError::MissingField { field: "command", .. }
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[buttons]]\nname = \"b\"\ncommand = \"true\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.buttons.len(), 1);

        let err = Config::from_file("/nonexistent/companiond.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::parse("sensors = 5", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
