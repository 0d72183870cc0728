use std::path::PathBuf;

use serde::Deserialize;

use super::executor::DEFAULT_SHELL;
use super::parser::ParserSpec;

/// The only sensor source there is: a polled shell command
pub const COMMAND_SOURCE: &str = "command";

fn default_polling_rate() -> f64 {
    1.0
}

/// How a value is read: command, rate, shell and parser pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PollRecord {
    /// Value source, `command` when given
    #[serde(rename = "type", default)]
    pub source: Option<String>,

    pub command: Option<String>,

    /// Polls per second
    #[serde(default = "default_polling_rate")]
    pub polling_rate: f64,

    pub shell: Option<PathBuf>,

    #[serde(default)]
    pub parse: Vec<ParserSpec>,
}

impl Default for PollRecord {
    fn default() -> Self {
        Self {
            source: None,
            command: None,
            polling_rate: default_polling_rate(),
            shell: None,
            parse: Vec::new(),
        }
    }
}

/// Declarative description of one entity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntityRecord {
    pub name: String,

    /// Unique id, the name when absent
    pub id: Option<String>,

    /// Key of an additional device; the main device when absent
    pub device: Option<String>,

    pub icon: Option<String>,

    #[serde(rename = "class")]
    pub device_class: Option<String>,

    pub unit_of_measurement: Option<String>,

    #[serde(flatten)]
    pub poll: PollRecord,

    /// Switch commands
    pub command_on: Option<String>,
    pub command_off: Option<String>,

    /// Reads back a switch's real state
    pub binary_sensor: Option<PollRecord>,
}

impl EntityRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn shell(&self) -> PathBuf {
        self.poll.shell()
    }
}

impl PollRecord {
    pub fn shell(&self) -> PathBuf {
        self.shell
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::CaptureGroup;

    #[test]
    fn test_minimal_record_defaults() {
        let record: EntityRecord = toml::from_str(
            r#"
            name = "Uptime"
            command = "uptime"
            "#,
        )
        .unwrap();

        assert_eq!(record.id(), "Uptime");
        assert_eq!(record.poll.polling_rate, 1.0);
        assert_eq!(record.shell(), PathBuf::from("bash"));
        assert!(record.poll.parse.is_empty());
        assert!(record.binary_sensor.is_none());
    }

    #[test]
    fn test_full_sensor_record() {
        let record: EntityRecord = toml::from_str(
            r#"
            name = "CPU load"
            id = "cpu_load"
            device = "nas"
            icon = "mdi:cpu-64-bit"
            class = "power_factor"
            unit_of_measurement = "%"
            type = "command"
            command = "cat /proc/loadavg"
            polling_rate = 0.5
            shell = "/bin/sh"
            parse = [{ type = "regex", regex = '^(\S+)', group = 1 }, { type = "float" }]
            "#,
        )
        .unwrap();

        assert_eq!(record.id(), "cpu_load");
        assert_eq!(record.device.as_deref(), Some("nas"));
        assert_eq!(record.device_class.as_deref(), Some("power_factor"));
        assert_eq!(record.poll.source.as_deref(), Some(COMMAND_SOURCE));
        assert_eq!(record.poll.polling_rate, 0.5);
        assert_eq!(record.shell(), PathBuf::from("/bin/sh"));
        assert_eq!(record.poll.parse.len(), 2);
        assert_eq!(record.poll.parse[0].group, Some(CaptureGroup::Index(1)));
    }

    #[test]
    fn test_switch_record_with_state_sensor() {
        let record: EntityRecord = toml::from_str(
            r#"
            name = "VPN"
            command_on = "systemctl start vpn"
            command_off = "systemctl stop vpn"

            [binary_sensor]
            type = "command"
            command = "systemctl is-active vpn"
            polling_rate = 0.2
            parse = [{ type = "compare", operator = "==", value = "active" }]
            "#,
        )
        .unwrap();

        assert_eq!(record.command_on.as_deref(), Some("systemctl start vpn"));
        let state = record.binary_sensor.unwrap();
        assert_eq!(state.command.as_deref(), Some("systemctl is-active vpn"));
        assert_eq!(state.polling_rate, 0.2);
        assert_eq!(state.shell(), PathBuf::from("bash"));
    }
}
