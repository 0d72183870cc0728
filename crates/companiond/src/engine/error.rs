use std::path::PathBuf;

use super::value::SensorValue;

/// The configuration of an entity or parser cannot be built.
///
/// Fatal for the entity it belongs to, never for its siblings.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("unknown parser type '{0}'")]
    UnknownParser(String),

    #[error("invalid compare operator '{0}', expected one of <, >, <=, >=, ==, !=")]
    InvalidOperator(String),

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("regex '{pattern}' has no capture group {group}")]
    UnknownGroup { pattern: String, group: String },

    #[error("parser '{parser}' is missing required field '{field}'")]
    MissingParserField {
        parser: &'static str,
        field: &'static str,
    },

    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),

    #[error("entity '{entity}' is missing required field '{field}'")]
    MissingField { entity: String, field: &'static str },

    #[error("entity '{entity}' has invalid polling rate {rate}, must be a positive number")]
    InvalidPollingRate { entity: String, rate: f64 },

    #[error("entity '{entity}' references unknown device '{device}'")]
    UnknownDevice { entity: String, device: String },

    #[error("entity '{entity}' has unsupported sensor type '{source_type}', expected 'command'")]
    UnknownSensorType { entity: String, source_type: String },

    #[error("entity id '{0}' is used more than once")]
    DuplicateId(String),
}

/// A parser stage could not interpret its input. The tick is dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{stage} parser rejected {input:?}: {reason}")]
pub struct ParseFailure {
    pub stage: &'static str,
    pub input: SensorValue,
    pub reason: String,
}

impl ParseFailure {
    pub fn new(stage: &'static str, input: &SensorValue, reason: impl Into<String>) -> Self {
        Self {
            stage,
            input: input.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntityError {
    /// An entity received a value outside of its accepted domain
    #[error("invalid value for {entity}: expected {expected}, got {got:?}")]
    InvalidValue {
        entity: &'static str,
        expected: &'static str,
        got: SensorValue,
    },
}

/// The shell for a command could not be started.
#[derive(Debug, thiserror::Error)]
#[error("failed to run command {command:?} with shell {}: {source}", .shell.display())]
pub struct ExecError {
    pub command: String,
    pub shell: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// An actuator command could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("failed to reflect state: {0}")]
    State(#[from] EntityError),
}
