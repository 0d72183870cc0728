use serde::Deserialize;

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    match hostname::get() {
        Ok(name) => format!("companiond-{}", name.to_string_lossy()),
        Err(_) => "companiond".to_string(),
    }
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_state_prefix() -> String {
    "hmd".to_string()
}

/// Configuration for the MQTT bus
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// MQTT broker hostname or IP address
    #[serde(alias = "host")]
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client ID (default: "companiond-<hostname>")
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Home Assistant discovery prefix (default: "homeassistant")
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Prefix for state and command topics (default: "hmd")
    #[serde(default = "default_state_prefix")]
    pub state_prefix: String,

    /// Optional username for authentication
    pub username: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,
}
