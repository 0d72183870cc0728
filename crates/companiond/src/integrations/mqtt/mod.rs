mod bus;
mod client;
mod config;
mod discovery;

pub use bus::MqttBus;
pub use client::MqttClient;
pub use client::RumqttcClient;
pub use config::Config as MqttConfig;
