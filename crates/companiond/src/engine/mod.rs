pub mod bus;
mod button;
mod entity;
mod error;
pub mod executor;
mod factory;
pub mod parser;
mod poller;
mod record;
mod registry;
mod switch;
mod value;

pub use bus::Bus;
pub use bus::CommandHandler;
pub use bus::DeviceRef;
pub use bus::EntityInfo;
pub use bus::LogBus;
pub use bus::MemoryBus;
pub use button::Button;
pub use entity::BinarySensor;
pub use entity::CommandSensor;
pub use entity::Entity;
pub use entity::EntityKind;
pub use entity::OptimisticSensor;
pub use entity::Publish;
pub use entity::Sensor;
pub use entity::Sink;
pub use error::ActuatorError;
pub use error::ConstructionError;
pub use error::EntityError;
pub use error::ExecError;
pub use error::ParseFailure;
pub use factory::Devices;
pub use factory::validate as validate_record;
pub use factory::EntityFactory;
pub use parser::ParserChain;
pub use parser::ParserSpec;
pub use poller::PollSpec;
pub use poller::Poller;
pub use poller::PollerState;
pub use record::EntityRecord;
pub use record::PollRecord;
pub use registry::EntityRegistry;
pub use switch::Switch;
pub use value::SensorValue;
