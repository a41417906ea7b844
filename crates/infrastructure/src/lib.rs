pub mod amqp;
pub mod trigger_engine;

pub use amqp::{DisabledQueuePublisher, RabbitMqPublisher};
pub use trigger_engine::{InMemoryTriggerStore, TriggerEngine};
