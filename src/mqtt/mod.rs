pub mod bus;
pub mod publisher;
pub mod topics;

pub use bus::{MessageBus, MqttBus};
pub use publisher::{PublishSummary, Publisher};
pub use topics::TopicMapper;
