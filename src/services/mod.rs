pub mod encoder;
pub mod memory;
pub mod publisher;

pub use encoder::{encode_headers, encode_key, encode_value};
pub use memory::InMemoryTransport;
pub use publisher::{
    AckSender, BrokerTransport, MAX_PUBLISH_ATTEMPTS, PendingAck, PublishPolicy, Publisher,
};
