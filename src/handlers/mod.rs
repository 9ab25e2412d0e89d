mod health;
pub mod messages;
mod summary;

pub use health::{api_status, health_check};
pub use messages::{PUBLISH_ENDPOINT, publish_message};
pub use summary::{api_messages, api_metrics, api_topics};
