mod api;
mod record;

pub use api::{
    AuthCounts, HealthResponse, MetricsSummary, MetricsSummaryResponse, OutcomeCounts,
    PublishRequest, PublishResult, RecentMessage, RecentMessagesResponse, StatusResponse,
    TopicSummary, TopicsResponse,
};
pub use record::{MessageValue, Record};
