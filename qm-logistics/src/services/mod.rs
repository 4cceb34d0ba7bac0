//! Domain services: pure computations and the dashboard machinery

pub mod aggregation;
pub mod bulk;
pub mod dashboard;
pub mod followups;
pub mod production;
pub mod publisher;
pub mod render;

pub use dashboard::DashboardSynchronizer;
pub use followups::FollowupStore;
pub use publisher::{HttpPublisher, LogPublisher, MessagePublisher, PublishError};
