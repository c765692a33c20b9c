//! Delivery statistics

pub mod metrics;

pub use metrics::{ChannelStats, ConnectionStats};
