pub mod fan_out_events;
pub mod feed_write_events;

pub use fan_out_events::FanOutConsumer;
pub use feed_write_events::FeedWriteConsumer;
