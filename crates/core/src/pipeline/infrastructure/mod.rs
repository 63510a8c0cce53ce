pub mod channel_publisher;
