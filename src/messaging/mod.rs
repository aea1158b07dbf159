// Messaging module - Lock-free observer channel

pub mod channels;
pub mod notification;

pub use channels::{NotificationConsumer, NotificationProducer, create_notification_channel};
pub use notification::Notification;
