//! Transient notification slot: messages and the dismissal scheduler.

mod messages;
mod scheduler;

use std::time::Duration;

pub use messages::{
    error_message, invalid_event_message, rate_limit_message, success_message, MSG_ERROR, MSG_NOT_FOUND,
    MSG_REPORTED, MSG_UNAUTHORIZED,
};
pub use scheduler::NotificationScheduler;

/// Display time for ordinary action feedback.
pub const NOTIFICATION_DURATION: Duration = Duration::from_millis(3000);

/// Display time for moderator action feedback.
pub const ADMIN_NOTIFICATION_DURATION: Duration = Duration::from_millis(6000);
