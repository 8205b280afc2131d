//! User-facing notification texts.

use crate::model::PostPayload;

pub const MSG_ERROR: &str = "Something went wrong, please try again";
pub const MSG_REPORTED: &str = "Thanks! The post has been reported";
pub const MSG_UNAUTHORIZED: &str = "Moderator session expired, please log in again";
pub const MSG_NOT_FOUND: &str = "Could not find the post, it may already be removed";

/// Confirmation shown after a successful post.
pub fn success_message(payload: &PostPayload) -> &'static str {
    match payload {
        PostPayload::Text { .. } => "Message posted",
        PostPayload::Comment { .. } => "Comment posted",
        PostPayload::Image { .. } => "Image posted",
        PostPayload::CheckIn { .. } => "Checked in",
    }
}

/// Shown when a post fails for any reason without a dedicated message.
pub fn error_message(payload: &PostPayload) -> &'static str {
    match payload {
        PostPayload::Text { .. } => MSG_ERROR,
        PostPayload::Comment { .. } => "Could not post the comment, please try again",
        PostPayload::Image { .. } => "Image upload failed, please try again",
        PostPayload::CheckIn { .. } => "Check-in failed, please try again",
    }
}

/// Shown when the backend answers 429.
pub fn rate_limit_message(payload: &PostPayload) -> &'static str {
    match payload {
        PostPayload::Image { .. } => "Slow down! You can post another image in a moment",
        PostPayload::CheckIn { .. } => "You have already checked in to this event",
        _ => "Slow down! You are posting too fast",
    }
}

/// Shown when the backend answers 403.
pub fn invalid_event_message(payload: &PostPayload) -> &'static str {
    match payload {
        PostPayload::CheckIn { .. } => "Check-in failed: you are not at the event",
        _ => "This action is not available right now",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    #[test]
    fn test_comment_and_text_have_distinct_success_messages() {
        let text = PostPayload::Text {
            text: "hi".to_string(),
        };
        let comment = PostPayload::Comment {
            text: "hi".to_string(),
            parent_id: ItemId(1),
        };
        assert_ne!(success_message(&text), success_message(&comment));
    }

    #[test]
    fn test_error_message_depends_on_payload() {
        let text = PostPayload::Text {
            text: "hi".to_string(),
        };
        let image = PostPayload::Image {
            image_data: String::new(),
            image_text: None,
            image_text_position: None,
        };
        assert_eq!(error_message(&text), MSG_ERROR);
        assert!(error_message(&image).contains("Image"));
        assert!(error_message(&PostPayload::CheckIn { event_id: 1 }).contains("Check-in"));
    }

    #[test]
    fn test_check_in_failures_mention_event() {
        let payload = PostPayload::CheckIn { event_id: 3 };
        assert!(invalid_event_message(&payload).contains("event"));
        assert!(rate_limit_message(&payload).contains("event"));
    }
}
