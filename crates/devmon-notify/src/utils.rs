//! Utility functions for notification channels

/// Maximum length of a response body kept for logging
pub const MAX_BODY_LENGTH: usize = 1000;

/// Truncate a string to at most `max_len` bytes without splitting a character
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Substitute `{{placeholder}}` markers with message fields
pub fn render_template(template: &str, message: &crate::OutgoingMessage) -> String {
    template
        .replace("{{device_id}}", &message.device_id.to_string())
        .replace("{{device_name}}", &message.device_name)
        .replace("{{subject}}", &message.subject)
        .replace("{{body}}", &message.body)
        .replace("{{extra_data}}", &message.extra_data)
        .replace("{{priority}}", &message.priority.to_string())
        .replace("{{sound}}", &message.sound)
}
