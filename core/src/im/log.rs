//! Unified IM log format: [rss2tg][im][channel] key=value ...
//! Emitted through `tracing`; this module only builds the prefix and trims content.

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Log prefix for IM: [rss2tg][im][{channel}].
#[inline]
pub fn prefix_channel(channel: &str) -> String {
    format!("[rss2tg][im][{}]", channel)
}

/// Truncate message content for logging (avoid huge dumps). Cuts on a char boundary.
#[inline]
pub fn truncate_content(content: &str, max_len: usize) -> std::borrow::Cow<'_, str> {
    if content.len() <= max_len {
        return std::borrow::Cow::Borrowed(content);
    }
    let mut cut = max_len;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    std::borrow::Cow::Owned(format!("{}... ({} bytes)", &content[..cut], content.len()))
}

#[inline]
pub fn truncate_content_default(content: &str) -> std::borrow::Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}
