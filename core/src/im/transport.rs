//! IM transport abstraction: "send one message to one recipient". Used by the reply daemon
//! (command and dialog answers) and by the broadcaster (feed notifications).

use async_trait::async_trait;
use thiserror::Error;

/// Error from sending a message. Rate-limited responses can be retried after a delay.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// API returned 429; retry after this many seconds.
    #[error("rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: f64 },
    /// Other error (network, auth, unknown chat, etc.).
    #[error("{0}")]
    Other(String),
}

/// Where a message goes: a chat by numeric id (users, groups, numeric channel ids) or a channel by @name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    Chat(i64),
    Channel(String),
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Chat(id) => write!(f, "{}", id),
            Recipient::Channel(name) => f.write_str(name),
        }
    }
}

/// How the transport should interpret the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatMode {
    #[default]
    Plain,
    /// Legacy Markdown: `*bold*`, `_italic_`.
    Markdown,
}

/// Unified channel capabilities. The daemon chunks replies to `max_message_len`.
#[derive(Clone, Debug)]
pub struct ImChannelCapabilities {
    pub max_message_len: usize,
    /// Channel name (e.g. "telegram") for logging.
    pub channel_id_prefix: &'static str,
}

/// Transport that can send a message. Implemented per IM channel.
#[async_trait]
pub trait ImTransport: Send + Sync {
    fn capabilities(&self) -> ImChannelCapabilities;

    /// Send `text` to `to`. Exactly one API call; no retry inside the transport.
    async fn send(&self, to: &Recipient, text: &str, mode: FormatMode) -> Result<(), SendError>;
}

/// Split text into chunks of at most `max_len` bytes, trying to break at newlines and
/// never inside a UTF-8 sequence.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (chunk, next) = if rest.len() <= max_len {
            (rest, "")
        } else {
            let mut cut = max_len;
            while cut > 0 && !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            let break_at = rest[..cut]
                .rfind('\n')
                .map(|i| i + 1)
                .filter(|&i| i > 0)
                .unwrap_or(cut);
            if break_at == 0 {
                // max_len smaller than one char: emit the char whole.
                let width = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
                (&rest[..width], &rest[width..])
            } else {
                (&rest[..break_at], &rest[break_at..])
            }
        };
        chunks.push(chunk.to_string());
        rest = next;
    }
    chunks
}
