//! Test transport: records every send, fails for chosen recipients, optionally rate-limits once.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::transport::{FormatMode, ImChannelCapabilities, ImTransport, Recipient, SendError};

#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(Recipient, String, FormatMode)>>,
    failing: HashSet<Recipient>,
    rate_limit_next: Mutex<u32>,
    max_len: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: impl IntoIterator<Item = Recipient>) -> Self {
        Self {
            failing: recipients.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    /// The next `n` sends return `RateLimited { retry_after_secs: 1.0 }`.
    pub fn rate_limit_next(&self, n: u32) {
        *self.rate_limit_next.lock().unwrap() = n;
    }

    pub fn texts_to(&self, to: &Recipient) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _, _)| r == to)
            .map(|(_, t, _)| t.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ImTransport for RecordingTransport {
    fn capabilities(&self) -> ImChannelCapabilities {
        ImChannelCapabilities {
            max_message_len: self.max_len.unwrap_or(4096),
            channel_id_prefix: "test",
        }
    }

    async fn send(&self, to: &Recipient, text: &str, mode: FormatMode) -> Result<(), SendError> {
        {
            let mut left = self.rate_limit_next.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(SendError::RateLimited { retry_after_secs: 1.0 });
            }
        }
        if self.failing.contains(to) {
            return Err(SendError::Other(format!("chat not found: {}", to)));
        }
        self.sent.lock().unwrap().push((to.clone(), text.to_string(), mode));
        Ok(())
    }
}
