//! Per-chat outbound: one FIFO queue and one send daemon task per chat.
//! Carries command and dialog replies; broadcasts go straight through the transport instead.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::log::{prefix_channel, truncate_content_default};
use super::transport::{self, FormatMode, ImTransport, Recipient, SendError};

/// One reply to deliver, in order, to a chat.
#[derive(Debug, Clone)]
pub struct OutboundMsg {
    pub text: String,
    pub mode: FormatMode,
}

impl OutboundMsg {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: FormatMode::Plain,
        }
    }
}

/// Per-chat state.
struct ChatSendState {
    last_send: Option<Instant>,
    retry_after: Option<Instant>,
}

impl ChatSendState {
    /// Earliest instant the next send may go out (rate limit or minimum spacing).
    fn wait_until(&self, now: Instant) -> Option<Instant> {
        self.retry_after.filter(|t| *t > now).or_else(|| {
            self.last_send
                .map(|t| t + MIN_INTERVAL)
                .filter(|next| *next > now)
        })
    }
}

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const QUEUE_CAP: usize = 256;

/// One send daemon for a single chat: drains that chat's FIFO, spaces sends by MIN_INTERVAL,
/// chunks long text, and waits out 429s (a bounded number of times per chunk).
async fn run_send_daemon_for_chat(
    mut rx: mpsc::Receiver<OutboundMsg>,
    recipient: Recipient,
    transport: Arc<dyn ImTransport>,
) {
    let caps = transport.capabilities();
    let log_prefix = prefix_channel(caps.channel_id_prefix);
    let mut state = ChatSendState {
        last_send: None,
        retry_after: None,
    };

    while let Some(msg) = rx.recv().await {
        let mut parts: VecDeque<String> = transport::chunk_message(&msg.text, caps.max_message_len).into();
        let mut retries = 0;
        while let Some(part) = parts.front() {
            if let Some(until) = state.wait_until(Instant::now()) {
                tokio::time::sleep_until(until).await;
            }
            match transport.send(&recipient, part, msg.mode).await {
                Ok(()) => {
                    state.last_send = Some(Instant::now());
                    state.retry_after = None;
                    retries = 0;
                    parts.pop_front();
                }
                Err(SendError::RateLimited { retry_after_secs }) if retries < MAX_RATE_LIMIT_RETRIES => {
                    retries += 1;
                    state.retry_after = Some(Instant::now() + Duration::from_secs_f64(retry_after_secs.max(0.0)));
                }
                Err(e) => {
                    tracing::warn!(
                        "{} chat_id={} direction=send content={} error={}",
                        log_prefix,
                        recipient,
                        truncate_content_default(part),
                        e
                    );
                    break;
                }
            }
        }
    }
}

/// Hub that routes outbound replies to a per-chat FIFO queue and a dedicated daemon task per chat.
pub struct OutboundHub {
    chats: DashMap<Recipient, mpsc::Sender<OutboundMsg>>,
    transport: Arc<dyn ImTransport>,
}

impl OutboundHub {
    pub fn new(transport: Arc<dyn ImTransport>) -> Arc<Self> {
        Arc::new(Self {
            chats: DashMap::new(),
            transport,
        })
    }

    /// Get or create the sender for this chat (creates a new FIFO queue and spawns a daemon task).
    pub fn sender_for(&self, recipient: &Recipient) -> mpsc::Sender<OutboundMsg> {
        self.chats
            .entry(recipient.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel::<OutboundMsg>(QUEUE_CAP);
                let transport = Arc::clone(&self.transport);
                tokio::spawn(run_send_daemon_for_chat(rx, recipient.clone(), transport));
                tx
            })
            .clone()
    }

    /// Enqueue a reply for the given chat (FIFO per chat).
    pub async fn send(&self, recipient: &Recipient, msg: OutboundMsg) {
        let tx = self.sender_for(recipient);
        if tx.send(msg).await.is_err() {
            tracing::warn!("{} chat_id={} direction=send error=daemon gone", prefix_channel("daemon"), recipient);
        }
    }
}
