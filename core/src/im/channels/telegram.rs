//! Telegram IM: all teloxide usage is confined here. Exposes the transport (send one message) and
//! the receiver (long polling, push inbound text to the worker queue).

use std::sync::Arc;

use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatId, ParseMode};
use teloxide::RequestError;
use tokio::sync::mpsc;

use crate::im::daemon::OutboundHub;
use crate::im::log::{prefix_channel, truncate_content_default};
use crate::im::router::Command;
use crate::im::transport::{FormatMode, ImChannelCapabilities, ImTransport, Recipient, SendError};
use crate::im::worker::{run_worker, Dispatcher, InboundMessage};

pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const INBOUND_QUEUE_CAP: usize = 64;

/// Telegram send implementation. Numeric ids go out as `ChatId`, `@name` as a channel username.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait::async_trait]
impl ImTransport for TelegramTransport {
    fn capabilities(&self) -> ImChannelCapabilities {
        ImChannelCapabilities {
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
            channel_id_prefix: "telegram",
        }
    }

    async fn send(&self, to: &Recipient, text: &str, mode: FormatMode) -> Result<(), SendError> {
        let text = truncate_to_max(text).into_owned();
        let request = self.bot.send_message(to_telegram(to), text);
        let request = match mode {
            FormatMode::Plain => request,
            FormatMode::Markdown => {
                // Legacy Markdown keeps `*bold*` without escaping every '.' and '-' in titles and urls.
                #[allow(deprecated)]
                let parse_mode = ParseMode::Markdown;
                request.parse_mode(parse_mode)
            }
        };
        request.await.map_err(map_request_error)?;
        Ok(())
    }
}

fn to_telegram(to: &Recipient) -> teloxide::types::Recipient {
    match to {
        Recipient::Chat(id) => teloxide::types::Recipient::Id(ChatId(*id)),
        Recipient::Channel(name) => teloxide::types::Recipient::ChannelUsername(name.clone()),
    }
}

fn map_request_error(e: RequestError) -> SendError {
    match e {
        RequestError::RetryAfter(after) => SendError::RateLimited {
            retry_after_secs: after.duration().as_secs_f64(),
        },
        other => SendError::Other(other.to_string()),
    }
}

fn truncate_to_max(text: &str) -> std::borrow::Cow<'_, str> {
    if text.len() <= TELEGRAM_MAX_MESSAGE_LEN {
        return std::borrow::Cow::Borrowed(text);
    }
    let mut cut = TELEGRAM_MAX_MESSAGE_LEN;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    std::borrow::Cow::Owned(text[..cut].to_string())
}

fn command_menu() -> Vec<BotCommand> {
    Command::TABLE
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect()
}

/// Check the token with getMe and log the bot name. Fatal for startup if it fails.
pub async fn connect(token: &str) -> Result<Bot, SendError> {
    let bot = Bot::new(token);
    let me = bot.get_me().await.map_err(map_request_error)?;
    let name = me.user.username.as_deref().unwrap_or("(no username)");
    tracing::info!("{} event=bot_started bot=@{}", prefix_channel("telegram"), name);
    Ok(bot)
}

/// Run the Telegram receiver (long polling). Converts every text message into an `InboundMessage`
/// and pushes it onto the worker queue. Non-text messages are ignored. Returns when the bot stops.
pub async fn run_telegram_receiver(bot: Bot, inbound_tx: mpsc::Sender<InboundMessage>) {
    teloxide::repl(bot, move |msg: Message| {
        let inbound_tx = inbound_tx.clone();

        async move {
            let chat_id = msg.chat.id;
            let Some(user) = msg.from.as_ref() else {
                return respond(());
            };
            let sender_id = user.id.0;

            let text = match msg.text() {
                Some(t) => t.trim().to_string(),
                None => {
                    tracing::debug!(
                        "{} chat_id={} from={} direction=incoming content=(non-text, ignored)",
                        prefix_channel("telegram"),
                        chat_id.0,
                        sender_id
                    );
                    return respond(());
                }
            };

            tracing::info!(
                "{} chat_id={} from={} direction=incoming content={}",
                prefix_channel("telegram"),
                chat_id.0,
                sender_id,
                truncate_content_default(&text)
            );

            let inbound = InboundMessage {
                sender_id,
                chat_id: chat_id.0,
                text,
            };
            if inbound_tx.send(inbound).await.is_err() {
                tracing::warn!("{} worker queue closed", prefix_channel("telegram"));
            }
            respond(())
        }
    })
    .await;
}

/// Run the Telegram bot: register the command menu, spawn the sequential worker, then run the receiver.
pub async fn run_telegram_bot(bot: Bot, dispatcher: Arc<Dispatcher>, outbound: Arc<OutboundHub>) {
    if let Err(e) = bot.set_my_commands(command_menu()).await {
        tracing::warn!("{} set_my_commands failed error={}", prefix_channel("telegram"), e);
    }

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAP);
    tokio::spawn(run_worker(inbound_rx, dispatcher, outbound));

    run_telegram_receiver(bot, inbound_tx).await;
}
