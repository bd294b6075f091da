//! IM (instant messaging) layer: Telegram transport, per-chat reply daemon, command routing,
//! the subscription dialog, and the broadcaster that fans feed events out to every recipient.
//! Log format: [rss2tg][im][channel] chat_id=... direction=... content=...

pub mod broadcast;
pub mod channels;
pub mod commands;
pub mod daemon;
pub mod dialog;
pub mod log;
pub mod router;
pub mod session;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

/// Re-export so `rss2tg_core::im::telegram::run_telegram_bot` works.
pub use channels::telegram;
