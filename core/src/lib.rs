//! rss2tg core: settings file, subscription store helpers, delivery stats, IM (Telegram). No HTTP.

pub mod config;
pub mod im;
pub mod stats;
pub mod subscriptions;
