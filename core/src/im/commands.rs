//! Single-shot command replies (no dialog): start, help, config, list, stats, unknown.

use std::fmt::Write as _;

use super::broadcast::Recipients;
use super::router::Command;
use crate::config::Subscription;
use crate::subscriptions;

pub const START_TEXT: &str = "Welcome to the RSS subscription bot! Use /help to see available commands.";
pub const UNKNOWN_COMMAND: &str = "Unknown command, use /help to see available commands.";

pub fn help_text() -> String {
    let mut out = String::from("Available commands:");
    for (name, description) in Command::TABLE.iter().filter(|(n, _)| *n != "start" && *n != "help") {
        let _ = write!(out, "\n/{} - {}", name, description);
    }
    out
}

/// /config: recipients and subscriptions.
pub fn format_config(recipients: &Recipients, subs: &[Subscription]) -> String {
    format!(
        "Current configuration:\nUsers: {}\nChannels: {}\nRSS subscriptions:\n{}",
        join_or_none(recipients.users().iter().map(|u| u.to_string())),
        join_or_none(recipients.channels().iter().cloned()),
        subscriptions::format_list(subs)
    )
}

/// /list: subscriptions only.
pub fn format_list(subs: &[Subscription]) -> String {
    format!("RSS subscriptions:\n{}", subscriptions::format_list(subs))
}

pub fn format_stats(daily: u64, weekly: u64) -> String {
    format!("Delivery stats:\n📊  Today: {}\n📈  This week: {}", daily, weekly)
}

pub fn format_reload_error(err: &impl std::fmt::Display) -> String {
    format!("Failed to load configuration: {}", err)
}

fn join_or_none(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
