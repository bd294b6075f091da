//! Subscription store helpers: apply a committed dialog change to the live list, parse keyword input,
//! and render the numbered listing shown by /list and /config.

use std::fmt::Write as _;

use crate::config::Subscription;

/// A finished dialog's change, applied to the store only at commit time.
/// Indices are 0-based; the dialog converts from the 1-based user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Add(Subscription),
    Edit { index: usize, record: Subscription },
    Delete { index: usize },
}

/// What changed, for the confirmation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Added,
    Edited,
    Deleted(Subscription),
}

/// The index a dialog captured no longer exists (the list shrank through a reload in between).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleIndex {
    pub index: usize,
    pub len: usize,
}

pub fn apply(subscriptions: &mut Vec<Subscription>, commit: Commit) -> Result<Applied, StaleIndex> {
    let len = subscriptions.len();
    match commit {
        Commit::Add(record) => {
            subscriptions.push(record);
            Ok(Applied::Added)
        }
        Commit::Edit { index, record } => {
            let slot = subscriptions.get_mut(index).ok_or(StaleIndex { index, len })?;
            *slot = record;
            Ok(Applied::Edited)
        }
        Commit::Delete { index } => {
            if index >= len {
                return Err(StaleIndex { index, len });
            }
            Ok(Applied::Deleted(subscriptions.remove(index)))
        }
    }
}

/// Parse a 1-based index from user input into a 0-based index, if it is within `[1, len]`.
pub fn parse_index(text: &str, len: usize) -> Option<usize> {
    let n: usize = text.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

/// Split comma-separated keywords. Surrounding whitespace is trimmed and empty entries are dropped,
/// so "rust, tokio," yields `["rust", "tokio"]` rather than the raw split `["rust", " tokio", ""]`.
pub fn parse_keywords(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn format_keywords(keywords: &[String]) -> String {
    if keywords.is_empty() {
        "(none)".to_string()
    } else {
        keywords.join(", ")
    }
}

/// Numbered listing, 1-based, one block per subscription.
pub fn format_list(subscriptions: &[Subscription]) -> String {
    if subscriptions.is_empty() {
        return "(no subscriptions)".to_string();
    }
    let mut out = String::new();
    for (i, s) in subscriptions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. 📡  URL: {}\n   ⏱️  Interval: {}s\n   🔑  Keywords: {}\n   🏷️  Group: {}",
            i + 1,
            s.url,
            s.interval,
            format_keywords(&s.keywords),
            s.group
        );
    }
    out.trim_end().to_string()
}
