//! Message router: decides what to do with each inbound text.
//! Slash command > open dialog input > drop. Drop is silent: no reply, no state change.

use super::session::{DialogSessions, UserId};

/// Bot command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Config,
    Add,
    Edit,
    Delete,
    List,
    Stats,
    Unknown(String),
}

impl Command {
    /// (name, description) for every known command, in menu order.
    pub const TABLE: &'static [(&'static str, &'static str)] = &[
        ("start", "Start using the bot"),
        ("help", "Show available commands"),
        ("config", "Show current configuration"),
        ("add", "Add an RSS subscription"),
        ("edit", "Edit an RSS subscription"),
        ("delete", "Delete an RSS subscription"),
        ("list", "List all RSS subscriptions"),
        ("stats", "Show delivery statistics"),
    ];

    fn from_name(name: &str) -> Command {
        match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "config" => Command::Config,
            "add" => Command::Add,
            "edit" => Command::Edit,
            "delete" => Command::Delete,
            "list" => Command::List,
            "stats" => Command::Stats,
            _ => Command::Unknown(name.to_string()),
        }
    }
}

/// What the worker should do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Non-command text for a user with an open dialog.
    DialogInput,
    /// Non-command text with no open dialog.
    Drop,
}

/// Parse `/name`, `/name@BotName` or `/name args`. Anything else is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let rest = text.trim().strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        return None;
    }
    Some(Command::from_name(name))
}

pub fn route(sessions: &DialogSessions, user: UserId, text: &str) -> Route {
    if let Some(cmd) = parse_command(text) {
        return Route::Command(cmd);
    }
    if sessions.is_open(user) {
        Route::DialogInput
    } else {
        Route::Drop
    }
}
