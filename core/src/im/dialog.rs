//! Subscription dialog: the multi-step add / edit / delete conversation held per user.
//!
//! Each inbound text advances one step. The pending record lives in the dialog itself and only
//! reaches the subscription store through a [`Commit`] returned from the final step, so a
//! half-built record is never visible to /list or the fetch engine.
//!
//! The reserved input [`KEEP_SENTINEL`] (`"1"`) means "keep the current value" in edit steps and
//! "no keywords" in the add flow. A literal `"1"` can therefore never be stored as a url, group
//! or keyword list through the dialog.

use crate::config::Subscription;
use crate::subscriptions::{self, Commit};

pub const KEEP_SENTINEL: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStep {
    Url,
    Interval,
    Keywords,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStep {
    Url,
    Interval,
    Keywords,
    Group,
}

/// Where a user is in a dialog. Absence from the session table means "no open dialog".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    Add { step: AddStep, draft: Subscription },
    /// Waiting for the 1-based number of the subscription to edit.
    EditIndex,
    /// Editing the record at 0-based `index`; `draft` starts as a copy of it.
    Edit { index: usize, step: EditStep, draft: Subscription },
    /// Waiting for the 1-based number of the subscription to delete.
    Delete,
}

/// Result of feeding one message into a dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Dialog to keep for the user; `None` clears it.
    pub next: Option<Dialog>,
    /// Prompt to send back. Empty when the commit confirmation replaces it.
    pub reply: String,
    pub commit: Option<Commit>,
}

impl Transition {
    fn stay(next: Dialog, reply: impl Into<String>) -> Self {
        Self {
            next: Some(next),
            reply: reply.into(),
            commit: None,
        }
    }

    fn clear(reply: impl Into<String>) -> Self {
        Self {
            next: None,
            reply: reply.into(),
            commit: None,
        }
    }

    fn commit(commit: Commit) -> Self {
        Self {
            next: None,
            reply: String::new(),
            commit: Some(commit),
        }
    }
}

pub const PROMPT_ADD_URL: &str = "Enter the URL of the RSS feed to add:";
pub const PROMPT_ADD_INTERVAL: &str = "Enter the update interval in seconds:";
pub const PROMPT_ADD_KEYWORDS: &str = "Enter keywords separated by commas (enter 1 for none):";
pub const PROMPT_ADD_GROUP: &str = "Enter the group name:";
pub const PROMPT_EDIT_INDEX: &str = "Enter the number of the subscription to edit:";
pub const PROMPT_DELETE_INDEX: &str = "Enter the number of the subscription to delete:";
pub const INVALID_INTERVAL: &str = "Invalid interval, please enter an integer.";
pub const INVALID_INTERVAL_EDIT: &str = "Invalid interval, please enter an integer. Enter 1 to keep it.";
pub const INVALID_EDIT_INDEX: &str = "Invalid number. Use /edit to start again.";
pub const INVALID_DELETE_INDEX: &str = "Invalid number. Use /delete to start again.";

impl Dialog {
    /// Fresh dialog for /add with its first prompt.
    pub fn start_add() -> (Dialog, &'static str) {
        (
            Dialog::Add {
                step: AddStep::Url,
                draft: Subscription::default(),
            },
            PROMPT_ADD_URL,
        )
    }

    pub fn start_edit() -> (Dialog, &'static str) {
        (Dialog::EditIndex, PROMPT_EDIT_INDEX)
    }

    pub fn start_delete() -> (Dialog, &'static str) {
        (Dialog::Delete, PROMPT_DELETE_INDEX)
    }

    /// Advance by one inbound message. `subscriptions` is the live list, read for index checks
    /// and to seed an edit draft; it is never mutated here.
    pub fn advance(self, input: &str, subscriptions: &[Subscription]) -> Transition {
        match self {
            Dialog::Add { step, draft } => advance_add(step, draft, input),
            Dialog::EditIndex => match subscriptions::parse_index(input, subscriptions.len()) {
                Some(index) => {
                    let draft = subscriptions[index].clone();
                    let reply = edit_prompt(EditStep::Url, &draft);
                    Transition::stay(
                        Dialog::Edit {
                            index,
                            step: EditStep::Url,
                            draft,
                        },
                        reply,
                    )
                }
                None => Transition::clear(INVALID_EDIT_INDEX),
            },
            Dialog::Edit { index, step, draft } => advance_edit(index, step, draft, input),
            Dialog::Delete => match subscriptions::parse_index(input, subscriptions.len()) {
                Some(index) => Transition::commit(Commit::Delete { index }),
                None => Transition::clear(INVALID_DELETE_INDEX),
            },
        }
    }
}

fn parse_interval(input: &str) -> Option<u64> {
    input.trim().parse().ok()
}

fn advance_add(step: AddStep, mut draft: Subscription, input: &str) -> Transition {
    let next = |step, draft| Dialog::Add { step, draft };
    match step {
        AddStep::Url => {
            draft.url = input.to_string();
            Transition::stay(next(AddStep::Interval, draft), PROMPT_ADD_INTERVAL)
        }
        AddStep::Interval => match parse_interval(input) {
            Some(interval) => {
                draft.interval = interval;
                Transition::stay(next(AddStep::Keywords, draft), PROMPT_ADD_KEYWORDS)
            }
            None => Transition::stay(next(AddStep::Interval, draft), INVALID_INTERVAL),
        },
        AddStep::Keywords => {
            if input != KEEP_SENTINEL {
                draft.keywords = subscriptions::parse_keywords(input);
            }
            Transition::stay(next(AddStep::Group, draft), PROMPT_ADD_GROUP)
        }
        AddStep::Group => {
            draft.group = input.to_string();
            Transition::commit(Commit::Add(draft))
        }
    }
}

fn advance_edit(index: usize, step: EditStep, mut draft: Subscription, input: &str) -> Transition {
    let keep = input == KEEP_SENTINEL;
    let then = |step: EditStep, draft: Subscription| {
        let reply = edit_prompt(step, &draft);
        Transition::stay(Dialog::Edit { index, step, draft }, reply)
    };
    match step {
        EditStep::Url => {
            if !keep {
                draft.url = input.to_string();
            }
            then(EditStep::Interval, draft)
        }
        EditStep::Interval => {
            if !keep {
                match parse_interval(input) {
                    Some(interval) => draft.interval = interval,
                    None => {
                        return Transition::stay(
                            Dialog::Edit { index, step, draft },
                            INVALID_INTERVAL_EDIT,
                        )
                    }
                }
            }
            then(EditStep::Keywords, draft)
        }
        EditStep::Keywords => {
            if !keep {
                draft.keywords = subscriptions::parse_keywords(input);
            }
            then(EditStep::Group, draft)
        }
        EditStep::Group => {
            if !keep {
                draft.group = input.to_string();
            }
            Transition::commit(Commit::Edit { index, record: draft })
        }
    }
}

/// Prompt for an edit step, showing the current value.
fn edit_prompt(step: EditStep, draft: &Subscription) -> String {
    match step {
        EditStep::Url => format!("Current URL: {}\nEnter a new URL (enter 1 to keep it):", draft.url),
        EditStep::Interval => format!(
            "Current interval: {}s\nEnter a new interval in seconds (enter 1 to keep it):",
            draft.interval
        ),
        EditStep::Keywords => format!(
            "Current keywords: {}\nEnter new keywords separated by commas (enter 1 to keep them):",
            subscriptions::format_keywords(&draft.keywords)
        ),
        EditStep::Group => format!("Current group: {}\nEnter a new group name (enter 1 to keep it):", draft.group),
    }
}
