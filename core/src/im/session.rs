//! Dialog session table: user id -> open dialog. In-memory only; lost on restart.
//! At most one dialog per user: beginning a new one replaces whatever was open.

use dashmap::DashMap;

use super::dialog::Dialog;

/// Telegram user id of the message sender.
pub type UserId = u64;

#[derive(Default)]
pub struct DialogSessions {
    open: DashMap<UserId, Dialog>,
}

impl DialogSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `dialog` for `user`. Returns the dialog it replaced, if any.
    pub fn begin(&self, user: UserId, dialog: Dialog) -> Option<Dialog> {
        self.open.insert(user, dialog)
    }

    /// Remove and return the user's open dialog so it can be advanced by value.
    pub fn take(&self, user: UserId) -> Option<Dialog> {
        self.open.remove(&user).map(|(_, d)| d)
    }

    /// Store the dialog that follows a step. Same single-slot semantics as `begin`.
    pub fn put(&self, user: UserId, dialog: Dialog) {
        self.open.insert(user, dialog);
    }

    pub fn is_open(&self, user: UserId) -> bool {
        self.open.contains_key(&user)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, user: UserId) -> Option<Dialog> {
        self.open.get(&user).map(|e| e.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.open.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
