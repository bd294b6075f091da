//! IM worker: takes inbound messages off one queue, in order, and dispatches each fully
//! (dialog step, store commit, save) before reading the next. Replies go to the per-chat daemon.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::broadcast::Recipients;
use super::commands;
use super::daemon::{OutboundHub, OutboundMsg};
use super::dialog::Dialog;
use super::log::{prefix_channel, truncate_content_default};
use super::router::{self, Command, Route};
use super::session::{DialogSessions, UserId};
use super::transport::Recipient;
use crate::config::{self, Config, ConfigError, SharedConfig};
use crate::stats::Stats;
use crate::subscriptions::{self, Applied, Commit};

/// Inbound text message from the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: UserId,
    pub chat_id: i64,
    pub text: String,
}

/// Called after every successfully saved add/edit/delete. Tells the fetch engine to re-read subscriptions.
pub type SubscriptionsChanged = Arc<dyn Fn() + Send + Sync>;

pub struct Dispatcher {
    config: SharedConfig,
    config_path: PathBuf,
    recipients: Arc<Recipients>,
    sessions: Arc<DialogSessions>,
    stats: Arc<Stats>,
    on_subscriptions_changed: SubscriptionsChanged,
}

impl Dispatcher {
    pub fn new(
        config: SharedConfig,
        config_path: PathBuf,
        recipients: Arc<Recipients>,
        sessions: Arc<DialogSessions>,
        stats: Arc<Stats>,
        on_subscriptions_changed: SubscriptionsChanged,
    ) -> Self {
        Self {
            config,
            config_path,
            recipients,
            sessions,
            stats,
            on_subscriptions_changed,
        }
    }

    /// Handle one message. Returns the reply to send to its chat, if any.
    pub async fn handle(&self, msg: &InboundMessage) -> Option<String> {
        match router::route(&self.sessions, msg.sender_id, &msg.text) {
            Route::Command(cmd) => Some(self.handle_command(msg.sender_id, cmd).await),
            Route::DialogInput => self.handle_dialog_input(msg.sender_id, &msg.text).await,
            Route::Drop => {
                tracing::debug!(
                    "{} chat_id={} from={} direction=incoming dropped (no open dialog)",
                    prefix_channel("router"),
                    msg.chat_id,
                    msg.sender_id
                );
                None
            }
        }
    }

    async fn handle_command(&self, user: UserId, cmd: Command) -> String {
        match cmd {
            Command::Start => commands::START_TEXT.to_string(),
            Command::Help => commands::help_text(),
            Command::Config => match self.reload().await {
                Ok(cfg) => commands::format_config(&self.recipients, &cfg.rss),
                Err(e) => commands::format_reload_error(&e),
            },
            Command::List => match self.reload().await {
                Ok(cfg) => commands::format_list(&cfg.rss),
                Err(e) => commands::format_reload_error(&e),
            },
            Command::Add => self.begin(user, Dialog::start_add()),
            Command::Edit => self.begin(user, Dialog::start_edit()),
            Command::Delete => self.begin(user, Dialog::start_delete()),
            Command::Stats => {
                let (daily, weekly) = self.stats.message_counts();
                commands::format_stats(daily, weekly)
            }
            Command::Unknown(name) => {
                tracing::debug!("{} unknown command=/{}", prefix_channel("router"), name);
                commands::UNKNOWN_COMMAND.to_string()
            }
        }
    }

    fn begin(&self, user: UserId, (dialog, prompt): (Dialog, &'static str)) -> String {
        if let Some(previous) = self.sessions.begin(user, dialog) {
            tracing::info!("{} from={} dialog replaced previous={:?}", prefix_channel("dialog"), user, previous);
        }
        prompt.to_string()
    }

    /// Reload config from disk and replace the shared copy. On failure the shared copy is left as is
    /// and the caller reports the error instead of showing it.
    async fn reload(&self) -> Result<Config, ConfigError> {
        let fresh = Config::load(&self.config_path)?;
        *self.config.write().await = fresh.clone();
        Ok(fresh)
    }

    async fn handle_dialog_input(&self, user: UserId, text: &str) -> Option<String> {
        let dialog = self.sessions.take(user)?;
        let transition = {
            let cfg = self.config.read().await;
            dialog.advance(text, &cfg.rss)
        };
        if let Some(next) = transition.next {
            self.sessions.put(user, next);
        }
        match transition.commit {
            Some(commit) => Some(self.commit(user, commit).await),
            None => Some(transition.reply),
        }
    }

    /// Merge a finished dialog into the store, save, and notify the fetch engine on success.
    /// A save failure keeps the in-memory change.
    async fn commit(&self, user: UserId, commit: Commit) -> String {
        let kind = CommitKind::of(&commit);
        let mut cfg = self.config.write().await;
        let applied = match subscriptions::apply(&mut cfg.rss, commit) {
            Ok(applied) => applied,
            Err(stale) => {
                tracing::warn!(
                    "{} from={} commit={:?} stale index={} len={}",
                    prefix_channel("dialog"),
                    user,
                    kind,
                    stale.index,
                    stale.len
                );
                return kind.stale_message().to_string();
            }
        };
        let body = cfg.to_json();
        drop(cfg);
        let saved = match body {
            Ok(body) => self.write_config(body).await,
            Err(e) => Err(e),
        };

        match saved {
            Ok(()) => {
                tracing::info!("{} from={} commit={:?} saved", prefix_channel("dialog"), user, kind);
                (self.on_subscriptions_changed)();
                success_message(&applied)
            }
            Err(e) => {
                tracing::warn!(
                    "{} from={} commit={:?} save failed path={} error={}",
                    prefix_channel("dialog"),
                    user,
                    kind,
                    self.config_path.display(),
                    e
                );
                kind.save_failed_message().to_string()
            }
        }
    }

    /// Write a serialized config on the blocking pool, after the store lock is released.
    async fn write_config(&self, body: String) -> Result<(), ConfigError> {
        let path = self.config_path.clone();
        tokio::task::spawn_blocking(move || config::write_json(&path, &body))
            .await
            .unwrap_or_else(|e| {
                Err(ConfigError::Write {
                    path: self.config_path.clone(),
                    source: std::io::Error::other(e),
                })
            })
    }
}

#[derive(Debug, Clone, Copy)]
enum CommitKind {
    Add,
    Edit,
    Delete,
}

impl CommitKind {
    fn of(commit: &Commit) -> Self {
        match commit {
            Commit::Add(_) => CommitKind::Add,
            Commit::Edit { .. } => CommitKind::Edit,
            Commit::Delete { .. } => CommitKind::Delete,
        }
    }

    fn save_failed_message(self) -> &'static str {
        match self {
            CommitKind::Add => "Subscription added, but saving the configuration failed.",
            CommitKind::Edit => "Subscription edited, but saving the configuration failed.",
            CommitKind::Delete => "Subscription deleted, but saving the configuration failed.",
        }
    }

    fn stale_message(self) -> &'static str {
        match self {
            CommitKind::Add => "Subscription list changed, please try again.",
            CommitKind::Edit => "That subscription no longer exists. Use /edit to start again.",
            CommitKind::Delete => "That subscription no longer exists. Use /delete to start again.",
        }
    }
}

fn success_message(applied: &Applied) -> String {
    match applied {
        Applied::Added => "RSS subscription added.".to_string(),
        Applied::Edited => "RSS subscription edited.".to_string(),
        Applied::Deleted(sub) => format!("Deleted subscription: {}", sub.url),
    }
}

/// Sequential update loop: one message fully handled before the next is read.
pub async fn run_worker(
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    dispatcher: Arc<Dispatcher>,
    outbound: Arc<OutboundHub>,
) {
    while let Some(msg) = inbound_rx.recv().await {
        if let Some(reply) = dispatcher.handle(&msg).await {
            tracing::info!(
                "{} chat_id={} direction=reply content={}",
                prefix_channel("worker"),
                msg.chat_id,
                truncate_content_default(&reply)
            );
            outbound
                .send(&Recipient::Chat(msg.chat_id), OutboundMsg::plain(reply))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{display_offset, Subscription};
    use crate::im::dialog::{INVALID_DELETE_INDEX, INVALID_INTERVAL, PROMPT_ADD_INTERVAL, PROMPT_ADD_URL};
    use crate::im::testing::RecordingTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        path: PathBuf,
        config: SharedConfig,
        sessions: Arc<DialogSessions>,
        changed: Arc<AtomicUsize>,
        dispatcher: Dispatcher,
    }

    fn sub(url: &str) -> Subscription {
        Subscription {
            url: url.into(),
            interval: 60,
            keywords: vec!["k".into()],
            group: "g".into(),
        }
    }

    fn harness(subs: Vec<Subscription>) -> Harness {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let cfg = Config {
            users: vec!["10".into()],
            channels: vec!["@news".into()],
            rss: subs,
            ..Config::default()
        };
        cfg.save(&path).unwrap();
        harness_at(dir, path, cfg)
    }

    fn harness_at(dir: TempDir, path: PathBuf, cfg: Config) -> Harness {
        let recipients = Arc::new(Recipients::from_config(&cfg).unwrap());
        let config = cfg.into_shared();
        let sessions = Arc::new(DialogSessions::new());
        let changed = Arc::new(AtomicUsize::new(0));
        let counter = changed.clone();
        let dispatcher = Dispatcher::new(
            config.clone(),
            path.clone(),
            recipients,
            sessions.clone(),
            Arc::new(Stats::open_in_memory(display_offset()).unwrap()),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        Harness {
            _dir: dir,
            path,
            config,
            sessions,
            changed,
            dispatcher,
        }
    }

    impl Harness {
        async fn say(&self, text: &str) -> Option<String> {
            self.dispatcher
                .handle(&InboundMessage {
                    sender_id: 5,
                    chat_id: 500,
                    text: text.to_string(),
                })
                .await
        }

        async fn subs(&self) -> Vec<Subscription> {
            self.config.read().await.rss.clone()
        }
    }

    #[tokio::test]
    async fn test_add_dialog_commits_and_saves() {
        let h = harness(vec![sub("a")]);

        assert_eq!(h.say("/add").await.as_deref(), Some(PROMPT_ADD_URL));
        assert_eq!(h.say("http://x/feed").await.as_deref(), Some(PROMPT_ADD_INTERVAL));
        // Draft is not visible in the store before the final step.
        assert_eq!(h.subs().await.len(), 1);
        assert_eq!(h.say("abc").await.as_deref(), Some(INVALID_INTERVAL));
        h.say("300").await;
        h.say("rust,tokio").await;
        assert_eq!(h.changed.load(Ordering::SeqCst), 0);
        assert_eq!(h.say("tech").await.as_deref(), Some("RSS subscription added."));

        let expected = Subscription {
            url: "http://x/feed".into(),
            interval: 300,
            keywords: vec!["rust".into(), "tokio".into()],
            group: "tech".into(),
        };
        assert_eq!(h.subs().await, vec![sub("a"), expected.clone()]);
        assert_eq!(h.changed.load(Ordering::SeqCst), 1);
        assert!(!h.sessions.is_open(5));
        assert_eq!(Config::load(&h.path).unwrap().rss[1], expected);
    }

    #[tokio::test]
    async fn test_delete_second_of_three() {
        let h = harness(vec![sub("a"), sub("b"), sub("c")]);

        h.say("/delete").await;
        assert_eq!(h.say("2").await.as_deref(), Some("Deleted subscription: b"));

        assert_eq!(h.subs().await, vec![sub("a"), sub("c")]);
        assert_eq!(h.changed.load(Ordering::SeqCst), 1);
        assert!(!h.sessions.is_open(5));
    }

    #[tokio::test]
    async fn test_invalid_delete_index_clears_without_change() {
        let h = harness(vec![sub("a"), sub("b")]);

        h.say("/delete").await;
        assert_eq!(h.say("7").await.as_deref(), Some(INVALID_DELETE_INDEX));

        assert_eq!(h.subs().await, vec![sub("a"), sub("b")]);
        assert_eq!(h.changed.load(Ordering::SeqCst), 0);
        assert!(!h.sessions.is_open(5));
        // Next plain text is dropped silently.
        assert_eq!(h.say("1").await, None);
    }

    #[tokio::test]
    async fn test_edit_keep_all_leaves_record_unchanged() {
        let h = harness(vec![sub("a"), sub("b")]);

        h.say("/edit").await;
        for input in ["2", "1", "1", "1"] {
            h.say(input).await;
        }
        assert_eq!(h.say("1").await.as_deref(), Some("RSS subscription edited."));

        assert_eq!(h.subs().await, vec![sub("a"), sub("b")]);
        assert_eq!(h.changed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_text_without_dialog_is_ignored() {
        let h = harness(vec![]);
        assert_eq!(h.say("hello there").await, None);
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_keeps_memory_change_and_skips_callback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("config.json");
        let cfg = Config {
            rss: vec![sub("a")],
            ..Config::default()
        };
        let h = harness_at(dir, path, cfg);

        h.say("/delete").await;
        assert_eq!(
            h.say("1").await.as_deref(),
            Some("Subscription deleted, but saving the configuration failed.")
        );
        assert!(h.subs().await.is_empty());
        assert_eq!(h.changed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_save_failure_keeps_new_subscription() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("config.json");
        let h = harness_at(dir, path, Config::default());

        for input in ["/add", "http://x/feed", "60", "1"] {
            h.say(input).await;
        }
        assert_eq!(
            h.say("news").await.as_deref(),
            Some("Subscription added, but saving the configuration failed.")
        );

        let subs = h.subs().await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].url, "http://x/feed");
        assert!(subs[0].keywords.is_empty());
        assert_eq!(h.changed.load(Ordering::SeqCst), 0);
        assert!(!h.sessions.is_open(5));
        assert!(!h.path.exists());
    }

    #[tokio::test]
    async fn test_list_reloads_from_disk() {
        let h = harness(vec![sub("a")]);
        let mut on_disk = Config::load(&h.path).unwrap();
        on_disk.rss.push(sub("http://fresh"));
        on_disk.save(&h.path).unwrap();

        let reply = h.say("/list").await.unwrap();
        assert!(reply.contains("2. 📡  URL: http://fresh"));
        assert_eq!(h.subs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_config_reload_failure_is_reported_and_keeps_memory() {
        let h = harness(vec![sub("a")]);
        std::fs::write(&h.path, "{broken").unwrap();

        let reply = h.say("/config").await.unwrap();
        assert!(reply.starts_with("Failed to load configuration:"));
        assert_eq!(h.subs().await, vec![sub("a")]);
    }

    #[tokio::test]
    async fn test_edit_commit_after_list_shrank_is_rejected() {
        let h = harness(vec![sub("a"), sub("b")]);
        h.say("/edit").await;
        h.say("2").await;
        h.config.write().await.rss.truncate(1);
        for input in ["1", "1", "1"] {
            h.say(input).await;
        }
        let reply = h.say("1").await.unwrap();
        assert!(reply.starts_with("That subscription no longer exists"));
        assert_eq!(h.subs().await, vec![sub("a")]);
        assert_eq!(h.changed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_command_replaces_open_dialog() {
        let h = harness(vec![sub("a")]);
        h.say("/add").await;
        h.say("http://x").await;
        h.say("/delete").await;
        assert_eq!(h.sessions.get(5), Some(Dialog::Delete));
    }

    #[tokio::test]
    async fn test_unknown_command_and_stats() {
        let h = harness(vec![]);
        assert_eq!(h.say("/nope").await.as_deref(), Some(commands::UNKNOWN_COMMAND));
        assert_eq!(h.say("/stats").await, Some(commands::format_stats(0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_sends_replies_to_chat() {
        let h = harness(vec![]);
        let transport = Arc::new(RecordingTransport::new());
        let outbound = OutboundHub::new(transport.clone());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_worker(rx, Arc::new(h.dispatcher), outbound));

        tx.send(InboundMessage {
            sender_id: 1,
            chat_id: 42,
            text: "/start".into(),
        })
        .await
        .unwrap();
        tx.send(InboundMessage {
            sender_id: 1,
            chat_id: 42,
            text: "ignored".into(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
        for _ in 0..20 {
            if transport.sent_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(transport.texts_to(&Recipient::Chat(42)), vec![commands::START_TEXT]);
    }
}
