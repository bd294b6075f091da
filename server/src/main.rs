//! rss2tg binary: load config, start the Telegram bot (commands + subscription dialog), the
//! broadcaster, and the local HTTP API the fetch engine pushes events to.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rss2tg_core::config::{self, Config, DEFAULT_CONFIG_FILE};
use rss2tg_core::im::broadcast::{Broadcaster, Recipients};
use rss2tg_core::im::daemon::OutboundHub;
use rss2tg_core::im::session::DialogSessions;
use rss2tg_core::im::telegram::{self, TelegramTransport};
use rss2tg_core::im::transport::ImTransport;
use rss2tg_core::im::worker::{Dispatcher, SubscriptionsChanged};
use rss2tg_core::stats::Stats;
use rss2tg_server::AppState;

#[derive(Parser, Debug)]
#[command(name = "rss2tg", about = "Relay matched feed items to Telegram and manage subscriptions by chat")]
struct Args {
    /// Settings file (JSON).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// HTTP API port (overrides http.port in the settings file).
    #[arg(long)]
    port: Option<u16>,
    /// Do not start the HTTP API.
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rss2tg=info,rss2tg_core=info,rss2tg_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let cfg = Config::load(&args.config).with_context(|| format!("loading {}", args.config.display()))?;
    let recipients = Arc::new(Recipients::from_config(&cfg)?);
    let token = cfg.bot_token()?;
    let stats = Arc::new(
        Stats::open(&cfg.stats_db, config::display_offset())
            .with_context(|| format!("opening stats db {}", cfg.stats_db.display()))?,
    );
    let port = args.port.unwrap_or(cfg.http.port);
    tracing::info!(
        "[rss2tg] config={} users={} channels={} subscriptions={}",
        args.config.display(),
        recipients.users().len(),
        recipients.channels().len(),
        cfg.rss.len()
    );
    let shared = cfg.into_shared();

    let bot = telegram::connect(&token).await.context("telegram getMe")?;
    let transport: Arc<dyn ImTransport> = Arc::new(TelegramTransport::new(bot.clone()));

    let revision = Arc::new(AtomicU64::new(0));
    let on_subscriptions_changed: SubscriptionsChanged = {
        let revision = revision.clone();
        Arc::new(move || {
            let rev = revision.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!("[rss2tg] event=subscriptions_changed revision={}", rev);
        })
    };

    let broadcaster = Arc::new(Broadcaster::new(
        transport.clone(),
        recipients.clone(),
        stats.clone(),
        config::display_offset(),
    ));

    if !args.no_http {
        let state = AppState {
            config: shared.clone(),
            broadcaster,
            stats: stats.clone(),
            revision,
        };
        tokio::spawn(async move {
            if let Err(e) = rss2tg_server::run_web_server(port, state).await {
                tracing::error!("[rss2tg][http] server stopped error={}", e);
            }
        });
    }

    let dispatcher = Arc::new(Dispatcher::new(
        shared,
        args.config.clone(),
        recipients,
        Arc::new(DialogSessions::new()),
        stats,
        on_subscriptions_changed,
    ));
    let outbound = OutboundHub::new(transport);

    telegram::run_telegram_bot(bot, dispatcher, outbound).await;
    Ok(())
}
