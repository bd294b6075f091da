//! rss2tg server: Axum HTTP ingestion API for the fetch engine. The Telegram bot lives in the core crate.

mod web_server;

pub use web_server::{router, run_web_server, AppState};
