//! Demonstration binary: highlights one reading against a simulated player.
//!
//! ```text
//! highlight-sync <reading-id> <category> <date> [rate]
//! highlight-sync jn-3-16 gospel 2025-03-09 1.5
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Parse arguments into a [`ReadingKey`].
//! 3. Load [`AppConfig`] from disk (defaults on first run).
//! 4. Create the tokio runtime.
//! 5. Build the configured timing provider and the engine.
//! 6. Start the session, then feed positions from a [`SimulatedPlayer`]
//!    until the reading completes or Ctrl-C is pressed.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::Notify;

use highlight_sync::{
    config::{AppConfig, AppPaths},
    engine::{HighlightEngine, HighlightingState, SessionCallbacks, SessionStart, WordChange},
    feed::{PositionFeed, SimulatedPlayer},
    provider::build_provider,
    timing::{ReadingCategory, ReadingDate, ReadingKey},
};

const USAGE: &str = "usage: highlight-sync <reading-id> <category> <date> [rate]";

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Args {
    key: ReadingKey,
    rate: f64,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let (Some(reading_id), Some(category), Some(date)) = (args.next(), args.next(), args.next())
    else {
        bail!(USAGE);
    };

    let category: ReadingCategory = category
        .parse()
        .with_context(|| format!("invalid category {category:?}"))?;
    let date: ReadingDate = date
        .parse()
        .with_context(|| format!("invalid date {date:?}"))?;
    let rate = match args.next() {
        Some(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("invalid playback rate {raw:?}"))?,
        None => 1.0,
    };
    if args.next().is_some() {
        bail!(USAGE);
    }

    Ok(Args {
        key: ReadingKey::new(reading_id, category, date),
        rate,
    })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Log line for one word transition.  `None` means the position is before
/// the first word.
fn word_change_line(change: &WordChange) -> String {
    match &change.word {
        Some(word) => format!("[{:>6} ms] {:>3}: {}", change.position_ms, word.index, word.text),
        None => format!("[{:>6} ms]      (lead-in)", change.position_ms),
    }
}

async fn run(config: AppConfig, args: Args) -> Result<()> {
    let paths = AppPaths::new();
    let provider = build_provider(&config.provider, &paths);
    let engine = HighlightEngine::new(provider, config.highlight.clone());

    let done = Arc::new(Notify::new());
    let callbacks = SessionCallbacks::new()
        .on_word_change(|change| log::info!("{}", word_change_line(change)))
        .on_complete({
            let done = Arc::clone(&done);
            move || done.notify_one()
        })
        .on_error(|e| log::error!("highlight-sync: {e}"));

    let info = match engine.start_session(args.key.clone(), None, callbacks).await? {
        SessionStart::Started(info) => info,
        SessionStart::NoTimingData => {
            log::info!("highlight-sync: {} has no timing data; nothing to highlight", args.key);
            return Ok(());
        }
        SessionStart::Superseded => return Ok(()),
    };
    log::info!(
        "highlight-sync: {} \"{}\": {} words over {} ms",
        info.key,
        info.reference,
        info.word_count,
        info.duration_ms
    );

    let subscription = engine.subscribe(|state: &HighlightingState| {
        log::debug!(
            "highlight-sync: {:>6}/{} ms word={:?} playing={}",
            state.position_ms,
            state.duration_ms,
            state.word_index,
            state.is_playing
        );
    });

    let player = Arc::new(SimulatedPlayer::new(info.duration_ms).with_rate(args.rate));
    let feed = PositionFeed::spawn(engine.clone(), info.id, player, engine.update_interval());

    tokio::select! {
        _ = done.notified() => log::info!("highlight-sync: reading complete"),
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            log::info!("highlight-sync: interrupted");
        }
    }

    feed.stop();
    subscription.unsubscribe();
    engine.stop();
    Ok(())
}

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments
    let args = parse_args(std::env::args().skip(1))?;

    // 3. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config, args))
}
