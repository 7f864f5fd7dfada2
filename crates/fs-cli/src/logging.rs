use std::{
    fs::OpenOptions,
    io,
    path::Path,
    sync::{
        Mutex, atomic::{AtomicUsize, Ordering}
    },
};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, Registry, fmt::writer::BoxMakeWriter, layer::SubscriberExt, reload, util::SubscriberInitExt};

static RELOAD: OnceCell<reload::Handle<EnvFilter, Registry>> = OnceCell::new();
static LEVEL: AtomicUsize = AtomicUsize::new(DEFAULT_LEVEL);

/// Quietest first; `-v` and `~V` move right.
const LEVELS: [LevelFilter; 5] = [
    LevelFilter::ERROR,
    LevelFilter::WARN,
    LevelFilter::INFO,
    LevelFilter::DEBUG,
    LevelFilter::TRACE,
];

/// Interactive sessions log warnings only, so logs do not interleave with the shell.
const DEFAULT_LEVEL: usize = 1;

/// Install the global subscriber. `RUST_LOG` wins over `-v`; the level can be
/// stepped later with [`increase_verbosity`] / [`decrease_verbosity`].
pub fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let initial = level_for_verbosity(verbosity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(initial));
    let (filter, handle) = reload::Layer::new(filter);

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(log_file.is_none()))
        .try_init()
        .context("installing tracing subscriber")?;

    let _ = RELOAD.set(handle);
    LEVEL.store(level_index(verbosity), Ordering::Relaxed);
    Ok(())
}

pub fn increase_verbosity() -> Option<LevelFilter> {
    step_level(true)
}

pub fn decrease_verbosity() -> Option<LevelFilter> {
    step_level(false)
}

/// `None` until [`init_tracing`] has installed a reloadable filter.
fn step_level(louder: bool) -> Option<LevelFilter> {
    let handle = RELOAD.get()?;
    let next = next_index(LEVEL.load(Ordering::Relaxed), louder);
    LEVEL.store(next, Ordering::Relaxed);
    let level = LEVELS[next];
    if let Err(err) = handle.reload(filter_for(level)) {
        warn!(?err, "log level change failed");
    }
    Some(level)
}

fn next_index(current: usize, louder: bool) -> usize {
    if louder { (current + 1).min(LEVELS.len() - 1) } else { current.saturating_sub(1) }
}

fn level_index(verbosity: u8) -> usize {
    (DEFAULT_LEVEL + usize::from(verbosity)).min(LEVELS.len() - 1)
}

pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    LEVELS[level_index(verbosity)]
}

fn filter_for(level: LevelFilter) -> EnvFilter {
    EnvFilter::default().add_directive(level.into())
}
