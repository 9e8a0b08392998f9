//! swiftkit - command-line client for OpenStack Swift object storage.
//!
//! Authenticates against Keystone v2.0, caches the session for the run and
//! exposes the object, container, metadata and temp URL operations of
//! `swiftkit-core` as subcommands.

mod commands;
mod config;
mod credentials;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;
use config::CliConfig;

/// Directory for a daily-rotated log file, in addition to stderr
const LOG_DIR_ENV: &str = "SWIFTKIT_LOG_DIR";

const LOG_FILE_PREFIX: &str = "swiftkit.log";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file writer when dropped.
fn init_tracing() -> Option<WorkerGuard> {
    // RUST_LOG controls the level, e.g. RUST_LOG=swiftkit_core=debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    info!("swiftkit starting");

    let mut cli = CliConfig::load()?;
    commands::run(command, &mut cli).await
}
