//! Native messaging host for the rageblock browser extension.
//!
//! Started by the browser, it talks to the extension over stdin/stdout and
//! logs to stderr. It runs until the browser closes the connection.

use directories::ProjectDirs;
use log::{error, info};
use rageblock_lib::{
    clock::SystemClock, config::BlockerConfig, context::BlockerContext, error::AppError,
    native_host::NativeHost, store::SqliteStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RAGEBLOCK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

/// Database path from `RAGEBLOCK_DB`, else the per-user data directory
/// (created if needed).
fn get_db_path() -> Result<PathBuf, AppError> {
    if let Some(path) = std::env::var_os("RAGEBLOCK_DB") {
        return Ok(PathBuf::from(path));
    }
    let proj_dirs = ProjectDirs::from("com", "rageblock", "Rageblock")
        .ok_or_else(|| AppError::Internal("Could not determine project directories".into()))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .map_err(|e| AppError::Internal(format!("Could not create data directory: {e}")))?;
    Ok(data_dir.join("rageblock.db"))
}

fn init_context() -> Result<BlockerContext, AppError> {
    let db_path = get_db_path()?;
    info!("Using database at {}", db_path.display());
    let store = SqliteStore::open(&db_path)?;
    BlockerContext::init(
        Arc::new(store),
        Arc::new(SystemClock),
        BlockerConfig::from_env(),
    )
}

fn main() -> ExitCode {
    init_logging();

    let ctx = match init_context() {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Initialization error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sweeper_handle = ctx.sweeper.start();
    let mut host = NativeHost::new(ctx);

    let result = host.run(&mut std::io::stdin().lock(), &mut std::io::stdout().lock());

    host.context().sweeper.stop();
    if sweeper_handle.join().is_err() {
        error!("Cleanup thread panicked");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Native host error: {e}");
            ExitCode::FAILURE
        }
    }
}
