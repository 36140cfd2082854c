#![cfg(not(tarpaulin_include))]

use expense_tracker::app;
use expense_tracker::config::AppConfig;
use std::env;

/// Main entry point for the expense tracker web application
///
/// Settings come from `TRACKER_*` environment variables (see
/// [`AppConfig`]); an optional first argument overrides the bind address.
/// Logging is controlled with `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = AppConfig::from_env()?;
    if let Some(bind_addr) = env::args().nth(1) {
        config.bind_addr = bind_addr;
    }

    log::info!(
        "starting expense tracker (data: {}, users: {})",
        config
            .data_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in memory".to_string()),
        config
            .users_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in memory".to_string()),
    );

    app::run(config).await
}
