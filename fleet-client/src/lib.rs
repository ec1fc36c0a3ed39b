// === Core modules ===
pub mod resolver;
pub mod server;

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod tui;
pub mod util;

// === CLI entrypoint ===
pub mod cli;

/// Entrypoint used by `main.rs` and tests to run the full CLI.
pub async fn run_cli() -> anyhow::Result<()> {
    cli::cli().await
}
