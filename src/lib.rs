pub mod utils;

pub mod cli;
pub mod clock;
pub mod db;
pub mod error;
pub mod models;
pub mod overtime;
pub mod scan;
pub mod scanner;
pub mod settings;
pub mod store;

use clap::Parser;
use log::LevelFilter;

pub const DEBUG_ENV: &str = "OVERTIME_KIOSK_DEBUG";

fn init_logging() {
    let level = match std::env::var(DEBUG_ENV) {
        Ok(value) if value == "1" || value.eq_ignore_ascii_case("true") => LevelFilter::Debug,
        _ => LevelFilter::Info,
    };
    // RUST_LOG still refines per-module levels on top of the default.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

pub fn run() -> anyhow::Result<()> {
    init_logging();
    let cli = cli::Cli::parse();

    log::info!("Overtime kiosk starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("overtime-kiosk")
        .build()?;
    runtime.block_on(cli::dispatch(cli))
}
