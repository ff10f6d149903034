use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, error, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use fan_thermald::{application::Application, config::ConfigManager};

mod cli;

use cli::Cli;

const DAEMON_LOG: &str = "/var/tmp/fan_thermald.log";

fn init_log(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "fan_thermald".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create(DAEMON_LOG)
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::load(cli.config)
        .await
        .context("Failed to load configuration")?;
    info!("Using configuration {}", config_manager.path().display());

    let builder = Application::builder().with_config_manager(config_manager);
    let builder = if cli.no_dbus {
        builder.without_dbus()
    } else {
        builder
    };

    builder.build().await?.run().await
}

// The runtime is built after forking so its worker threads live in the daemon
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_log(cli.verbose)?;

    if cli.daemonize {
        into_daemon()?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    info!("fan_thermald {} starting", env!("CARGO_PKG_VERSION"));
    runtime.block_on(run(cli)).inspect_err(|e| error!("{e:#}"))
}
