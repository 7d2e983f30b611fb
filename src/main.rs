//! A-share paper trading engine - command-line entry point
//!
//! This binary provides three subcommands:
//! - run: start the engine (background matching + persistence loops)
//! - status: print the portfolio report from the last persisted snapshot
//! - report: print the trade history from the last persisted snapshot

use anyhow::{Context, Result};
use ashare_paper_trader::calendar::TradingCalendar;
use ashare_paper_trader::config::Config;
use ashare_paper_trader::market_data::{EastmoneyMarketDataSource, MarketDataSource, PriceCache};
use ashare_paper_trader::matching::MatchingEngine;
use ashare_paper_trader::persistence::{self, StatePersistor};
use ashare_paper_trader::service::TradingService;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ashare-paper-trader")]
#[command(about = "Paper trading engine for China A-share equities", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the engine: background matching loop + periodic snapshot flush
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,
    },

    /// Print the portfolio report from the last persisted snapshot
    Status {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,
    },

    /// Print the trade history from the last persisted snapshot
    Report {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn load_config(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path, "falling back to default configuration");
            Config::default()
        }
    }
}

async fn cmd_run(config: Config) -> Result<()> {
    let calendar = TradingCalendar::weekdays_only();
    let source: Box<dyn MarketDataSource> = Box::new(EastmoneyMarketDataSource::new());
    let prices = Arc::new(PriceCache::with_ttl(
        source,
        Duration::from_millis(config.price_cache_ttl_ms),
    ));
    let service = Arc::new(TradingService::new(config.clone(), calendar, prices));

    let snapshot_path = PathBuf::from(&config.snapshot_path);
    if let Some(parent) = snapshot_path.parent() {
        std::fs::create_dir_all(parent).context("creating snapshot directory")?;
    }
    let persistor = Arc::new(StatePersistor::new(
        service.clone(),
        snapshot_path,
        Duration::from_secs(config.persist_interval_secs),
    ));
    persistor.load_into_target().await?;

    let matching = MatchingEngine::new(
        service.clone(),
        Duration::from_millis(config.match_interval_ms),
    );

    let (matching_shutdown_tx, matching_shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (persist_shutdown_tx, persist_shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    let matching_handle = tokio::spawn(async move { matching.run(matching_shutdown_rx).await });
    let persistor_task = persistor.clone();
    let persist_handle =
        tokio::spawn(async move { persistor_task.run(persist_shutdown_rx).await });

    info!("engine running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutdown requested");

    let _ = matching_shutdown_tx.send(()).await;
    let _ = persist_shutdown_tx.send(()).await;
    let _ = matching_handle.await;
    let _ = persist_handle.await;

    persistor.flush_now().await;
    info!("engine stopped cleanly");
    Ok(())
}

fn cmd_status(config: Config) -> Result<()> {
    let path = PathBuf::from(&config.snapshot_path);
    if !path.exists() {
        println!("no snapshot found at {}", path.display());
        return Ok(());
    }
    let snapshot = persistence::load(&path).context("loading snapshot")?;
    let ledger = snapshot.ledger;

    println!("cash:               {}", ledger.cash);
    println!("frozen cash:        {}", ledger.frozen_cash);
    println!("today realized pnl: {}", ledger.today_realized_pnl);
    println!("pending orders:     {}", snapshot.book.pending.len());
    println!("positions:");
    for (symbol, lots) in &ledger.positions {
        let total: u64 = lots.iter().map(|l| l.quantity).sum();
        println!("  {symbol}: {total} shares across {} lot(s)", lots.len());
    }
    Ok(())
}

fn cmd_report(config: Config) -> Result<()> {
    let path = PathBuf::from(&config.snapshot_path);
    if !path.exists() {
        println!("no snapshot found at {}", path.display());
        return Ok(());
    }
    let snapshot = persistence::load(&path).context("loading snapshot")?;
    for fill in &snapshot.ledger.trade_journal {
        println!(
            "{} {:?} {} {} @ {} fee={} pnl={}",
            fill.filled_at,
            fill.side,
            fill.symbol,
            fill.quantity,
            fill.price,
            fill.fee,
            fill.realized_pnl
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Status { .. } => "status",
        Commands::Report { .. } => "report",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(&config);
            let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
            runtime.block_on(cmd_run(config))
        }
        Commands::Status { config } => cmd_status(load_config(&config)),
        Commands::Report { config } => cmd_report(load_config(&config)),
    }
}
