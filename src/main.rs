//! `cutover` — переключение трафика с Redis-совместимого источника.
//!
//! Открывает два соединения к источнику, принимает снимок и хвост
//! репликации и завершается, когда финальная запись в служебный ключ
//! вернулась через поток.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use cutover::{
    config::Settings,
    logging::{init_logging, LogFormat, LoggingConfig},
    rdb::LogSnapshotHandler,
    resp::LogCommandHandler,
    transition::{GracefulTransition, TransitionConfig},
    TcpClient,
};
use tokio::net::lookup_host;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cutover")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replication-driven cutover from a Redis-compatible source", long_about = None)]
struct Cli {
    /// Файл настроек (по умолчанию `cutover.toml`, если есть)
    #[arg(short, long, env = "CUTOVER_CONFIG")]
    config: Option<PathBuf>,
    /// Адрес источника, перекрывает `source_addr`
    #[arg(short, long)]
    source: Option<String>,
    #[arg(long)]
    sync_db: Option<u32>,
    #[arg(long)]
    sync_key: Option<String>,
    /// Уровень или директива фильтра логов
    #[arg(long, default_value = "info", env = "CUTOVER_LOG_LEVEL")]
    log_level: String,
    #[arg(long, default_value = "compact", value_parser = parse_format)]
    log_format: LogFormat,
    /// Каталог для файла логов; без него пишем только в консоль
    #[arg(long, env = "CUTOVER_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn parse_format(s: &str) -> Result<LogFormat, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
        ..Default::default()
    };
    if let Some(dir) = &cli.log_dir {
        logging.log_dir = dir.clone();
        logging.file.enabled = true;
    }
    let log_handle = init_logging(logging).context("Failed to initialize logging")?;

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(source) = cli.source {
        settings.source_addr = source;
    }
    if let Some(db) = cli.sync_db {
        settings.sync_db = db;
    }
    if let Some(key) = cli.sync_key {
        settings.sync_key = key;
    }

    let result = run(&settings).await;
    log_handle.shutdown_async(Duration::from_secs(2)).await;
    result
}

async fn run(settings: &Settings) -> Result<()> {
    let addr = lookup_host(&settings.source_addr)
        .await
        .with_context(|| format!("Failed to resolve {}", settings.source_addr))?
        .next()
        .with_context(|| format!("No address for {}", settings.source_addr))?;

    let timeout = settings.connect_timeout();
    let control = TcpClient::connect(addr, timeout).await?;
    let stream = TcpClient::connect(addr, timeout).await?;

    let config = TransitionConfig::from(settings);
    info!(
        source = %addr,
        db = config.sync_db,
        key = %config.sync_key,
        "Starting cutover"
    );

    let transition = GracefulTransition::new(config, control, stream);
    let mut snapshot = LogSnapshotHandler::new();
    transition
        .run(&mut snapshot, LogCommandHandler::new())
        .await?;
    transition.wait_finished().await;

    info!(rows = snapshot.rows(), "Cutover complete");
    Ok(())
}
