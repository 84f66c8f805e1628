use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
mod config;
mod correlation;
mod error;
mod events;
mod services;
mod utils;

use config::Config;
use correlation::{LaunchRegistry, SystemClock};
use services::{create_window_source, LaunchListener, WindowCorrelator};

#[derive(Parser, Debug)]
#[command(name = "launch-correlator")]
#[command(about = "Сопоставляет запуски приложений с новыми окнами и их проектами")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "launch-correlator.toml")]
    config: String,

    /// Режим сухого запуска (эмуляция запусков и окон)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает logging.filter из конфигурации)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    init_tracing(&config, args.log_level.as_deref())?;

    info!("Запуск launch-correlator v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - запуски и окна эмулируются");
    }

    // Единый реестр на весь процесс, передаётся обоим входящим потокам
    let registry = Arc::new(
        LaunchRegistry::new(config.correlation.timeout_secs, Arc::new(SystemClock))
            .with_skew_tolerance(config.correlation.clock_skew_tolerance_secs),
    );
    let correlator = Arc::new(WindowCorrelator::new(Arc::clone(&registry)));

    let socket_path = utils::resolve_socket_path(&config.ipc.socket_path);
    utils::prepare_socket_path(&socket_path)?;
    let listener = LaunchListener::bind(&socket_path, Arc::clone(&correlator))?;
    let window_source = create_window_source(config.clone(), Arc::clone(&correlator), args.dry_run)?;

    info!("Все компоненты инициализированы");

    // Запуск всех сервисов параллельно
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!("Ошибка в LaunchListener: {}", e);
        }
    });
    let window_handle = tokio::spawn(async move {
        if let Err(e) = window_source.run().await {
            error!("Ошибка в источнике окон: {}", e);
        }
    });

    info!("Все сервисы запущены");

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");

    // Прерываем задачи; Drop слушателя удаляет файл сокета
    listener_handle.abort();
    window_handle.abort();

    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    let shutdown_result = tokio::time::timeout(shutdown_timeout, async {
        let _ = listener_handle.await;
        let _ = window_handle.await;
    })
    .await;

    match shutdown_result {
        Ok(_) => info!("Все сервисы завершили работу корректно"),
        Err(_) => warn!("Таймаут при завершении сервисов"),
    }

    info!("Итоговая статистика: {}", registry.stats());
    info!("launch-correlator завершил работу");
    Ok(())
}

fn init_tracing(config: &Config, cli_level: Option<&str>) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG > --log-level > logging.level + logging.filter
    let fallback = match cli_level {
        Some(level) => level.to_string(),
        None => format!("{},{}", config.logging.level, config.logging.filter),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format.as_str() {
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    Ok(())
}
