use std::env;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

// 日志文件的writer guard需要活到进程结束，否则非阻塞写入线程会提前退出
static LOG_GUARDS: once_cell::sync::OnceCell<Vec<tracing_appender::non_blocking::WorkerGuard>> =
    once_cell::sync::OnceCell::new();

/// 设置日志
///
/// APP_ENV=local 时输出彩色日志到stdout；其他环境写入按天滚动的
/// info.log / error.log 文件（非阻塞writer）。
pub async fn setup_logging() -> anyhow::Result<()> {
    let app_env = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());

    if app_env == "local" {
        let subscriber = Registry::default().with(
            fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .with_writer(std::io::stdout)
                .with_filter(EnvFilter::new("info")),
        );
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let info_file = RollingFileAppender::new(Rotation::DAILY, "log_files", "info.log");
        let error_file = RollingFileAppender::new(Rotation::DAILY, "log_files", "error.log");

        let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);
        let (error_non_blocking, error_guard) = tracing_appender::non_blocking(error_file);
        let _ = LOG_GUARDS.set(vec![info_guard, error_guard]);

        let subscriber = Registry::default()
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .with_writer(info_non_blocking)
                    .with_filter(EnvFilter::new("info")),
            )
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .with_writer(error_non_blocking)
                    .with_filter(EnvFilter::new("error")),
            );

        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
