use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// 日志文件名前缀，按天滚动为 `tickvault.log.YYYY-MM-DD`
const LOG_FILE_PREFIX: &str = "tickvault.log";

/// # Summary
/// 初始化全局日志：标准输出，外加可选的按天滚动文件。
///
/// # Arguments
/// * `debug`: 未设置 `RUST_LOG` 时把默认级别提升到 `debug`。
/// * `file_dir`: 日志目录；为空时只输出到标准输出。
///
/// # Returns
/// 文件写入线程的守卫，必须持有到进程退出，否则缓冲中的日志会丢失。
pub fn init(debug: bool, file_dir: Option<&str>) -> Option<WorkerGuard> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    match file_dir.map(str::trim).filter(|d| !d.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}
