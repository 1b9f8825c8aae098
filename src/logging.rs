//! 日志系统模块，提供统一的日志初始化

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// 确保日志系统只初始化一次
static INIT: Once = Once::new();

/// 日志系统初始化函数
///
/// 默认级别可以被 `<APP_NAME>_LOG` 环境变量覆盖（EnvFilter 语法）；
/// 设置 `<APP_NAME>_JSON` 时输出 JSON 格式。会同时初始化 log 到
/// tracing 的桥接，使依赖 log crate 的模块也能输出。
///
/// # 示例
/// ```
/// use ssh_shell::setup_logging;
///
/// // 默认 INFO 级别，可通过 SSH_SHELL_LOG 环境变量覆盖
/// setup_logging(tracing::Level::INFO, "SSH_SHELL");
/// ```
pub fn setup_logging(default_level: Level, app_name: &str) {
    INIT.call_once(|| {
        let directive = match default_level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };

        // 环境变量优先；否则本 crate 和依赖库使用同一个默认级别
        let filter = EnvFilter::try_from_env(format!("{}_LOG", app_name))
            .unwrap_or_else(|_| EnvFilter::new(format!("{},ssh_shell={}", directive, directive)));

        // log crate 的消息先桥接进 tracing，再安装 subscriber；
        // 测试里可能已经初始化过，失败直接忽略
        if tracing_log::LogTracer::init().is_err() {
            return;
        }

        if std::env::var(format!("{}_JSON", app_name)).is_ok() {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .ok();
        }

        tracing::info!(
            "日志系统初始化完成 [{} {}]",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
    });
}
