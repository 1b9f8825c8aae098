pub mod auth;
pub mod config;
pub mod handler;
pub mod key_manager;
pub mod logging;
pub mod shell;
pub mod ssh_server;

// 导出主要结构和函数以便使用
pub use config::{ShellConfig, User};
pub use handler::{HandlerFactory, HandlerOutcome, LogHandler, ShellHandler};
pub use logging::setup_logging;
pub use shell::{ReadError, ReadEvent, Shell, ShellWriter};
pub use ssh_server::ShellServer;
