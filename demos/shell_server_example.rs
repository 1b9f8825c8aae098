use std::collections::HashMap;

use ssh_shell::{setup_logging, ShellConfig, ShellServer, User};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，使用DEBUG级别
    setup_logging(Level::DEBUG, "SSH_SHELL");

    let mut users = HashMap::new();
    users.insert("user".to_string(), User::new("notsecure"));

    // 其余字段（历史条数、监听地址的主机部分）在启动时取默认值
    let config = ShellConfig {
        bind: ":2222".to_string(),
        users,
        ..Default::default()
    };

    info!(addr = %config.bind, "启动 SSH shell 示例服务器");

    // 默认处理器只把输入行写进日志；嵌入方通过
    // ShellServer::with_factory 接入自己的行处理逻辑
    let mut server = ShellServer::new(config);
    server.run().await
}
