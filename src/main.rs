use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::Level;

use ssh_shell::{
    setup_logging, HandlerOutcome, ShellConfig, ShellHandler, ShellServer, ShellWriter, User,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "可嵌入的 SSH 命令行服务器演示", long_about = None)]
struct Args {
    /// 监听地址；":端口" 形式表示绑定所有接口
    #[clap(short, long, default_value = "127.0.0.1:2222")]
    bind: String,

    /// 允许登录的用户，格式为 "用户名:密码"，可以重复指定
    #[clap(short, long = "user")]
    users: Vec<String>,

    /// 主机密钥文件路径；文件不存在时会生成并写入
    #[clap(short = 'k', long)]
    host_key_file: Option<String>,

    /// 每个会话保留的历史命令条数
    #[clap(long, default_value_t = 100)]
    history_size: usize,
}

/// 演示处理器：把每一行原样回显
///
/// `exit`/`quit` 或空行上的 Ctrl-D 干净地结束会话，`fail <消息>`
/// 演示错误上报路径。
struct EchoHandler {
    writer: ShellWriter,
}

#[async_trait]
impl ShellHandler for EchoHandler {
    async fn handle_line(&mut self, line: &str) -> Result<HandlerOutcome> {
        match line {
            "" => Ok(HandlerOutcome::Continue),
            "exit" | "quit" => {
                self.writer.write_line("bye").await?;
                Ok(HandlerOutcome::CloseSession)
            }
            _ if line.starts_with("fail ") => {
                bail!("{}", &line["fail ".len()..])
            }
            _ => {
                self.writer.write_line(line).await?;
                Ok(HandlerOutcome::Continue)
            }
        }
    }

    async fn handle_eof(&mut self) -> Result<HandlerOutcome> {
        self.writer.write_line("bye").await?;
        Ok(HandlerOutcome::CloseSession)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging(Level::INFO, "SSH_SHELL");
    let args = Args::parse();

    let mut users = HashMap::new();
    for entry in &args.users {
        let Some((name, password)) = entry.split_once(':') else {
            bail!("无效的用户参数: {}，应为 用户名:密码", entry);
        };
        users.insert(name.to_string(), User::new(password));
    }
    if users.is_empty() {
        bail!("至少需要一个 --user 用户名:密码");
    }

    let config = ShellConfig {
        history_size: args.history_size,
        host_key_file: args.host_key_file,
        users,
        bind: args.bind,
    };

    let mut server =
        ShellServer::with_factory(config, |writer| Box::new(EchoHandler { writer }));
    server.run().await
}
