use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use russh::server::{Auth, Msg, Server, Session};
use russh::{Channel, ChannelId, Pty};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::config::ShellConfig;
use crate::handler::{HandlerFactory, HandlerOutcome, LogHandler, ShellHandler};
use crate::key_manager::HostKeyResolver;
use crate::shell::{ReadEvent, Shell, ShellWriter};

/// SSH Shell Server
///
/// 接受认证过的连接，为每个连接建立一个行会话和一个处理器实例，
/// 然后在独立任务里运行读取/分发循环。嵌入方只需要提供配置和
/// 处理器工厂。
#[derive(Clone)]
pub struct ShellServer {
    /// 生效配置；run() 应用过一次默认值之后对所有会话共享只读
    config: Arc<ShellConfig>,
    /// 凭据校验器，所有会话共享只读
    authenticator: Arc<Authenticator>,
    /// 每个连接调用一次的处理器工厂
    factory: Arc<HandlerFactory>,
    /// 会话ID生成器
    next_id: Arc<AtomicUsize>,
    /// 当前处理器所属的会话ID
    id: usize,
    /// 客户端地址
    peer_addr: Option<SocketAddr>,
    /// 通过密码认证的用户名
    username: Option<String>,
    /// 本连接已打开、等待 shell 请求接管的通道
    channels: Arc<Mutex<HashMap<ChannelId, Channel<Msg>>>>,
}

impl ShellServer {
    /// 使用默认处理器创建服务器
    ///
    /// 默认处理器只把输入行写进日志，所以这样配置的服务器会一直
    /// 处理输入，直到客户端断开。
    pub fn new(config: ShellConfig) -> Self {
        Self::with_factory(config, |writer| Box::new(LogHandler::new(writer)))
    }

    /// 使用嵌入方提供的处理器工厂创建服务器
    pub fn with_factory(
        config: ShellConfig,
        factory: impl Fn(ShellWriter) -> Box<dyn ShellHandler> + Send + Sync + 'static,
    ) -> Self {
        let authenticator = Arc::new(Authenticator::new(&config));
        Self {
            config: Arc::new(config),
            authenticator,
            factory: Arc::new(factory),
            next_id: Arc::new(AtomicUsize::new(0)),
            id: 0,
            peer_addr: None,
            username: None,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 生效配置；默认值在 run() 里应用
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Run the server. Blocks until the listener closes or start-up fails.
    pub async fn run(&mut self) -> Result<()> {
        // 默认值只在这里替换一次，之后不再重复应用
        let config = self.config.as_ref().clone().with_defaults();
        self.config = Arc::new(config);

        // 没有主机身份就没有可提供的服务，解析失败直接向调用方返回
        let host_key = HostKeyResolver::new(&self.config)
            .resolve()
            .context("解析主机密钥失败")?;

        let russh_config = russh::server::Config {
            inactivity_timeout: Some(std::time::Duration::from_secs(3600)),
            auth_rejection_time: std::time::Duration::from_secs(3),
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![host_key],
            ..Default::default()
        };

        let addr = self.config.socket_addr();
        info!(addr = %addr, "开始接受 SSH 连接");

        let mut server = self.clone();
        server
            .run_on_address(Arc::new(russh_config), addr.as_str())
            .await
            .with_context(|| format!("绑定监听地址失败: {}", addr))?;
        Ok(())
    }

    /// 会话标识：`用户名@远端地址`，只用于日志
    fn instance_name(&self) -> String {
        let user = self.username.as_deref().unwrap_or("?");
        match self.peer_addr {
            Some(addr) => format!("{}@{}", user, addr),
            None => format!("{}@unknown", user),
        }
    }

    async fn take_channel(&self, channel_id: ChannelId) -> Option<Channel<Msg>> {
        let mut channels = self.channels.lock().await;
        channels.remove(&channel_id)
    }
}

impl Server for ShellServer {
    type Handler = Self;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        let client_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // 每个客户端一个独立的处理器实例和通道表
        let mut handler = self.clone();
        handler.id = client_id;
        handler.peer_addr = peer_addr;
        handler.channels = Arc::new(Mutex::new(HashMap::new()));

        info!(client_id = client_id, peer = ?peer_addr, "新客户端连接");
        handler
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        error!("会话错误: {}", error);
    }
}

impl russh::server::Handler for ShellServer {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if self.authenticator.validate(user, password) {
            info!(session_id = self.id, username = %user, "密码认证成功");
            self.username = Some(user.to_string());
            return Ok(Auth::Accept);
        }

        // 被拒绝的连接由传输层关闭，处理器工厂永远不会被调用
        warn!(session_id = self.id, username = %user, "密码认证失败");
        Ok(Auth::reject())
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        // 只支持密码认证
        info!(session_id = self.id, username = %user, "拒绝公钥认证");
        Ok(Auth::reject())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        // 先存起来，等 shell 请求时交给会话循环接管
        let mut channels = self.channels.lock().await;
        channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        info!(
            session_id = self.id,
            terminal = %term,
            cols = col_width,
            rows = row_height,
            "收到终端请求"
        );
        session.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(channel) = self.take_channel(channel_id).await else {
            error!(session_id = self.id, "找不到对应的通道");
            session.channel_failure(channel_id)?;
            return Ok(());
        };

        let instance_name = self.instance_name();
        info!(session = %instance_name, "新会话开始");

        let mut shell = Shell::new(
            channel.into_stream(),
            instance_name.clone(),
            self.config.history_size,
        );
        shell.set_prompt("> ");
        let handler = (self.factory)(shell.writer());

        // 每个会话一个独立任务；一个会话的失败或 panic 不影响
        // 监听循环和其他会话
        let handle = session.handle();
        tokio::spawn(async move {
            match run_session(&mut shell, handler).await {
                SessionExit::Clean => {
                    info!(session = %instance_name, "会话正常结束");
                }
                SessionExit::Error(err) => {
                    info!(session = %instance_name, error = %err, "会话因错误结束");
                    let _ = handle.exit_status_request(channel_id, 1).await;
                }
            }
            let _ = handle.close(channel_id).await;
        });

        session.channel_success(channel_id)?;
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // 输入由会话循环持有的通道流消费，这里不做处理
        tracing::trace!(
            session_id = self.id,
            channel_id = ?channel,
            len = data.len(),
            "通道数据交给会话循环"
        );
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        info!(session_id = self.id, channel_id = ?channel, "客户端关闭通道");
        Ok(())
    }
}

/// 会话循环的退出方式
#[derive(Debug)]
pub(crate) enum SessionExit {
    /// 干净退出：不向客户端报告错误，也不强制非零退出码
    Clean,
    /// 错误退出：错误文本已经回显给客户端，通道以退出码 1 关闭
    Error(anyhow::Error),
}

/// 单个会话的读取/分发循环
///
/// 读到一行就交给处理器；读到输入结束信号先问 handle_eof。处理器
/// 既不关闭会话也不报错时，被打断的（空）行仍然会走一次
/// handle_line 才回到读取。这是对既有行为的刻意保留，对应测试
/// `eof_continue_redelivers_interrupted_line`。
pub(crate) async fn run_session(
    shell: &mut Shell,
    mut handler: Box<dyn ShellHandler>,
) -> SessionExit {
    loop {
        let line = match shell.read_line().await {
            Ok(ReadEvent::Line(line)) => line,
            Ok(ReadEvent::EndOfInput) => match handler.handle_eof().await {
                Ok(HandlerOutcome::CloseSession) => return SessionExit::Clean,
                Ok(HandlerOutcome::Continue) => String::new(),
                Err(err) => return end_with_error(shell, err).await,
            },
            Err(err) => return end_with_error(shell, err.into()).await,
        };

        match handler.handle_line(&line).await {
            Ok(HandlerOutcome::Continue) => {}
            Ok(HandlerOutcome::CloseSession) => return SessionExit::Clean,
            Err(err) => return end_with_error(shell, err).await,
        }
    }
}

/// 向客户端报告错误：先一个空行，然后是错误文本
///
/// 连接可能已经不可写，写失败时照常结束会话。
async fn end_with_error(shell: &Shell, err: anyhow::Error) -> SessionExit {
    let _ = shell.write_line("").await;
    let _ = shell.write_line(&err.to_string()).await;
    SessionExit::Error(err)
}
