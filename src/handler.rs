use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::shell::ShellWriter;

/// 处理器对一次回调的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 继续读取下一行
    Continue,
    /// 请求干净地结束会话：不向客户端报告错误，也不强制非零退出码
    CloseSession,
}

/// 行处理器接口，由嵌入方实现
///
/// 每个连接持有自己的一个实例，不跨连接共享；会话循环退出时随任务
/// 一起销毁，没有单独的清理回调。
///
/// 两个方法都可以返回 `Ok(HandlerOutcome::CloseSession)` 请求干净关闭，
/// 或返回错误请求报告错误后关闭。
#[async_trait]
pub trait ShellHandler: Send {
    /// 每当用户输入完成一行时调用
    ///
    /// 返回错误时，错误文本会被回显给客户端，然后关闭会话。
    async fn handle_line(&mut self, line: &str) -> Result<HandlerOutcome>;

    /// 当用户在空行上按下 Ctrl-D 时调用
    ///
    /// 返回错误时，错误文本会被回显给客户端，然后关闭会话。
    async fn handle_eof(&mut self) -> Result<HandlerOutcome>;
}

/// 处理器工厂：每个连接调用一次，拿到该连接行会话的写句柄
pub type HandlerFactory = dyn Fn(ShellWriter) -> Box<dyn ShellHandler> + Send + Sync;

/// 默认处理器：把每一行和 EOF 事件写进日志，从不主动结束会话
///
/// 嵌入方没有提供工厂时使用。一个按默认配置运行的服务器会一直
/// 处理输入行，直到客户端断开。
pub struct LogHandler {
    writer: ShellWriter,
}

impl LogHandler {
    pub fn new(writer: ShellWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl ShellHandler for LogHandler {
    async fn handle_line(&mut self, line: &str) -> Result<HandlerOutcome> {
        info!(session = %self.writer.instance_name(), line = %line, "收到输入行");
        Ok(HandlerOutcome::Continue)
    }

    async fn handle_eof(&mut self) -> Result<HandlerOutcome> {
        info!(session = %self.writer.instance_name(), "收到 EOF");
        Ok(HandlerOutcome::Continue)
    }
}
