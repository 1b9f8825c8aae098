use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// 一次读取的结果：一个完整的行，或者输入结束信号
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    Line(String),
    /// 用户在空行上按下 Ctrl-D；这不是错误
    EndOfInput,
}

/// 行读取失败的原因
///
/// 连接中断和输入结束是两件事：前者走错误路径，后者由
/// `ReadEvent::EndOfInput` 表示。
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// 行会话的共享写句柄
///
/// 会话循环和处理器都可能向客户端写行，所以写半部放在锁后面，
/// 可以廉价克隆。同时携带会话标识，处理器用它来打日志。
#[derive(Clone)]
pub struct ShellWriter {
    name: Arc<str>,
    writer: Arc<Mutex<BoxedWriter>>,
}

impl ShellWriter {
    /// 会话标识，形如 `用户名@远端地址`，仅用于日志
    pub fn instance_name(&self) -> &str {
        &self.name
    }

    /// 输出一行，自动追加 CRLF
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await
    }

    pub(crate) async fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}

/// 基于字节流的行会话
///
/// 包装一条双向字节流（生产环境是 SSH 通道流，测试里是内存管道），
/// 在上面做提示符显示和行缓冲。它只负责找行边界，不做任何解析。
///
/// 行规则：
/// - 可见字符回显并缓冲，CR/LF 结束一行
/// - 退格删除最后一个字节
/// - 空行上的 Ctrl-D 是输入结束信号
/// - Ctrl-C 丢弃当前未完成的行
/// - 上下方向键在历史记录中翻找，最多保留 `history_size` 条
pub struct Shell {
    reader: BoxedReader,
    writer: ShellWriter,
    prompt: String,
    pending: BytesMut,
    skip_lf: bool,
    history: Vec<String>,
    history_size: usize,
}

impl Shell {
    pub fn new(
        stream: impl AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
        instance_name: impl Into<String>,
        history_size: usize,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let name: Arc<str> = Arc::from(instance_name.into());
        Self {
            reader: Box::new(reader),
            writer: ShellWriter {
                name,
                writer: Arc::new(Mutex::new(Box::new(writer))),
            },
            prompt: String::new(),
            pending: BytesMut::new(),
            skip_lf: false,
            history: Vec::new(),
            history_size,
        }
    }

    /// 设置提示符；在循环开始前设置一次
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// 会话标识，形如 `用户名@远端地址`
    pub fn instance_name(&self) -> &str {
        self.writer.instance_name()
    }

    /// 克隆一个写句柄，交给处理器持有
    pub fn writer(&self) -> ShellWriter {
        self.writer.clone()
    }

    /// 输出一行，自动追加 CRLF
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        self.writer.write_line(line).await
    }

    /// 已记住的历史行，最旧的在前
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// 读取下一个完整的行
    ///
    /// 先写出提示符，然后逐字节处理输入直到行结束。连接在行中间
    /// 断开时返回 `ReadError::ConnectionClosed`。
    pub async fn read_line(&mut self) -> Result<ReadEvent, ReadError> {
        self.writer.write_raw(self.prompt.as_bytes()).await?;

        let mut line: Vec<u8> = Vec::new();
        // 历史导航状态：nav 是从最新一条往回数的下标
        let mut nav: Option<usize> = None;
        let mut stash: Vec<u8> = Vec::new();

        loop {
            let byte = self.next_byte().await?;

            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\r' | b'\n' => {
                    self.skip_lf = byte == b'\r';
                    self.writer.write_raw(b"\r\n").await?;
                    let text = String::from_utf8_lossy(&line).into_owned();
                    self.remember(&text);
                    return Ok(ReadEvent::Line(text));
                }
                // Ctrl-D：空行上表示输入结束，行中间忽略
                0x04 => {
                    if line.is_empty() {
                        return Ok(ReadEvent::EndOfInput);
                    }
                }
                // Ctrl-C：丢弃当前行，重新给出提示符
                0x03 => {
                    line.clear();
                    nav = None;
                    self.writer.write_raw(b"^C\r\n").await?;
                    self.writer.write_raw(self.prompt.as_bytes()).await?;
                }
                // 退格（BS 或 DEL）
                0x08 | 0x7f => {
                    if !line.is_empty() {
                        line.pop();
                        nav = None;
                        self.writer.write_raw(b"\x08 \x08").await?;
                    }
                }
                // ESC 序列：只关心上下方向键，其余整段吞掉
                0x1b => {
                    if let Some(key) = self.read_escape().await? {
                        match key {
                            b'A' => self.history_up(&mut line, &mut nav, &mut stash).await?,
                            b'B' => self.history_down(&mut line, &mut nav, &stash).await?,
                            _ => {}
                        }
                    }
                }
                // 可见字符和 UTF-8 续字节：缓冲并回显
                0x20..=0x7e | 0x80..=0xff => {
                    line.push(byte);
                    nav = None;
                    self.writer.write_raw(&[byte]).await?;
                }
                // 其余控制字节忽略
                _ => {}
            }
        }
    }

    async fn next_byte(&mut self) -> Result<u8, ReadError> {
        loop {
            if self.pending.has_remaining() {
                return Ok(self.pending.get_u8());
            }
            let mut buf = [0u8; 256];
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                return Err(ReadError::ConnectionClosed);
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// 消费一个 CSI 序列，返回最终字节（如方向键的 'A'/'B'）
    async fn read_escape(&mut self) -> Result<Option<u8>, ReadError> {
        let byte = self.next_byte().await?;
        if byte != b'[' {
            // 不是 CSI，整个序列当作无效输入丢弃
            return Ok(None);
        }
        loop {
            let byte = self.next_byte().await?;
            match byte {
                // 参数和中间字节
                0x20..=0x3f => {}
                // 最终字节
                0x40..=0x7e => return Ok(Some(byte)),
                _ => return Ok(None),
            }
        }
    }

    fn remember(&mut self, text: &str) {
        if self.history_size == 0 || text.is_empty() {
            return;
        }
        // 和上一条相同的行不重复记
        if self.history.last().map(String::as_str) == Some(text) {
            return;
        }
        self.history.push(text.to_string());
        if self.history.len() > self.history_size {
            self.history.remove(0);
        }
    }

    async fn history_up(
        &mut self,
        line: &mut Vec<u8>,
        nav: &mut Option<usize>,
        stash: &mut Vec<u8>,
    ) -> Result<(), ReadError> {
        if self.history.is_empty() {
            return Ok(());
        }
        let next = match *nav {
            None => {
                *stash = line.clone();
                0
            }
            Some(index) if index + 1 < self.history.len() => index + 1,
            Some(index) => index,
        };
        *nav = Some(next);
        let entry = self.history[self.history.len() - 1 - next].clone();
        *line = entry.into_bytes();
        self.redraw(line).await
    }

    async fn history_down(
        &mut self,
        line: &mut Vec<u8>,
        nav: &mut Option<usize>,
        stash: &[u8],
    ) -> Result<(), ReadError> {
        match *nav {
            Some(0) => {
                *nav = None;
                *line = stash.to_vec();
                self.redraw(line).await
            }
            Some(index) => {
                *nav = Some(index - 1);
                let entry = self.history[self.history.len() - index].clone();
                *line = entry.into_bytes();
                self.redraw(line).await
            }
            None => Ok(()),
        }
    }

    /// 擦掉当前行重画：回车、清行、提示符、缓冲内容
    async fn redraw(&self, line: &[u8]) -> Result<(), ReadError> {
        self.writer.write_raw(b"\r\x1b[K").await?;
        self.writer.write_raw(self.prompt.as_bytes()).await?;
        self.writer.write_raw(line).await?;
        Ok(())
    }
}
