use std::collections::HashMap;

/// 默认监听地址，与传统 sshd 一致
pub const DEFAULT_BIND: &str = ":22";
/// 默认保留的历史命令条数
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// 一个用户的凭据记录
///
/// 密码以明文形式存储和比较，没有哈希、锁定或限速。
/// 生产环境应当把凭据校验视为可替换的边界（见 `auth` 模块）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub password: String,
}

impl User {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

/// Shell 服务器的静态配置
///
/// 零值（空字符串、0）表示"使用默认值"；默认值替换在服务器启动时
/// 执行一次，之后不再重复应用。
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// 每个会话保留的历史命令条数，0 表示使用默认值
    pub history_size: usize,
    /// 主机密钥文件路径；为 None 时每次启动生成临时密钥
    pub host_key_file: Option<String>,
    /// 用户名到凭据记录的映射
    pub users: HashMap<String, User>,
    /// 监听地址，如 "0.0.0.0:2222"；":port" 形式表示绑定所有接口
    pub bind: String,
}

impl ShellConfig {
    /// 应用默认值，返回生效配置
    ///
    /// 只在引擎启动时调用一次。
    pub fn with_defaults(mut self) -> Self {
        self.history_size = use_or_default(self.history_size, DEFAULT_HISTORY_SIZE);
        self.bind = use_or_default_string(self.bind, DEFAULT_BIND);
        self
    }

    /// 把 ":22" 这种省略主机的写法展开成可绑定的地址
    pub fn socket_addr(&self) -> String {
        if self.bind.starts_with(':') {
            format!("0.0.0.0{}", self.bind)
        } else {
            self.bind.clone()
        }
    }
}

fn use_or_default(value: usize, default_value: usize) -> usize {
    if value == 0 {
        default_value
    } else {
        value
    }
}

fn use_or_default_string(value: String, default_value: &str) -> String {
    if value.is_empty() {
        default_value.to_string()
    } else {
        value
    }
}
