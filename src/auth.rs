use std::collections::HashMap;

use crate::config::{ShellConfig, User};

/// 凭据校验器
///
/// 对配置中的用户表做精确匹配：用户名存在且密码逐字节相等才接受。
/// 无状态，可被多个会话并发只读使用。
///
/// 这里是凭据校验的唯一入口，如果要换成哈希存储或外部认证，
/// 只需要替换这个类型。
pub struct Authenticator {
    users: HashMap<String, User>,
}

impl Authenticator {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            users: config.users.clone(),
        }
    }

    /// 校验一对用户名/密码，返回是否接受
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(user) => user.password == password,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_user(name: &str, password: &str) -> ShellConfig {
        let mut users = HashMap::new();
        users.insert(name.to_string(), User::new(password));
        ShellConfig {
            users,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_matching_credentials() {
        let auth = Authenticator::new(&config_with_user("alice", "secret"));
        assert!(auth.validate("alice", "secret"), "正确的用户名和密码应当被接受");
    }

    #[test]
    fn rejects_unknown_user() {
        let auth = Authenticator::new(&config_with_user("alice", "secret"));
        assert!(!auth.validate("bob", "secret"), "未知用户应当被拒绝");
    }

    #[test]
    fn rejects_wrong_password() {
        let auth = Authenticator::new(&config_with_user("alice", "secret"));
        assert!(!auth.validate("alice", "wrong"), "错误密码应当被拒绝");
    }

    #[test]
    fn rejects_everything_with_empty_user_table() {
        let auth = Authenticator::new(&ShellConfig::default());
        assert!(!auth.validate("", ""));
        assert!(!auth.validate("root", "root"));
    }
}
