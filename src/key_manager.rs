use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use russh::keys::PrivateKey;

use crate::config::ShellConfig;

/// Resolves the server's host identity key at start-up.
///
/// 配置了密钥文件时从文件加载；文件不存在时生成一个新的 Ed25519
/// 密钥并写回该路径，这样重启后主机身份保持稳定。完全没有配置
/// 路径时使用一次性的临时密钥。
///
/// 解析失败（文件损坏、无法读写）是致命错误，由调用方决定进程
/// 如何退出：没有主机身份就没有可提供的服务。
pub struct HostKeyResolver {
    key_file: Option<PathBuf>,
}

impl HostKeyResolver {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            key_file: config.host_key_file.as_deref().map(PathBuf::from),
        }
    }

    /// Resolve the host key once; the result is stable for the process lifetime.
    pub fn resolve(&self) -> Result<PrivateKey> {
        match &self.key_file {
            Some(path) if path.exists() => load_key(path),
            Some(path) => {
                let key = generate_key()?;
                persist_key(&key, path)?;
                Ok(key)
            }
            None => {
                info!("未配置主机密钥文件，使用临时生成的密钥");
                generate_key()
            }
        }
    }
}

fn load_key(path: &Path) -> Result<PrivateKey> {
    info!("从 {} 加载主机密钥", path.display());
    let key_data = fs::read_to_string(path)
        .with_context(|| format!("读取主机密钥文件失败: {}", path.display()))?;
    russh::keys::decode_secret_key(&key_data, None)
        .with_context(|| format!("解析主机密钥失败: {}", path.display()))
}

fn generate_key() -> Result<PrivateKey> {
    let key = PrivateKey::random(&mut rand::thread_rng(), russh::keys::Algorithm::Ed25519)?;
    Ok(key)
}

/// 把新生成的密钥写到配置的路径，旁边放一份 OpenSSH 格式的公钥
fn persist_key(key: &PrivateKey, path: &Path) -> Result<()> {
    info!("生成新的主机密钥并保存到 {}", path.display());

    let mut key_data = Vec::new();
    russh::keys::encode_pkcs8_pem(key, &mut key_data).context("序列化主机密钥失败")?;
    fs::write(path, &key_data)
        .with_context(|| format!("写入主机密钥文件失败: {}", path.display()))?;

    // 私钥文件只允许属主读写
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    let public_key = key
        .public_key()
        .to_openssh()
        .context("序列化主机公钥失败")?;
    let pub_path = path.with_extension("pub");
    fs::write(&pub_path, format!("{}\n", public_key))
        .with_context(|| format!("写入主机公钥文件失败: {}", pub_path.display()))?;

    Ok(())
}
