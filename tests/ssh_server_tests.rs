use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use russh::server::{Auth, Handler, Server};

use ssh_shell::key_manager::HostKeyResolver;
use ssh_shell::{LogHandler, ShellConfig, ShellServer, User};

fn test_config() -> ShellConfig {
    let mut users = HashMap::new();
    users.insert("admin".to_string(), User::new("password"));
    ShellConfig {
        bind: "127.0.0.1:2222".to_string(),
        users,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_server_creation() {
    let server = ShellServer::new(test_config());

    // 验证配置是否正确设置
    assert_eq!(server.config().bind, "127.0.0.1:2222");
    assert!(server.config().users.contains_key("admin"));
}

#[tokio::test]
async fn test_new_client_handler() {
    let mut server = ShellServer::new(test_config());

    // 每个客户端得到独立的处理程序 - 使用Server trait的方法
    let _handler = <ShellServer as Server>::new_client(&mut server, None);
    let _handler2 = <ShellServer as Server>::new_client(&mut server, None);
}

#[tokio::test]
async fn test_auth_methods() {
    let mut users = HashMap::new();
    users.insert("test_user".to_string(), User::new("test_password"));
    let config = ShellConfig {
        users,
        ..Default::default()
    };
    let mut server = ShellServer::new(config);

    // 1. 密码认证，使用正确的用户名和密码
    let auth_pass_success =
        <ShellServer as Handler>::auth_password(&mut server, "test_user", "test_password")
            .await
            .unwrap();
    assert!(
        matches!(auth_pass_success, Auth::Accept),
        "应当接受正确的用户名和密码认证"
    );

    // 2. 密码认证，使用正确的用户名但错误的密码
    let auth_pass_failure1 =
        <ShellServer as Handler>::auth_password(&mut server, "test_user", "wrong_password")
            .await
            .unwrap();
    assert!(
        !matches!(auth_pass_failure1, Auth::Accept),
        "应当拒绝错误密码的认证"
    );

    // 3. 密码认证，使用错误的用户名和正确的密码
    let auth_pass_failure2 =
        <ShellServer as Handler>::auth_password(&mut server, "wrong_user", "test_password")
            .await
            .unwrap();
    assert!(
        !matches!(auth_pass_failure2, Auth::Accept),
        "应当拒绝错误用户名的认证"
    );

    // 4. 公钥认证应当被拒绝，这个设计只接受密码认证
    let key = russh::keys::PrivateKey::random(
        &mut rand::thread_rng(),
        russh::keys::Algorithm::Ed25519,
    )
    .unwrap();
    let public_key = key.public_key();
    let auth_pubkey_result =
        <ShellServer as Handler>::auth_publickey(&mut server, "test_user", &public_key)
            .await
            .unwrap();
    assert!(
        !matches!(auth_pubkey_result, Auth::Accept),
        "应当拒绝公钥认证"
    );
}

#[tokio::test]
async fn test_rejected_auth_never_constructs_a_handler() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();

    let mut server = ShellServer::with_factory(test_config(), move |writer| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::new(LogHandler::new(writer))
    });

    // 认证被拒绝的连接不应当触达处理器工厂
    let rejected = <ShellServer as Handler>::auth_password(&mut server, "admin", "wrong")
        .await
        .unwrap();
    assert!(!matches!(rejected, Auth::Accept));
    assert_eq!(
        constructed.load(Ordering::SeqCst),
        0,
        "认证被拒绝时不应当构造处理器"
    );

    // 工厂只在 shell 请求时被调用，认证通过本身也不会构造处理器
    let accepted = <ShellServer as Handler>::auth_password(&mut server, "admin", "password")
        .await
        .unwrap();
    assert!(matches!(accepted, Auth::Accept));
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_server_with_key_file() -> Result<()> {
    // 创建临时密钥文件
    let temp_dir = std::env::temp_dir();
    let key_path = temp_dir.join("ssh_shell_test_key");

    // 生成随机密钥并以PKCS8 PEM格式写入文件
    let key = russh::keys::PrivateKey::random(
        &mut rand::thread_rng(),
        russh::keys::Algorithm::Ed25519,
    )?;
    let mut key_data = Vec::new();
    russh::keys::encode_pkcs8_pem(&key, &mut key_data)?;
    std::fs::write(&key_path, key_data)?;

    // 服务器启动时应当加载到同一个主机身份
    let config = ShellConfig {
        host_key_file: Some(key_path.to_string_lossy().to_string()),
        ..test_config()
    };
    let loaded = HostKeyResolver::new(&config).resolve()?;
    assert_eq!(
        key.public_key().to_openssh()?,
        loaded.public_key().to_openssh()?,
        "加载的主机密钥应当和文件里的一致"
    );

    // 清理
    let _ = std::fs::remove_file(key_path);

    Ok(())
}
