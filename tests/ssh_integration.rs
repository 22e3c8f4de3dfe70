//! End-to-end: a real `russh` client against the real `server::run` loop,
//! the way the original implementation's `paramiko`-driven test suite
//! exercises login, the prompt, a command, and a ping interruption
//! against an actual bound socket rather than against in-process stubs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handler as ClientHandler};
use russh::keys::PublicKey;
use russh::ChannelMsg;
use sentryhive::config::Config;
use sentryhive::server;

struct AcceptAnyHostKey;

#[async_trait]
impl ClientHandler for AcceptAnyHostKey {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn write_config(dir: &std::path::Path, port: u16) {
    let config = format!(
        r#"{{
  "host": "127.0.0.1",
  "port": {port},
  "key_file": "host.key",
  "database": "audit.db",
  "network": {{
    "network_ip": "192.168.0.0/24",
    "dns_server": "8.8.8.8",
    "gateway": "192.168.0.1"
  }},
  "virtual_hosts": [
    {{
      "hostname": "test02",
      "ip_address": "192.168.0.232",
      "default": true,
      "env": {{}},
      "valid_logins": {{"testuser": "testpassword"}}
    }}
  ]
}}"#
    );
    std::fs::write(dir.join("config.json"), config).unwrap();
}

/// Poll until the listener accepts a raw TCP connection, mirroring the
/// original suite's "wait for the server thread to bind its port" helper
/// rather than sleeping a fixed guess.
async fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server never bound {addr}");
}

async fn read_until(channel: &mut russh::Channel<client::Msg>, needle: &str, budget: Duration) -> String {
    let deadline = tokio::time::Instant::now() + budget;
    let mut collected = String::new();
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(200), channel.wait()).await {
            Ok(Some(ChannelMsg::Data { data })) => {
                collected.push_str(&String::from_utf8_lossy(&data));
                if collected.contains(needle) {
                    return collected;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    collected
}

#[tokio::test]
async fn login_prompt_command_and_ping_interrupt_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let port = 32822;
    write_config(tmp.path(), port);

    let config = Config::load(tmp.path()).unwrap();
    let working_dir = tmp.path().to_path_buf();
    tokio::spawn(async move {
        let _ = server::run(config, &working_dir).await;
    });

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    wait_for_listener(addr).await;

    let client_config = Arc::new(client::Config::default());
    let mut handle = client::connect(client_config, addr, AcceptAnyHostKey)
        .await
        .expect("client handshake failed");

    let authenticated = handle
        .authenticate_password("testuser", "testpassword")
        .await
        .expect("auth request failed");
    assert!(authenticated, "valid credentials must be accepted");

    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_shell(true).await.unwrap();

    let welcome = read_until(&mut channel, "$ ", Duration::from_secs(5)).await;
    assert!(
        welcome.contains("testuser@test02:/$ "),
        "expected the vhost prompt in: {welcome:?}"
    );

    channel.data(&b"pwd\r"[..]).await.unwrap();
    let pwd_out = read_until(&mut channel, "$ ", Duration::from_secs(5)).await;
    assert!(pwd_out.contains('/'), "pwd output missing in: {pwd_out:?}");
    assert!(pwd_out.contains("testuser@test02:/$ "));

    channel.data(&b"ping test02\r"[..]).await.unwrap();
    let ping_started = read_until(&mut channel, "PING test02", Duration::from_secs(5)).await;
    assert!(ping_started.contains("PING test02 (192.168.0.232)"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    channel.data(&[0x03][..]).await.unwrap();

    let ping_stopped = read_until(&mut channel, "ping statistics", Duration::from_secs(5)).await;
    assert!(ping_stopped.contains("^C"));
    assert!(ping_stopped.contains("--- test02 ping statistics ---"));

    let final_prompt = read_until(&mut channel, "$ ", Duration::from_secs(5)).await;
    assert!(final_prompt.contains("testuser@test02:/$ "));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let port = 32823;
    write_config(tmp.path(), port);

    let config = Config::load(tmp.path()).unwrap();
    let working_dir = tmp.path().to_path_buf();
    tokio::spawn(async move {
        let _ = server::run(config, &working_dir).await;
    });

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    wait_for_listener(addr).await;

    let client_config = Arc::new(client::Config::default());
    let mut handle = client::connect(client_config, addr, AcceptAnyHostKey)
        .await
        .expect("client handshake failed");

    let authenticated = handle
        .authenticate_password("testuser", "wrong")
        .await
        .expect("auth request failed");
    assert!(!authenticated, "wrong password must be rejected");
}
