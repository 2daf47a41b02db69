#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use micro_cdn::common::LineConnection;
use micro_cdn::content::{ContentConfig, ContentServer};
use micro_cdn::index::{IndexConfig, IndexServer};
use micro_cdn::monitor::{MonitorConfig, MonitorServer};
use micro_cdn::Shutdown;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds or five seconds pass.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub struct Running<T> {
    pub server: Arc<T>,
    pub shutdown: Shutdown,
}

impl<T> Running<T> {
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

pub async fn start_monitor(timeout_ms: u64) -> Running<MonitorServer> {
    let config = MonitorConfig {
        udp_address: "127.0.0.1:0".into(),
        tcp_address: "127.0.0.1:0".into(),
        check_interval_ms: 50,
        heartbeat_timeout_ms: timeout_ms,
        notify_timeout_ms: 1_000,
        ..MonitorConfig::default()
    };
    let server = MonitorServer::bind(config).await.unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(server.clone().run(shutdown.clone()));
    Running { server, shutdown }
}

pub async fn start_index(monitor_address: String) -> Running<IndexServer> {
    let config = IndexConfig {
        listen_address: "127.0.0.1:0".into(),
        notify_address: Some("127.0.0.1:0".into()),
        advertise_host: "127.0.0.1".into(),
        monitor_address,
        monitor_timeout_ms: 1_000,
        ..IndexConfig::default()
    };
    let server = IndexServer::bind(config).await.unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(server.clone().run(shutdown.clone()));
    Running { server, shutdown }
}

pub async fn start_content(
    server_id: &str,
    files_dir: &Path,
    index: SocketAddr,
    monitor_udp: SocketAddr,
) -> Running<ContentServer> {
    let config = ContentConfig {
        server_id: server_id.into(),
        listen_address: "127.0.0.1:0".into(),
        udp_port: 0,
        advertise_host: "127.0.0.1".into(),
        files_dir: Some(files_dir.to_path_buf()),
        index_address: index.to_string(),
        monitor_address: monitor_udp.to_string(),
        heartbeat_interval_ms: 100,
        seed_samples: false,
        request_timeout_ms: 2_000,
        index_timeout_ms: 1_000,
    };
    let server = ContentServer::bind(config).await.unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(server.clone().run(shutdown.clone()));
    Running { server, shutdown }
}

/// Send one command and read one reply line.
pub async fn ask(conn: &mut LineConnection, line: &str) -> String {
    conn.write_line(line).await.unwrap();
    conn.read_line_timeout(TIMEOUT).await.unwrap().unwrap()
}

pub async fn connect(addr: SocketAddr) -> LineConnection {
    LineConnection::connect(&addr.to_string(), TIMEOUT)
        .await
        .unwrap()
}

/// Register a content server by hand, the way a Content Server would.
pub async fn register_by_hand(index: SocketAddr, server_id: &str, port: u16, files: &[(&str, u64)]) {
    let mut conn = connect(index).await;
    assert_eq!(
        ask(&mut conn, &format!("REGISTER {} {} {}", server_id, port, port + 1)).await,
        "OK REGISTERED"
    );
    for (name, size) in files {
        conn.write_line(&format!("ADD_FILE {} {} {}", server_id, name, size))
            .await
            .unwrap();
    }
    assert_eq!(ask(&mut conn, "DONE_FILES").await, "OK FILES_ADDED");
}

pub async fn send_heartbeat(monitor_udp: SocketAddr, server_id: &str, port: u16, load: u32) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let datagram = format!("HEARTBEAT {} 127.0.0.1 {} {} 1", server_id, port, load);
    socket.send_to(datagram.as_bytes(), monitor_udp).await.unwrap();
}
