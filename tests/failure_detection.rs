mod common;

use std::time::Duration;

use common::*;
use micro_cdn::client::CdnClient;
use micro_cdn::common::protocol::ServerStatus;
use tempfile::tempdir;
use tokio::net::TcpListener;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_server_is_marked_dead_on_the_index() {
    let files = tempdir().unwrap();
    std::fs::write(files.path().join("a.txt"), vec![7u8; 100]).unwrap();

    let monitor = start_monitor(400).await;
    let index = start_index(monitor.server.tcp_addr().unwrap().to_string()).await;
    let index_addr = index.server.local_addr().unwrap();

    let store = monitor.server.store();
    wait_until("the Index Server to subscribe", || {
        let store = store.clone();
        async move { store.notification_target().await.is_some() }
    })
    .await;

    let content = start_content(
        "CS1",
        files.path(),
        index_addr,
        monitor.server.udp_addr().unwrap(),
    )
    .await;

    let registry = index.server.registry();
    wait_until("CS1 on both sides", || {
        let registry = registry.clone();
        let store = store.clone();
        async move {
            !registry.hosts("a.txt").await.is_empty() && store.server("CS1").await.is_some()
        }
    })
    .await;

    content.stop();

    // Only the SERVER_DOWN notice can flip the record; nobody queries the index.
    wait_until("CS1 to be marked dead", || {
        let registry = registry.clone();
        async move {
            matches!(
                registry.server("CS1").await,
                Some(record) if record.status == ServerStatus::Dead
            )
        }
    })
    .await;

    let client = CdnClient::new(index_addr.to_string()).with_timeouts(TIMEOUT, TIMEOUT);
    assert!(client.locate("a.txt").await.unwrap().is_none());

    index.stop();
    monitor.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_notice_per_failure_and_recovery_is_quiet() {
    let monitor = start_monitor(300).await;
    let monitor_udp = monitor.server.udp_addr().unwrap();

    let index_stub = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let stub_port = index_stub.local_addr().unwrap().port();
    let mut query = connect(monitor.server.tcp_addr().unwrap()).await;
    assert_eq!(
        ask(&mut query, &format!("REGISTER_INDEX 127.0.0.1 {}", stub_port)).await,
        "OK INDEX_REGISTERED"
    );

    send_heartbeat(monitor_udp, "CS1", 7001, 0).await;

    let (socket, _) = tokio::time::timeout(TIMEOUT, index_stub.accept())
        .await
        .unwrap()
        .unwrap();
    let mut notice = micro_cdn::common::LineConnection::new(socket);
    let line = notice.read_line_timeout(TIMEOUT).await.unwrap().unwrap();
    assert!(line.starts_with("SERVER_DOWN CS1 "), "got {:?}", line);

    let store = monitor.server.store();
    assert_eq!(
        store.server("CS1").await.unwrap().status,
        ServerStatus::Dead
    );

    // Still dead after several more sweeps: no second notice.
    let second = tokio::time::timeout(Duration::from_millis(500), index_stub.accept()).await;
    assert!(second.is_err());

    send_heartbeat(monitor_udp, "CS1", 7001, 2).await;
    wait_until("CS1 to come back", || {
        let store = store.clone();
        async move {
            matches!(
                store.server("CS1").await,
                Some(record) if record.status == ServerStatus::Alive && record.load == 2
            )
        }
    })
    .await;

    monitor.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitor_lists_heartbeat_state() {
    let monitor = start_monitor(5_000).await;
    let monitor_udp = monitor.server.udp_addr().unwrap();

    send_heartbeat(monitor_udp, "CS2", 7101, 3).await;
    send_heartbeat(monitor_udp, "CS1", 7001, 1).await;
    let store = monitor.server.store();
    wait_until("both heartbeats", || {
        let store = store.clone();
        async move { store.list_servers().await.len() == 2 }
    })
    .await;

    let mut query = connect(monitor.server.tcp_addr().unwrap()).await;
    query.write_line("LIST_SERVERS").await.unwrap();
    let lines = query.read_listing(TIMEOUT).await.unwrap();
    assert_eq!(
        lines,
        vec![
            "SERVER CS1 127.0.0.1 7001 1 alive".to_string(),
            "SERVER CS2 127.0.0.1 7101 3 alive".to_string(),
        ]
    );

    monitor.stop();
}
