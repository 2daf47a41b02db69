//! Heartbeat emitter: one UDP datagram to the Monitor per interval with the
//! current load and catalog size. Fire-and-forget; a lost datagram is
//! covered by the next tick.

use anyhow::Result;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::UdpSocket;

use super::metrics::ConnectionTracker;
use crate::common::protocol::Heartbeat;
use crate::common::shutdown::Shutdown;

pub struct HeartbeatEmitter {
    socket: UdpSocket,
    monitor_address: String,
    server_id: String,
    advertise_host: String,
    tcp_port: u16,
    num_files: u32,
    tracker: ConnectionTracker,
    interval: Duration,
}

impl HeartbeatEmitter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: UdpSocket,
        monitor_address: impl Into<String>,
        server_id: impl Into<String>,
        advertise_host: impl Into<String>,
        tcp_port: u16,
        num_files: u32,
        tracker: ConnectionTracker,
        interval: Duration,
    ) -> Self {
        Self {
            socket,
            monitor_address: monitor_address.into(),
            server_id: server_id.into(),
            advertise_host: advertise_host.into(),
            tcp_port,
            num_files,
            tracker,
            interval,
        }
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// The datagram the next tick would send.
    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            server_id: self.server_id.clone(),
            ip: self.advertise_host.clone(),
            tcp_port: self.tcp_port,
            load: self.tracker.active(),
            num_files: self.num_files,
        }
    }

    pub async fn send_once(&self) -> Result<()> {
        let heartbeat = self.heartbeat();
        self.socket
            .send_to(heartbeat.to_string().as_bytes(), &self.monitor_address)
            .await?;
        debug!(
            "💓 Sent heartbeat: load={}, files={}",
            heartbeat.load, heartbeat.num_files
        );
        Ok(())
    }

    /// Send immediately, then every `interval`, until shutdown. Send errors
    /// are logged and the loop carries on.
    pub async fn run(&self, shutdown: Shutdown) {
        info!(
            "💓 Heartbeats to {} every {:?}",
            self.monitor_address, self.interval
        );
        loop {
            if let Err(e) = self.send_once().await {
                warn!("⚠️  Failed to send heartbeat: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.wait() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn datagram_carries_current_load() {
        let monitor = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tracker = ConnectionTracker::new();
        let emitter = HeartbeatEmitter::new(
            socket,
            monitor.local_addr().unwrap().to_string(),
            "CS1",
            "127.0.0.1",
            7001,
            3,
            tracker.clone(),
            Duration::from_secs(3),
        );

        let _busy = tracker.enter();
        emitter.send_once().await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = monitor.recv_from(&mut buf).await.unwrap();
        let text = std::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(text, "HEARTBEAT CS1 127.0.0.1 7001 1 3");
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let monitor = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let emitter = HeartbeatEmitter::new(
            socket,
            monitor.local_addr().unwrap().to_string(),
            "CS1",
            "127.0.0.1",
            7001,
            0,
            ConnectionTracker::new(),
            Duration::from_millis(20),
        );
        let shutdown = Shutdown::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.trigger();
        });

        tokio::time::timeout(Duration::from_secs(2), emitter.run(shutdown))
            .await
            .expect("emitter ignored shutdown");

        let mut buf = [0u8; 256];
        let (len, _) = monitor.recv_from(&mut buf).await.unwrap();
        assert!(buf[..len].starts_with(b"HEARTBEAT CS1"));
    }
}
