//! Common test utilities and fixtures.

#![allow(dead_code)]

use statsd_agg::core::{Config, ConfigBuilder};
use statsd_agg::sink::{MetricSink, RecordingSink};
use statsd_agg::StatsdService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Loopback config on an ephemeral port.
pub fn loopback_config() -> ConfigBuilder {
    ConfigBuilder::new()
        .host("127.0.0.1")
        .port("0")
        .flush_interval(Duration::from_millis(50))
}

/// Running service wired to a recording sink, plus a client socket.
pub struct TestHarness {
    pub service: StatsdService,
    pub sink: Arc<RecordingSink>,
    pub client: UdpSocket,
    pub target: SocketAddr,
}

impl TestHarness {
    pub async fn start(config: Config) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let service = StatsdService::start(config, Arc::clone(&sink) as Arc<dyn MetricSink>)
            .await
            .expect("service should start on loopback");
        let target = service.local_addrs()[0];
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        Self {
            service,
            sink,
            client,
            target,
        }
    }

    pub async fn send(&self, payload: &str) {
        self.client.send_to(payload.as_bytes(), self.target).await.unwrap();
    }

    /// Wait until the listener has processed `datagrams` datagrams in total.
    pub async fn wait_for_datagrams(&self, datagrams: u64) {
        for _ in 0..200 {
            if self.service.listener_stats().datagrams >= datagrams {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "listener processed {} datagrams, expected {}",
            self.service.listener_stats().datagrams,
            datagrams
        );
    }
}
