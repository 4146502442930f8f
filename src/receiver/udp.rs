//! UDP listener for StatsD datagrams.
//!
//! One socket is bound per resolved local address. A single task waits for
//! any of them to become readable, then performs one non-blocking receive on
//! the ready socket. A `watch` channel wakes the wait promptly on shutdown.

use crate::aggregation::MetricStore;
use crate::core::config::ListenerConfig;
use crate::core::{Result, StatsdError};
use crate::protocol::{parse_bytes, split_lines};
use crate::receiver::ListenerStats;
use futures::future::select_all;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Largest datagram read in one receive; longer payloads are truncated.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Services database consulted when the port is a name such as `statsd`.
pub const SERVICES_DB: &str = "/etc/services";

/// Counts from feeding one datagram into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub applied: usize,
    pub rejected: usize,
}

/// Split `payload` into lines, parse each and apply it to `store`.
///
/// A bad line is logged and skipped; it never prevents the remaining lines
/// of the same datagram from being applied.
pub fn ingest_datagram(store: &MetricStore, payload: &[u8]) -> IngestReport {
    let mut report = IngestReport::default();

    for line in split_lines(payload) {
        let update = match parse_bytes(line) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!("Unable to parse line \"{}\": {}", String::from_utf8_lossy(line), e);
                report.rejected += 1;
                continue;
            },
        };

        match store.apply(&update) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                if e.is_recoverable() {
                    tracing::warn!("Dropping update for \"{}\": {}", update.name, e);
                } else {
                    tracing::error!("Dropping update for \"{}\": {}", update.name, e);
                }
                report.rejected += 1;
            },
        }
    }

    report
}

/// Bound UDP sockets feeding a [`MetricStore`].
pub struct UdpListener {
    sockets: Vec<UdpSocket>,
    store: Arc<MetricStore>,
    stats: Arc<ListenerStats>,
}

impl UdpListener {
    /// Resolve the configured address and bind every result.
    ///
    /// Without a host, binds `[::]` and `0.0.0.0`. Individual bind failures
    /// are logged; startup only fails if no socket could be bound.
    pub async fn bind(
        config: &ListenerConfig,
        store: Arc<MetricStore>,
        stats: Arc<ListenerStats>,
    ) -> Result<Self> {
        let port = resolve_port(&config.port, Path::new(SERVICES_DB)).await?;
        let addrs = resolve(config.host.as_deref(), port).await?;

        let mut sockets = Vec::with_capacity(addrs.len());
        for addr in addrs {
            tracing::debug!("Trying to bind to {} ...", addr);
            match UdpSocket::bind(addr).await {
                Ok(socket) => {
                    tracing::info!("StatsD listener bound to {}", socket.local_addr()?);
                    sockets.push(socket);
                },
                Err(e) => tracing::warn!("bind({}) failed: {}", addr, e),
            }
        }

        if sockets.is_empty() {
            return Err(StatsdError::transport(format!(
                "Unable to create listening socket for {}",
                config.display_target()
            )));
        }

        Ok(Self {
            sockets,
            store,
            stats,
        })
    }

    /// Addresses the sockets are actually bound to.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets.iter().filter_map(|s| s.local_addr().ok()).collect()
    }

    /// Receive until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Returns an error if waiting or receiving fails with anything other
    /// than "would block"; the sockets are closed either way.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
                (ready, index) = wait_readable(&self.sockets) => {
                    ready.map_err(|e| StatsdError::transport(format!("poll failed: {}", e)))?;
                    self.read_socket(&self.sockets[index], &mut buffer)?;
                },
            }
        }

        tracing::info!("StatsD listener stopped");
        Ok(())
    }

    fn read_socket(&self, socket: &UdpSocket, buffer: &mut [u8]) -> Result<()> {
        let len = match socket.try_recv_from(buffer) {
            Ok((len, peer)) => {
                tracing::trace!("Received {} bytes from {}", len, peer);
                len
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => {
                return Err(StatsdError::transport(format!("recv failed: {}", e)));
            },
        };

        if len >= buffer.len() {
            tracing::warn!("Datagram filled the {} byte buffer and may be truncated", buffer.len());
            self.stats.record_truncated();
        }

        let report = ingest_datagram(&self.store, &buffer[..len]);
        self.stats.record_datagram(&report);
        Ok(())
    }
}

/// Turn the configured port into a number, looking names up as UDP
/// services in `services_db`.
async fn resolve_port(port: &str, services_db: &Path) -> Result<u16> {
    let port = port.trim();
    if let Ok(number) = port.parse::<u16>() {
        return Ok(number);
    }

    let services = tokio::fs::read_to_string(services_db).await.map_err(|e| {
        StatsdError::transport(format!(
            "Unable to resolve service \"{}\": cannot read {}: {}",
            port,
            services_db.display(),
            e
        ))
    })?;

    let number = lookup_service(&services, port).ok_or_else(|| {
        StatsdError::transport(format!("Unknown UDP service \"{}\"", port))
    })?;
    tracing::debug!("Resolved service \"{}\" to port {}", port, number);
    Ok(number)
}

/// Find `name` (or an alias) with a `/udp` entry in services(5) format.
fn lookup_service(services: &str, name: &str) -> Option<u16> {
    services.lines().find_map(|line| {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let service = fields.next()?;
        let (port, protocol) = fields.next()?.split_once('/')?;
        if protocol != "udp" {
            return None;
        }
        let matches = service == name || fields.any(|alias| alias == name);
        if matches {
            port.parse().ok()
        } else {
            None
        }
    })
}

async fn resolve(host: Option<&str>, port: u16) -> Result<Vec<SocketAddr>> {
    let Some(host) = host else {
        return Ok(vec![
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        ]);
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| StatsdError::transport(format!("Unable to resolve [{}]:{}: {}", host, port, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(StatsdError::transport(format!(
            "[{}]:{} did not resolve to any address",
            host, port
        )));
    }
    Ok(addrs)
}

/// Resolve once any socket is readable, yielding its index.
async fn wait_readable(sockets: &[UdpSocket]) -> (io::Result<()>, usize) {
    let waits = sockets.iter().map(|socket| Box::pin(socket.readable()));
    let (ready, index, _) = select_all(waits).await;
    (ready, index)
}
