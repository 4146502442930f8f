//! StatsD receiver implementation.
//!
//! This module implements the UDP receiver that turns datagrams into
//! store updates, plus the counters it keeps about its own work.

pub mod udp;

use std::sync::atomic::{AtomicU64, Ordering};
pub use udp::{ingest_datagram, IngestReport, UdpListener, MAX_DATAGRAM_SIZE};

/// Running totals maintained by the listener (lock-free)
#[derive(Debug, Default)]
pub struct ListenerStats {
    datagrams: AtomicU64,
    lines_applied: AtomicU64,
    lines_rejected: AtomicU64,
    truncated: AtomicU64,
}

/// Point-in-time copy of [`ListenerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStatsSnapshot {
    pub datagrams: u64,
    pub lines_applied: u64,
    pub lines_rejected: u64,
    pub truncated: u64,
}

impl ListenerStats {
    /// Account for one processed datagram
    pub fn record_datagram(&self, report: &IngestReport) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.lines_applied.fetch_add(report.applied as u64, Ordering::Relaxed);
        self.lines_rejected.fetch_add(report.rejected as u64, Ordering::Relaxed);
    }

    /// Account for a datagram that filled the receive buffer
    pub fn record_truncated(&self) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            lines_applied: self.lines_applied.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
        }
    }
}
