//! Service object tying the listener, store and flush cycle together.

use crate::aggregation::{self, FlushStats, MetricStore};
use crate::core::{Config, Result, StatsdError};
use crate::receiver::{ListenerStats, ListenerStatsSnapshot, UdpListener};
use crate::sink::MetricSink;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running StatsD aggregator.
///
/// `start` binds the sockets and spawns the listener task; the host then
/// calls [`flush`](Self::flush) on its own schedule (or uses
/// [`run_until`](Self::run_until)) and finally [`shutdown`](Self::shutdown).
pub struct StatsdService {
    config: Config,
    store: Arc<MetricStore>,
    sink: Arc<dyn MetricSink>,
    stats: Arc<ListenerStats>,
    local_addrs: Vec<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl StatsdService {
    /// Bind the listener and start ingesting.
    ///
    /// Fails if the configuration is invalid or no socket could be bound.
    pub async fn start(config: Config, sink: Arc<dyn MetricSink>) -> Result<Self> {
        config.validate()?;
        config.report_unknown_keys();

        let store = Arc::new(MetricStore::new());
        let stats = Arc::new(ListenerStats::default());
        let listener =
            UdpListener::bind(&config.listener, Arc::clone(&store), Arc::clone(&stats)).await?;
        let local_addrs = listener.local_addrs();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let result = listener.run(shutdown_rx).await;
            if let Err(e) = &result {
                tracing::error!("StatsD listener terminated, no longer ingesting: {}", e);
            }
            result
        });

        tracing::info!("StatsD service started on {:?}", local_addrs);

        Ok(Self {
            config,
            store,
            sink,
            stats,
            local_addrs,
            shutdown_tx,
            listener: Mutex::new(Some(handle)),
        })
    }

    /// Run one flush cycle, emitting to the configured sink.
    pub fn flush(&self) -> FlushStats {
        aggregation::flush(&self.store, &self.config.delete, self.sink.as_ref())
    }

    /// Flush every `flush.interval` until `signal` completes, then flush a
    /// final time and shut down.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.flush.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                _ = ticker.tick() => {
                    self.flush();
                },
            }
        }

        self.flush();
        self.shutdown().await
    }

    /// Stop the listener and wait for its task to exit.
    ///
    /// Safe to call more than once; later calls return `Ok(())` immediately.
    /// Returns the listener's own error if it had already failed.
    pub async fn shutdown(&self) -> Result<()> {
        // Receivers may already be gone if the listener exited.
        let _ = self.shutdown_tx.send(true);

        let handle = self.listener.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let result = handle.await.map_err(StatsdError::from)?;
        tracing::info!("StatsD service stopped");
        result
    }

    /// Whether the listener task is still receiving datagrams.
    pub fn listener_alive(&self) -> bool {
        self.listener.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Addresses the listener is bound to.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn listener_stats(&self) -> ListenerStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for StatsdService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
