//! Aggregation manager: owns the workers, the shared channel and all
//! per-host histories
//!
//! The manager is the single consumer of the sample channel. Workers produce
//! concurrently; `drain` absorbs whatever is queued into the bounded
//! histories and surfaces error samples to the embedding layer. Rendering is
//! someone else's problem - `snapshot` hands out an owned copy of the
//! histories and never blocks on worker activity.

use crate::config::{HostConfig, MonitorConfig};
use crate::history::HostHistory;
use crate::metrics::MetricRegistry;
use crate::models::{Sample, SamplePayload};
use crate::session::{Session, SshSession};
use crate::worker::PollWorker;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Capacity of the shared worker -> manager channel.
const CHANNEL_CAPACITY: usize = 256;

/// Grace granted to each worker on stop before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Bound on one drain receive attempt.
const DRAIN_WAIT: Duration = Duration::from_millis(100);

/// Builds the session a worker will own for one host. Swappable so tests
/// and exotic transports can replace SSH.
pub type SessionFactory = Box<dyn Fn(&HostConfig) -> Box<dyn Session> + Send + Sync>;

/// Error sample surfaced by [`MonitorManager::drain`] for the embedding
/// layer to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub server_id: String,
    pub message: String,
}

struct WorkerHandle {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owner of the active poll workers and every host's bounded history.
pub struct MonitorManager {
    hosts: HashMap<String, HostConfig>,
    registry: MetricRegistry,
    interval: Duration,
    session_factory: SessionFactory,
    tx: mpsc::Sender<Sample>,
    rx: mpsc::Receiver<Sample>,
    workers: HashMap<String, WorkerHandle>,
    histories: HashMap<String, HostHistory>,
    last_sample_at: Option<Instant>,
    running: bool,
}

impl MonitorManager {
    pub fn new(config: &MonitorConfig, registry: MetricRegistry) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let hosts = config
            .servers
            .iter()
            .map(|host| (host.effective_id().to_string(), host.clone()))
            .collect();
        Self {
            hosts,
            registry,
            interval: Duration::from_secs(config.interval),
            session_factory: Box::new(|host| Box::new(SshSession::for_host(host))),
            tx,
            rx,
            workers: HashMap::new(),
            histories: HashMap::new(),
            last_sample_at: None,
            running: false,
        }
    }

    /// Replaces the SSH session factory.
    pub fn with_session_factory(mut self, factory: SessionFactory) -> Self {
        self.session_factory = factory;
        self
    }

    /// Spawns one poll worker per requested host id. No-op when already
    /// running; unknown host ids are skipped with a warning.
    ///
    /// Histories are reset to the requested host set - a fresh start means a
    /// fresh window.
    pub fn start(&mut self, host_ids: &[String]) {
        if self.running {
            debug!("start ignored, monitoring already running");
            return;
        }

        self.histories.clear();
        for host_id in host_ids {
            let host = match self.hosts.get(host_id) {
                Some(host) => host.clone(),
                None => {
                    warn!("unknown host id '{}', skipping", host_id);
                    continue;
                }
            };

            self.histories.insert(host_id.clone(), HostHistory::new());
            let session = (self.session_factory)(&host);
            let metrics = self.registry.build(&host.metrics);
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let worker = PollWorker::new(
                host_id.clone(),
                session,
                metrics,
                self.interval,
                self.tx.clone(),
                cancel_rx,
            );
            let handle = tokio::spawn(worker.run());
            self.workers.insert(
                host_id.clone(),
                WorkerHandle { cancel: cancel_tx, handle },
            );
        }

        info!("monitoring started for {} host(s)", self.workers.len());
        self.last_sample_at = Some(Instant::now());
        self.running = true;
    }

    /// Cancels every worker, waits up to the grace period each, and aborts
    /// stragglers. No-op when not running. Histories stay readable; samples
    /// still queued on the channel are discarded so nothing new shows up in
    /// snapshots after stop.
    pub async fn stop(&mut self) {
        if !self.running {
            debug!("stop ignored, monitoring not running");
            return;
        }

        for worker in self.workers.values() {
            let _ = worker.cancel.send(true);
        }
        for (host_id, worker) in self.workers.drain() {
            let mut handle = worker.handle;
            match timeout(STOP_GRACE, &mut handle).await {
                Ok(_) => debug!("worker {} stopped cleanly", host_id),
                Err(_) => {
                    warn!("worker {} exceeded the stop grace period, aborting", host_id);
                    handle.abort();
                }
            }
        }

        while self.rx.try_recv().is_ok() {}
        self.running = false;
        info!("monitoring stopped");
    }

    /// Absorbs every sample currently queued on the shared channel.
    ///
    /// Sole consumer of the channel; call it on the embedder's refresh
    /// cadence, independent of the poll interval. `data` samples land in
    /// their host's history, `error` samples are returned for display, and
    /// samples for unknown or removed host ids are discarded.
    pub async fn drain(&mut self) -> Vec<HostError> {
        let mut errors = Vec::new();
        loop {
            match timeout(DRAIN_WAIT, self.rx.recv()).await {
                Ok(Some(sample)) => self.absorb(sample, &mut errors),
                Ok(None) => break,
                Err(_) => break, // channel empty
            }
        }
        errors
    }

    fn absorb(&mut self, sample: Sample, errors: &mut Vec<HostError>) {
        if !self.histories.contains_key(&sample.server_id) {
            debug!("discarding sample for unknown host '{}'", sample.server_id);
            return;
        }
        match sample.payload {
            SamplePayload::Data { .. } => {
                if let Some(history) = self.histories.get_mut(&sample.server_id) {
                    history.push(sample);
                }
                self.last_sample_at = Some(Instant::now());
            }
            SamplePayload::Connected => {
                debug!("host '{}' connected", sample.server_id);
            }
            SamplePayload::Error { message } => {
                warn!("host '{}' reported: {}", sample.server_id, message);
                errors.push(HostError {
                    server_id: sample.server_id,
                    message,
                });
            }
        }
    }

    /// Owned copy of every host's bounded history. Never blocks on worker
    /// activity.
    pub fn snapshot(&self) -> HashMap<String, HostHistory> {
        self.histories.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// When the last `data` sample was absorbed (or monitoring started);
    /// staleness bookkeeping for the presentation layer.
    pub fn last_sample_at(&self) -> Option<Instant> {
        self.last_sample_at
    }

    /// Display labels for a host's enabled metrics, keyed by flattened
    /// `<metric>_<subkey>`.
    pub fn metric_labels(&self, host_id: &str) -> HashMap<String, String> {
        match self.hosts.get(host_id) {
            Some(host) => self.registry.labels_for(&host.metrics),
            None => HashMap::new(),
        }
    }

    /// Configured host ids, for selection UIs.
    pub fn host_ids(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
