//! Poll worker: drives one host through repeated metric cycles
//!
//! One worker per host, each on its own task, so a slow or dead host never
//! delays the others. Workers own their session and plugin instances and
//! only talk to the rest of the system through the shared sample channel
//! and a cancellation flag.

use crate::metrics::Metric;
use crate::models::{MetricValues, Sample};
use crate::session::Session;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Bound on a single channel send; a stalled consumer costs samples, never a
/// wedged worker.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Polls one host's enabled metrics until cancelled.
///
/// Lifecycle: connect once at startup (one `error` sample and exit on
/// failure, a `connected` sample on success), then poll every interval. A
/// cycle where every plugin comes back absent emits an `error` sample and
/// proactively reconnects the session, since a broken session usually yields
/// absent from every plugin. A cycle where at least one plugin produced
/// values emits a `data` sample with whatever was fetched - partial loss
/// degrades the sample, it does not fail the cycle.
pub struct PollWorker {
    host_id: String,
    session: Box<dyn Session>,
    metrics: Vec<Box<dyn Metric>>,
    interval: Duration,
    tx: mpsc::Sender<Sample>,
    cancel: watch::Receiver<bool>,
}

impl PollWorker {
    pub fn new(
        host_id: String,
        session: Box<dyn Session>,
        metrics: Vec<Box<dyn Metric>>,
        interval: Duration,
        tx: mpsc::Sender<Sample>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            host_id,
            session,
            metrics,
            interval,
            tx,
            cancel,
        }
    }

    /// Runs until cancellation, a startup connect failure, or a fault.
    ///
    /// Faults are contained here: a panicking poll loop becomes one final
    /// `error` sample and the worker exits alone.
    pub async fn run(mut self) {
        info!("worker {} started", self.host_id);
        if let Err(panic) = AssertUnwindSafe(self.poll_loop()).catch_unwind().await {
            let message = panic_message(panic);
            warn!("worker {} died: {}", self.host_id, message);
            self.emit(Sample::error(self.host_id.clone(), message)).await;
        }
        self.session.disconnect();
        debug!("worker {} stopped", self.host_id);
    }

    async fn poll_loop(&mut self) {
        if let Err(e) = self.session.connect_async().await {
            warn!("{}: initial connect failed: {}", self.host_id, e);
            self.emit(Sample::error(self.host_id.clone(), format!("connection failed: {}", e)))
                .await;
            return;
        }
        self.emit(Sample::connected(self.host_id.clone())).await;

        while !self.cancelled() {
            let timestamp = Utc::now();
            let data = self.collect_cycle().await;

            if data.is_empty() {
                self.emit(Sample::error(self.host_id.clone(), "data fetch failed")).await;
                if let Err(e) = self.session.connect_async().await {
                    debug!("{}: reconnect failed: {}", self.host_id, e);
                }
            } else {
                self.emit(Sample::data(self.host_id.clone(), timestamp, data)).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.changed() => {}
            }
        }
    }

    /// Fetches every enabled plugin concurrently and flattens the results
    /// into `<metric>_<subkey>` keys.
    async fn collect_cycle(&self) -> MetricValues {
        let session = self.session.as_ref();
        let fetches = self
            .metrics
            .iter()
            .map(|metric| async move { (metric.name().to_string(), metric.fetch_async(session).await) });

        let mut data = MetricValues::new();
        for (name, values) in futures::future::join_all(fetches).await {
            if let Some(values) = values {
                for (key, value) in values {
                    data.insert(format!("{}_{}", name, key), value);
                }
            }
        }
        data
    }

    async fn emit(&self, sample: Sample) {
        if let Err(e) = self.tx.send_timeout(sample, SEND_TIMEOUT).await {
            warn!("{}: dropping sample, channel unavailable: {}", self.host_id, e);
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
