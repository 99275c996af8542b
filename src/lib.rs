//! Fleetmon - concurrent multi-host resource monitoring engine
//!
//! Polls a fleet of remote hosts over SSH and keeps a bounded history of
//! resource samples per host:
//! - Pluggable metrics (CPU, memory, disk out of the box)
//! - One isolated polling worker per host with on-demand session reconnect
//! - Bounded per-host histories aggregated from a shared channel
//! - Snapshot interface for dashboards and other consumers
//!
//! The crate is transport-read-only: it runs commands on the monitored hosts
//! and parses their output, it never changes remote state. Rendering,
//! configuration editing and process bootstrap are the embedder's job;
//! everything they need is exposed on [`MonitorManager`].

pub mod config;
pub mod history;
pub mod manager;
pub mod metrics;
pub mod models;
pub mod session;
pub mod worker;

pub use config::{ConfigError, HostConfig, MonitorConfig};
pub use history::{HostHistory, HISTORY_CAPACITY};
pub use manager::{HostError, MonitorManager, SessionFactory};
pub use metrics::{Metric, MetricConstructor, MetricRegistry, SubMetric};
pub use models::{MetricValues, Sample, SamplePayload};
pub use session::{Session, SessionError, SessionState, SshSession, SshTarget};
pub use worker::PollWorker;
