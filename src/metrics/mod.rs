//! Metric plugins and the registry binding type names to them
//!
//! A metric is a named source of one or more numeric sub-values read from a
//! host session (cpu, memory, disk out of the box). The registry maps config
//! type names to plugin constructors so hosts can enable metrics by name and
//! embedders can add their own before the manager starts.
//!
//! Adding a metric type:
//! 1. Implement [`Metric`] in a new module
//! 2. Register a constructor: `registry.register("network", || Box::new(NetworkMetric) as _)`
//! 3. List the type name in the host's `metrics` config entry

use crate::models::MetricValues;
use crate::session::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

pub mod cpu;
pub mod disk;
pub mod memory;

pub use cpu::CpuMetric;
pub use disk::DiskMetric;
pub use memory::MemoryMetric;

/// One field a metric produces: stable sub-key plus display label.
///
/// Sub-keys are namespaced as `<metric>_<subkey>` when flattened into a
/// sample, which keeps the key sets of different plugins disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMetric {
    pub key: &'static str,
    pub label: &'static str,
}

/// Capability every metric plugin implements.
///
/// Plugins are stateless across polls: they describe how to compute values
/// given a session, and hold no per-host state. `fetch` is the required
/// blocking path; `fetch_async` is the cooperative path poll workers prefer,
/// and its default delegates to `fetch`. Implementations that issue several
/// independent remote reads must run them concurrently on the async path
/// (see [`MemoryMetric`]); both paths must produce identical values from
/// identical remote state.
#[async_trait]
pub trait Metric: Send + Sync {
    /// Metric type name; prefixes every produced key.
    fn name(&self) -> &str;

    /// Ordered (sub-key, display label) pairs, fixed for the plugin's
    /// lifetime.
    fn sub_metrics(&self) -> &[SubMetric];

    /// Blocking fetch. `None` means the metric produced nothing this cycle
    /// (a failed read or unparseable output) - never a partial map.
    fn fetch(&self, session: &dyn Session) -> Option<MetricValues>;

    /// Cooperative fetch; defaults to the blocking path.
    async fn fetch_async(&self, session: &dyn Session) -> Option<MetricValues> {
        self.fetch(session)
    }
}

/// Zero-argument plugin constructor stored in the registry.
pub type MetricConstructor = fn() -> Box<dyn Metric>;

/// Explicit metric registry: type name -> constructor.
///
/// Built at startup and handed to the manager - there is no process-wide
/// plugin state. Re-registering a name overwrites the previous binding.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    constructors: HashMap<String, MetricConstructor>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in cpu, memory and disk metrics.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("cpu", || Box::new(CpuMetric) as Box<dyn Metric>);
        registry.register("memory", || Box::new(MemoryMetric) as Box<dyn Metric>);
        registry.register("disk", || Box::new(DiskMetric) as Box<dyn Metric>);
        registry
    }

    /// Associates a type name with a constructor. Last registration wins.
    pub fn register(&mut self, type_name: &str, constructor: MetricConstructor) {
        self.constructors.insert(type_name.to_string(), constructor);
    }

    /// Looks up a constructor; `None` for unknown names.
    pub fn lookup(&self, type_name: &str) -> Option<MetricConstructor> {
        self.constructors.get(type_name).copied()
    }

    /// All registered type names, order unspecified.
    pub fn list_all(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Instantiates the plugins for a host's enabled metric list.
    ///
    /// Unknown type names are skipped with a warning; they never abort host
    /// setup.
    pub fn build(&self, type_names: &[String]) -> Vec<Box<dyn Metric>> {
        let mut metrics = Vec::new();
        for name in type_names {
            match self.lookup(name) {
                Some(constructor) => metrics.push(constructor()),
                None => warn!("unknown metric type '{}', skipping", name),
            }
        }
        metrics
    }

    /// Display labels for a metric list, keyed by flattened `<name>_<subkey>`.
    pub fn labels_for(&self, type_names: &[String]) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        for metric in self.build(type_names) {
            for sub in metric.sub_metrics() {
                labels.insert(format!("{}_{}", metric.name(), sub.key), sub.label.to_string());
            }
        }
        labels
    }
}
