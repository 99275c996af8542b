//! End-to-end monitoring flow against stub transports: start a fleet,
//! drain samples into histories, read snapshots, stop cleanly.

use async_trait::async_trait;
use fleetmon::{
    HostConfig, HostHistory, MetricRegistry, MonitorConfig, MonitorManager, Sample, SamplePayload,
    Session, SessionError, SessionState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CPU_CMD: &str = "top -bn1 | grep 'Cpu(s)' | awk '{print $2 + $4}'";
const MEM_TOTAL_CMD: &str = "free -m | grep 'Mem:' | awk '{print $2}'";
const MEM_USED_CMD: &str = "free -m | grep 'Mem:' | awk '{print $3}'";
const DISK_CMD: &str = "df -h / | grep -v Filesystem | awk '{print $5}'";

/// Stub transport answering from a per-host command table.
struct StubSession {
    responses: HashMap<String, String>,
    connected: Mutex<SessionState>,
    fail_connect: bool,
    connects: AtomicU32,
}

impl StubSession {
    fn healthy(responses: &[(&str, &str)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(cmd, out)| (cmd.to_string(), out.to_string()))
                .collect(),
            connected: Mutex::new(SessionState::Disconnected),
            fail_connect: false,
            connects: AtomicU32::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            responses: HashMap::new(),
            connected: Mutex::new(SessionState::Disconnected),
            fail_connect: true,
            connects: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Session for StubSession {
    fn connect(&self) -> Result<(), SessionError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if self.fail_connect {
            return Err(SessionError::Resolve {
                host: "unreachable.internal".to_string(),
                port: 22,
            });
        }
        *self.connected.lock().unwrap() = SessionState::Connected;
        Ok(())
    }

    fn disconnect(&self) {
        *self.connected.lock().unwrap() = SessionState::Disconnected;
    }

    fn state(&self) -> SessionState {
        *self.connected.lock().unwrap()
    }

    fn execute(&self, command: &str) -> Option<String> {
        self.responses.get(command).cloned()
    }
}

fn fleet_config() -> MonitorConfig {
    MonitorConfig {
        interval: 1,
        servers: vec![
            HostConfig {
                id: Some("web".to_string()),
                hostname: "web-1.internal".to_string(),
                username: "mon".to_string(),
                password: Some("pw".to_string()),
                key_filename: None,
                port: 22,
                metrics: vec!["cpu".to_string(), "memory".to_string(), "disk".to_string()],
            },
            HostConfig {
                id: None, // id defaults to the hostname
                hostname: "db-1.internal".to_string(),
                username: "mon".to_string(),
                password: Some("pw".to_string()),
                key_filename: None,
                port: 22,
                metrics: vec!["cpu".to_string(), "bogus-metric".to_string()],
            },
            HostConfig {
                id: Some("dead".to_string()),
                hostname: "dead.internal".to_string(),
                username: "mon".to_string(),
                password: Some("pw".to_string()),
                key_filename: None,
                port: 22,
                metrics: vec!["cpu".to_string()],
            },
        ],
    }
}

fn fleet_manager() -> MonitorManager {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    MonitorManager::new(&fleet_config(), MetricRegistry::with_builtins()).with_session_factory(
        Box::new(|host: &HostConfig| {
            if host.hostname.starts_with("dead") {
                Box::new(StubSession::unreachable())
            } else {
                Box::new(StubSession::healthy(&[
                    (CPU_CMD, "12.5"),
                    (MEM_TOTAL_CMD, "1000"),
                    (MEM_USED_CMD, "250"),
                    (DISK_CMD, "87%"),
                ]))
            }
        }),
    )
}

async fn drain_until(
    manager: &mut MonitorManager,
    host_id: &str,
    predicate: impl Fn(&HostHistory) -> bool,
) -> Vec<fleetmon::HostError> {
    let mut errors = Vec::new();
    for _ in 0..50 {
        errors.extend(manager.drain().await);
        if manager.snapshot().get(host_id).map(&predicate).unwrap_or(false) {
            return errors;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition on '{}' not reached in time", host_id);
}

fn latest_metrics(history: &HostHistory) -> fleetmon::MetricValues {
    match history.latest() {
        Some(Sample {
            payload: SamplePayload::Data { metrics, .. },
            ..
        }) => metrics.clone(),
        other => panic!("expected a data sample, got {:?}", other),
    }
}

#[tokio::test]
async fn fleet_polls_into_bounded_histories() {
    let mut manager = fleet_manager();
    assert!(!manager.is_running());

    manager.start(&["web".to_string(), "db-1.internal".to_string()]);
    assert!(manager.is_running());

    let errors = drain_until(&mut manager, "web", |history| !history.is_empty()).await;
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);

    let metrics = latest_metrics(&manager.snapshot()["web"]);
    assert_eq!(metrics.get("cpu_usage"), Some(&12.5));
    assert_eq!(metrics.get("memory_percentage"), Some(&25.0));
    assert_eq!(metrics.get("memory_used"), Some(&250.0));
    assert_eq!(metrics.get("memory_total"), Some(&1000.0));
    assert_eq!(metrics.get("disk_usage"), Some(&87.0));

    manager.stop().await;
    assert!(!manager.is_running());
}

#[tokio::test]
async fn unknown_metric_type_degrades_to_the_valid_ones() {
    let mut manager = fleet_manager();
    // "db-1.internal" enables cpu plus a type nobody registered
    manager.start(&["db-1.internal".to_string()]);

    drain_until(&mut manager, "db-1.internal", |history| !history.is_empty()).await;
    let metrics = latest_metrics(&manager.snapshot()["db-1.internal"]);
    assert_eq!(metrics.get("cpu_usage"), Some(&12.5));
    assert_eq!(metrics.len(), 1);

    let labels = manager.metric_labels("db-1.internal");
    assert_eq!(labels.get("cpu_usage").map(String::as_str), Some("CPU usage"));
    assert_eq!(labels.len(), 1);

    manager.stop().await;
}

#[tokio::test]
async fn unreachable_host_reports_once_and_stays_isolated() {
    let mut manager = fleet_manager();
    manager.start(&["web".to_string(), "dead".to_string()]);

    // the dead host must not prevent the healthy one from producing data
    let mut errors = drain_until(&mut manager, "web", |history| !history.is_empty()).await;
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        errors.extend(manager.drain().await);
    }

    let dead_errors: Vec<_> = errors.iter().filter(|e| e.server_id == "dead").collect();
    assert_eq!(dead_errors.len(), 1, "worker must not retry startup connects");
    assert!(manager.snapshot()["dead"].is_empty());
    assert!(!manager.snapshot()["web"].is_empty());

    manager.stop().await;
}

#[tokio::test]
async fn stop_is_bounded_and_final() {
    let mut manager = fleet_manager();
    manager.start(&["web".to_string()]);
    drain_until(&mut manager, "web", |history| !history.is_empty()).await;

    let started = std::time::Instant::now();
    manager.stop().await;
    assert!(started.elapsed() < Duration::from_secs(4));

    // snapshot survives, but no further samples appear
    let frozen = manager.snapshot()["web"].len();
    assert!(frozen > 0);
    tokio::time::sleep(Duration::from_millis(150)).await;
    manager.drain().await;
    assert_eq!(manager.snapshot()["web"].len(), frozen);
}
