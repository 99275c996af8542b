//! Memory usage metric: total and used megabytes plus the derived percentage.

use super::{Metric, SubMetric};
use crate::models::MetricValues;
use crate::session::Session;
use async_trait::async_trait;

const TOTAL_CMD: &str = "free -m | grep 'Mem:' | awk '{print $2}'";
const USED_CMD: &str = "free -m | grep 'Mem:' | awk '{print $3}'";

const SUB_METRICS: &[SubMetric] = &[
    SubMetric { key: "percentage", label: "Memory usage" },
    SubMetric { key: "used", label: "Used memory" },
    SubMetric { key: "total", label: "Total memory" },
];

/// Memory usage from `free -m`. Produces nothing unless both reads succeed.
#[derive(Debug, Default)]
pub struct MemoryMetric;

#[async_trait]
impl Metric for MemoryMetric {
    fn name(&self) -> &str {
        "memory"
    }

    fn sub_metrics(&self) -> &[SubMetric] {
        SUB_METRICS
    }

    fn fetch(&self, session: &dyn Session) -> Option<MetricValues> {
        let total = session.execute(TOTAL_CMD);
        let used = session.execute(USED_CMD);
        combine(total, used)
    }

    // the two reads are independent, so the cooperative path issues them
    // concurrently instead of back to back
    async fn fetch_async(&self, session: &dyn Session) -> Option<MetricValues> {
        let (total, used) = tokio::join!(
            session.execute_async(TOTAL_CMD),
            session.execute_async(USED_CMD),
        );
        combine(total, used)
    }
}

fn combine(total: Option<String>, used: Option<String>) -> Option<MetricValues> {
    let total: f64 = total?.trim().parse().ok()?;
    let used: f64 = used?.trim().parse().ok()?;
    if total == 0.0 {
        return None;
    }
    let percentage = (used / total) * 100.0;

    let mut values = MetricValues::new();
    values.insert("percentage".to_string(), percentage);
    values.insert("used".to_string(), used);
    values.insert("total".to_string(), total);
    Some(values)
}
