//! Disk usage metric: root filesystem usage percentage from `df`.

use super::{Metric, SubMetric};
use crate::models::MetricValues;
use crate::session::Session;
use async_trait::async_trait;

const USAGE_CMD: &str = "df -h / | grep -v Filesystem | awk '{print $5}'";

const SUB_METRICS: &[SubMetric] = &[SubMetric { key: "usage", label: "Disk usage" }];

/// Root filesystem usage percentage.
#[derive(Debug, Default)]
pub struct DiskMetric;

#[async_trait]
impl Metric for DiskMetric {
    fn name(&self) -> &str {
        "disk"
    }

    fn sub_metrics(&self) -> &[SubMetric] {
        SUB_METRICS
    }

    fn fetch(&self, session: &dyn Session) -> Option<MetricValues> {
        parse(session.execute(USAGE_CMD)?)
    }

    async fn fetch_async(&self, session: &dyn Session) -> Option<MetricValues> {
        parse(session.execute_async(USAGE_CMD).await?)
    }
}

fn parse(output: String) -> Option<MetricValues> {
    let usage: f64 = output.trim().trim_end_matches('%').parse().ok()?;
    let mut values = MetricValues::new();
    values.insert("usage".to_string(), usage);
    Some(values)
}
