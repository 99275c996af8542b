//! CPU usage metric: one remote read, user+system already summed by `top`.

use super::{Metric, SubMetric};
use crate::models::MetricValues;
use crate::session::Session;
use async_trait::async_trait;

const USAGE_CMD: &str = "top -bn1 | grep 'Cpu(s)' | awk '{print $2 + $4}'";

const SUB_METRICS: &[SubMetric] = &[SubMetric { key: "usage", label: "CPU usage" }];

/// Overall CPU usage percentage.
#[derive(Debug, Default)]
pub struct CpuMetric;

#[async_trait]
impl Metric for CpuMetric {
    fn name(&self) -> &str {
        "cpu"
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
    let usage: f64 = output.trim().parse().ok()?;
    let mut values = MetricValues::new();
    values.insert("usage".to_string(), usage);
    Some(values)
}
