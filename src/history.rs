//! Bounded, time-ordered per-host sample history.

use crate::models::Sample;
use serde::Serialize;
use std::collections::VecDeque;

/// Samples retained per host before the oldest is evicted.
pub const HISTORY_CAPACITY: usize = 100;

/// Time-ascending buffer of one host's recent samples.
///
/// Owned and mutated exclusively by the manager's drain step; workers never
/// touch it. Inserting beyond capacity evicts the oldest entry.
#[derive(Debug, Clone, Serialize)]
pub struct HostHistory {
    samples: VecDeque<Sample>,
    #[serde(skip)]
    capacity: usize,
}

impl HostHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest once full.
    pub fn push(&mut self, sample: Sample) {
        if self.capacity > 0 && self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples in insertion (time-ascending) order.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for HostHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValues;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn keeps_only_the_most_recent_samples() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut history = HostHistory::new();
        for i in 0..150i64 {
            let mut metrics = MetricValues::new();
            metrics.insert("cpu_usage".to_string(), i as f64);
            history.push(Sample::data("h1", start + Duration::seconds(i), metrics));
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        // oldest 50 evicted, remainder still time-ascending
        let timestamps: Vec<_> = history.iter().filter_map(Sample::timestamp).collect();
        assert_eq!(timestamps.first(), Some(&(start + Duration::seconds(50))));
        assert_eq!(timestamps.last(), Some(&(start + Duration::seconds(149))));
        assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn latest_tracks_the_newest_sample() {
        let mut history = HostHistory::with_capacity(2);
        assert!(history.latest().is_none());

        history.push(Sample::error("h1", "first"));
        history.push(Sample::error("h1", "second"));
        history.push(Sample::error("h1", "third"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest(), Some(&Sample::error("h1", "third")));
    }
}
