// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Job timing and status reporting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::BLOCK_DURATION;

/// Average job time above this fraction of the block budget is an overrun.
pub const OVERRUN_FRACTION: f64 = 0.875;

/// Status notifications fanned out to every interested task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Dual mode found A and B at different completed-block counts.
    BlockMismatch { a: u64, b: u64 },
    /// Blocks that completed while a job ran and were never processed.
    BlocksSkipped { count: u64 },
    /// Average job time is too close to the block budget.
    Overrun { average_ms: f64, percent: f64 },
    /// LO phases regenerated.
    Retuned { phase_a: f64, phase_b: f64 },
}

/// Per-job durations, appended by the DSP worker and drained by a monitor.
#[derive(Debug, Clone, Default)]
pub struct ProcessTimes(Arc<Mutex<Vec<Duration>>>);

impl ProcessTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(elapsed);
    }

    pub fn drain(&self) -> Vec<Duration> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Summary of the jobs drained in one monitor pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerfSummary {
    pub jobs: usize,
    pub average: Duration,
    pub max: Duration,
    /// Average as a percentage of the budget.
    pub percent: f64,
    pub overrun: bool,
}

impl PerfSummary {
    pub fn to_event(&self) -> StatusEvent {
        StatusEvent::Overrun {
            average_ms: self.average.as_secs_f64() * 1e3,
            percent: self.percent,
        }
    }
}

pub struct PerformanceMonitor {
    times: ProcessTimes,
    budget: Duration,
}

impl PerformanceMonitor {
    pub fn new(times: ProcessTimes) -> Self {
        Self::with_budget(times, BLOCK_DURATION)
    }

    pub fn with_budget(times: ProcessTimes, budget: Duration) -> Self {
        Self { times, budget }
    }

    /// Drain the recorded times and summarize them; `None` if no job ran.
    pub fn check(&self) -> Option<PerfSummary> {
        let times = self.times.drain();
        if times.is_empty() {
            return None;
        }
        let total: Duration = times.iter().sum();
        let average = total / times.len() as u32;
        let max = times.iter().copied().max().unwrap_or_default();
        let percent = average.as_secs_f64() / self.budget.as_secs_f64() * 100.0;
        let overrun = percent > OVERRUN_FRACTION * 100.0;
        if overrun {
            warn!(
                "DSP overrun: average {:.2} ms over {} jobs ({:.1}% of {} ms budget)",
                average.as_secs_f64() * 1e3,
                times.len(),
                percent,
                self.budget.as_millis()
            );
        } else {
            debug!(
                "DSP load: average {:.2} ms, max {:.2} ms ({:.1}%)",
                average.as_secs_f64() * 1e3,
                max.as_secs_f64() * 1e3,
                percent
            );
        }
        Some(PerfSummary {
            jobs: times.len(),
            average,
            max,
            percent,
            overrun,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties() {
        let times = ProcessTimes::new();
        times.record(Duration::from_millis(3));
        times.clone().record(Duration::from_millis(5));
        assert_eq!(times.len(), 2);
        assert_eq!(
            times.drain(),
            vec![Duration::from_millis(3), Duration::from_millis(5)]
        );
        assert!(times.is_empty());
    }

    #[test]
    fn test_monitor_idle() {
        let monitor = PerformanceMonitor::new(ProcessTimes::new());
        assert!(monitor.check().is_none());
    }

    #[test]
    fn test_monitor_under_budget() {
        let times = ProcessTimes::new();
        let monitor = PerformanceMonitor::new(times.clone());
        for ms in [10, 20, 30] {
            times.record(Duration::from_millis(ms));
        }
        let summary = monitor.check().unwrap();
        assert_eq!(summary.jobs, 3);
        assert_eq!(summary.average, Duration::from_millis(20));
        assert_eq!(summary.max, Duration::from_millis(30));
        assert!((summary.percent - 50.0).abs() < 1e-9);
        assert!(!summary.overrun);
    }

    #[test]
    fn test_monitor_flags_overrun_above_threshold() {
        let times = ProcessTimes::new();
        let monitor = PerformanceMonitor::new(times.clone());
        times.record(Duration::from_millis(34));
        assert!(!monitor.check().unwrap().overrun);
        times.record(Duration::from_millis(36));
        let summary = monitor.check().unwrap();
        assert!(summary.overrun);
        assert!(matches!(summary.to_event(), StatusEvent::Overrun { .. }));
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_string(&StatusEvent::BlocksSkipped { count: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"blocks_skipped","count":2}"#);
    }
}
