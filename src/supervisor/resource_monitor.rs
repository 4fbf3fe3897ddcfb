//! Resource and performance monitoring
//!
//! Samples resident memory and tick latency once per supervisor cycle,
//! keeps a bounded history, and raises edge-triggered threshold breaches.
//! Breaches are warnings, never loop-stoppers; only the hard memory ceiling
//! escalates (to a controlled drain, decided by the supervisor).

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Narrow OS collaborator: resident memory of this process
pub trait MemorySampler: Send {
    fn current_memory_bytes(&self) -> Result<u64>;
}

/// Production sampler reading VmRSS from `/proc/self/status`
#[derive(Debug, Default)]
pub struct ProcStatusSampler;

impl MemorySampler for ProcStatusSampler {
    #[cfg(target_os = "linux")]
    fn current_memory_bytes(&self) -> Result<u64> {
        let status = std::fs::read_to_string("/proc/self/status")?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kb: u64 = rest
                    .trim()
                    .trim_end_matches("kB")
                    .trim()
                    .parse()
                    .map_err(|e| {
                        crate::error::HelmsmanError::Internal(format!(
                            "unparseable VmRSS line: {e}"
                        ))
                    })?;
                return Ok(kb * 1024);
            }
        }
        Ok(0)
    }

    #[cfg(not(target_os = "linux"))]
    fn current_memory_bytes(&self) -> Result<u64> {
        // No portable resident-set source; report zero and let thresholds
        // stay quiet rather than guessing.
        Ok(0)
    }
}

/// One monitoring observation, appended each tick
#[derive(Debug, Clone)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub resident_bytes: u64,
    pub last_tick: Duration,
    /// Average tick duration over the retained window
    pub rolling_avg: Duration,
}

/// Threshold breach events returned by `check_thresholds`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdBreach {
    /// Resident memory crossed the warning threshold
    MemoryWarning {
        resident_bytes: u64,
        threshold_bytes: u64,
    },
    /// Resident memory crossed the hard ceiling; the supervisor drains
    MemoryExhausted {
        resident_bytes: u64,
        ceiling_bytes: u64,
    },
    /// Rolling average tick duration exceeds the frozen baseline
    PerformanceDegradation {
        rolling_avg: Duration,
        baseline: Duration,
    },
}

/// Configuration for the resource monitor
#[derive(Debug, Clone)]
pub struct ResourceMonitorConfig {
    /// Memory warning threshold in MB
    pub warning_threshold_mb: u64,
    /// Hard memory ceiling in MB; crossing it drains the supervisor
    pub ceiling_mb: u64,
    /// Number of samples retained
    pub retention: usize,
    /// Ticks used to establish the performance baseline
    pub baseline_ticks: usize,
    /// Rolling average must exceed baseline by this factor to count as
    /// degradation
    pub degradation_factor: f64,
}

impl Default for ResourceMonitorConfig {
    fn default() -> Self {
        Self {
            warning_threshold_mb: 1000,
            ceiling_mb: 4096,
            retention: 100,
            baseline_ticks: 10,
            degradation_factor: 2.0,
        }
    }
}

/// Monitors process memory and loop latency with bounded history
pub struct ResourceMonitor {
    config: ResourceMonitorConfig,
    sampler: Box<dyn MemorySampler>,
    samples: VecDeque<ResourceSample>,
    baseline_window: Vec<Duration>,
    baseline: Option<Duration>,
    above_warning: bool,
    above_ceiling: bool,
    degraded: bool,
}

impl ResourceMonitor {
    pub fn new(config: ResourceMonitorConfig, sampler: Box<dyn MemorySampler>) -> Self {
        let retention = config.retention.max(1);
        Self {
            samples: VecDeque::with_capacity(retention),
            baseline_window: Vec::with_capacity(config.baseline_ticks),
            config,
            sampler,
            baseline: None,
            above_warning: false,
            above_ceiling: false,
            degraded: false,
        }
    }

    /// Record the just-completed tick: read memory, compute the rolling
    /// average, append a sample, evict the oldest beyond retention.
    pub fn sample(&mut self, last_tick: Duration) -> &ResourceSample {
        let resident_bytes = self.sampler.current_memory_bytes().unwrap_or_else(|e| {
            debug!("memory sample unavailable: {}", e);
            0
        });

        if self.baseline.is_none() {
            self.baseline_window.push(last_tick);
            if self.baseline_window.len() >= self.config.baseline_ticks.max(1) {
                let total: Duration = self.baseline_window.iter().sum();
                self.baseline = Some(total / self.baseline_window.len() as u32);
                debug!(baseline = ?self.baseline, "performance baseline frozen");
            }
        }

        while self.samples.len() >= self.config.retention.max(1) {
            self.samples.pop_front();
        }

        let window_total: Duration = self.samples.iter().map(|s| s.last_tick).sum();
        let rolling_avg = (window_total + last_tick) / (self.samples.len() as u32 + 1);

        self.samples.push_back(ResourceSample {
            timestamp: Utc::now(),
            resident_bytes,
            last_tick,
            rolling_avg,
        });
        self.samples.back().expect("sample just pushed")
    }

    /// Compare the latest sample against thresholds.
    ///
    /// Warnings are edge-triggered: one event per crossing into breach, none
    /// while the level merely stays above the threshold.
    pub fn check_thresholds(&mut self) -> Vec<ThresholdBreach> {
        let Some(sample) = self.samples.back() else {
            return Vec::new();
        };

        let mut breaches = Vec::new();
        let warning_bytes = self.config.warning_threshold_mb * BYTES_PER_MB;
        let ceiling_bytes = self.config.ceiling_mb * BYTES_PER_MB;

        if sample.resident_bytes > warning_bytes {
            if !self.above_warning {
                self.above_warning = true;
                breaches.push(ThresholdBreach::MemoryWarning {
                    resident_bytes: sample.resident_bytes,
                    threshold_bytes: warning_bytes,
                });
            }
        } else {
            self.above_warning = false;
        }

        if ceiling_bytes > 0 && sample.resident_bytes > ceiling_bytes {
            if !self.above_ceiling {
                self.above_ceiling = true;
                breaches.push(ThresholdBreach::MemoryExhausted {
                    resident_bytes: sample.resident_bytes,
                    ceiling_bytes,
                });
            }
        } else {
            self.above_ceiling = false;
        }

        if let Some(baseline) = self.baseline {
            let limit = baseline.mul_f64(self.config.degradation_factor.max(1.0));
            if sample.rolling_avg > limit && !baseline.is_zero() {
                if !self.degraded {
                    self.degraded = true;
                    breaches.push(ThresholdBreach::PerformanceDegradation {
                        rolling_avg: sample.rolling_avg,
                        baseline,
                    });
                }
            } else {
                self.degraded = false;
            }
        }

        breaches
    }

    /// Drop the frozen baseline and re-establish it from upcoming ticks
    pub fn recalibrate(&mut self) {
        self.baseline = None;
        self.baseline_window.clear();
        self.degraded = false;
    }

    pub fn baseline(&self) -> Option<Duration> {
        self.baseline
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn latest(&self) -> Option<&ResourceSample> {
        self.samples.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sampler returning a scripted sequence of readings
    struct ScriptedSampler {
        readings: std::cell::RefCell<std::vec::IntoIter<u64>>,
        fallback: u64,
    }

    impl ScriptedSampler {
        fn new(readings: Vec<u64>) -> Self {
            Self {
                readings: std::cell::RefCell::new(readings.into_iter()),
                fallback: 0,
            }
        }
    }

    impl MemorySampler for ScriptedSampler {
        fn current_memory_bytes(&self) -> Result<u64> {
            Ok(self.readings.borrow_mut().next().unwrap_or(self.fallback))
        }
    }

    fn config(retention: usize) -> ResourceMonitorConfig {
        ResourceMonitorConfig {
            warning_threshold_mb: 1000,
            ceiling_mb: 2000,
            retention,
            baseline_ticks: 2,
            degradation_factor: 2.0,
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let sampler = ScriptedSampler::new(vec![]);
        let mut monitor = ResourceMonitor::new(config(5), Box::new(sampler));

        for _ in 0..50 {
            monitor.sample(Duration::from_millis(10));
        }
        assert_eq!(monitor.sample_count(), 5);
    }

    #[test]
    fn test_memory_warning_is_edge_triggered() {
        let mb = BYTES_PER_MB;
        // Rises above 1000MB at tick 3, stays above, dips, rises again
        let sampler = ScriptedSampler::new(vec![
            900 * mb,
            950 * mb,
            1050 * mb,
            1100 * mb,
            1200 * mb,
            800 * mb,
            1050 * mb,
        ]);
        let mut monitor = ResourceMonitor::new(config(10), Box::new(sampler));

        let mut warnings = 0;
        for _ in 0..7 {
            monitor.sample(Duration::from_millis(10));
            warnings += monitor
                .check_thresholds()
                .iter()
                .filter(|b| matches!(b, ThresholdBreach::MemoryWarning { .. }))
                .count();
        }
        // Two crossings into breach, two warnings
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_ceiling_escalation() {
        let mb = BYTES_PER_MB;
        let sampler = ScriptedSampler::new(vec![2100 * mb]);
        let mut monitor = ResourceMonitor::new(config(10), Box::new(sampler));

        monitor.sample(Duration::from_millis(10));
        let breaches = monitor.check_thresholds();
        assert!(breaches
            .iter()
            .any(|b| matches!(b, ThresholdBreach::MemoryExhausted { .. })));
        // The warning edge also fires on the same crossing
        assert!(breaches
            .iter()
            .any(|b| matches!(b, ThresholdBreach::MemoryWarning { .. })));
    }

    #[test]
    fn test_degradation_against_frozen_baseline() {
        let sampler = ScriptedSampler::new(vec![]);
        let mut monitor = ResourceMonitor::new(config(10), Box::new(sampler));

        // Baseline frozen from the first two ticks at 10ms
        monitor.sample(Duration::from_millis(10));
        monitor.sample(Duration::from_millis(10));
        assert_eq!(monitor.baseline(), Some(Duration::from_millis(10)));
        assert!(monitor.check_thresholds().is_empty());

        // Sustained slow ticks push the rolling average past 2x baseline
        let mut degradations = 0;
        for _ in 0..8 {
            monitor.sample(Duration::from_millis(100));
            degradations += monitor
                .check_thresholds()
                .iter()
                .filter(|b| matches!(b, ThresholdBreach::PerformanceDegradation { .. }))
                .count();
        }
        assert_eq!(degradations, 1, "degradation warning must be edge-triggered");

        // Baseline stays frozen despite the slow ticks
        assert_eq!(monitor.baseline(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_recalibrate_resets_baseline() {
        let sampler = ScriptedSampler::new(vec![]);
        let mut monitor = ResourceMonitor::new(config(10), Box::new(sampler));

        monitor.sample(Duration::from_millis(10));
        monitor.sample(Duration::from_millis(10));
        assert!(monitor.baseline().is_some());

        monitor.recalibrate();
        assert!(monitor.baseline().is_none());

        monitor.sample(Duration::from_millis(50));
        monitor.sample(Duration::from_millis(50));
        assert_eq!(monitor.baseline(), Some(Duration::from_millis(50)));
    }
}
