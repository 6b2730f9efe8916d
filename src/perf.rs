// SPDX-License-Identifier: MIT OR Apache-2.0
//! Import-pipeline performance accounting.
//!
//! Each import request carries a [`PerformanceImportFile`] through every
//! stage, so slow parses and slow applies can be attributed to a file.
//! Aggregate statistics are collected globally and printed on demand when
//! monitoring is enabled (the `--perf` flag).

use gxhash::{HashMap, HashMapExt};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-file stage timings, all in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceImportFile {
    /// Front-end parse.
    pub index_parse_us: u64,
    /// Callback walk and `IndexFile` construction.
    pub index_build_us: u64,
    /// Reading a previous artifact from the cache.
    pub cache_load_us: u64,
    /// Building the id maps against the USR tables.
    pub querydb_id_map_us: u64,
    /// Applying the packed update under the write lock.
    pub querydb_apply_us: u64,
}

impl PerformanceImportFile {
    pub fn total_us(&self) -> u64 {
        self.index_parse_us
            + self.index_build_us
            + self.cache_load_us
            + self.querydb_id_map_us
            + self.querydb_apply_us
    }
}

/// Global flag toggled by the `--perf` CLI flag.
pub static PERF_MONITORING_ENABLED: AtomicBool = AtomicBool::new(false);

pub static PERF_STATS: Lazy<Mutex<PerfStats>> = Lazy::new(|| Mutex::new(PerfStats::new()));

pub fn enable_performance_monitoring() {
    PERF_MONITORING_ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_performance_monitoring_enabled() -> bool {
    PERF_MONITORING_ENABLED.load(Ordering::Relaxed)
}

#[derive(Debug, Default)]
pub struct PerfStats {
    metrics: HashMap<String, MetricData>,
}

#[derive(Debug, Default)]
struct MetricData {
    count: u64,
    total_duration: Duration,
    min_duration: Option<Duration>,
    max_duration: Option<Duration>,
}

impl PerfStats {
    pub fn new() -> Self {
        Self {
            metrics: HashMap::new(),
        }
    }

    pub fn record(&mut self, name: &str, duration: Duration) {
        let metric = self.metrics.entry(name.to_string()).or_default();
        metric.count += 1;
        metric.total_duration += duration;
        metric.min_duration = Some(match metric.min_duration {
            Some(min) => min.min(duration),
            None => duration,
        });
        metric.max_duration = Some(match metric.max_duration {
            Some(max) => max.max(duration),
            None => duration,
        });
    }

    /// Fold one import's stage timings into the aggregate counters.
    pub fn record_import(&mut self, perf: &PerformanceImportFile) {
        self.record("import_parse", Duration::from_micros(perf.index_parse_us));
        self.record("import_build", Duration::from_micros(perf.index_build_us));
        if perf.cache_load_us > 0 {
            self.record("import_cache_load", Duration::from_micros(perf.cache_load_us));
        }
        self.record(
            "import_id_map",
            Duration::from_micros(perf.querydb_id_map_us),
        );
        self.record("import_apply", Duration::from_micros(perf.querydb_apply_us));
    }

    pub fn print_summary(&self) {
        if self.metrics.is_empty() {
            return;
        }

        println!("\n=== Import performance ===");
        let mut sorted_metrics: Vec<_> = self.metrics.iter().collect();
        sorted_metrics.sort_by_key(|(name, _)| name.as_str());

        for (name, data) in sorted_metrics {
            let avg_duration = data.total_duration / data.count.max(1) as u32;
            println!(
                "{:<24} count={:>6} avg={:>8.2}ms min={:>8.2}ms max={:>8.2}ms total={:>10.2}ms",
                name,
                data.count,
                avg_duration.as_secs_f64() * 1000.0,
                data.min_duration.unwrap_or_default().as_secs_f64() * 1000.0,
                data.max_duration.unwrap_or_default().as_secs_f64() * 1000.0,
                data.total_duration.as_secs_f64() * 1000.0,
            );
        }
    }

    pub fn reset(&mut self) {
        self.metrics.clear();
    }
}

/// Measure the duration of a block and record it under `$name` when
/// monitoring is on.
#[macro_export]
macro_rules! measure {
    ($name:expr, $block:expr) => {{
        let _start = std::time::Instant::now();
        let _result = $block;
        let _duration = _start.elapsed();

        if $crate::perf::is_performance_monitoring_enabled() {
            if let Ok(mut stats) = $crate::perf::PERF_STATS.lock() {
                stats.record($name, _duration);
            }
        }

        _result
    }};
}

/// Records the duration of a scope when dropped.
pub struct PerfGuard {
    name: String,
    start: Instant,
}

impl PerfGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        if is_performance_monitoring_enabled() {
            if let Ok(mut stats) = PERF_STATS.lock() {
                stats.record(&self.name, duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_record_tracks_each_stage() {
        let mut stats = PerfStats::new();
        stats.record_import(&PerformanceImportFile {
            index_parse_us: 1000,
            index_build_us: 500,
            cache_load_us: 0,
            querydb_id_map_us: 50,
            querydb_apply_us: 25,
        });
        // cache_load was zero, so only four metrics exist.
        assert_eq!(stats.metrics.len(), 4);
        assert_eq!(
            stats.metrics["import_parse"].total_duration,
            Duration::from_micros(1000)
        );
    }

    #[test]
    fn total_sums_all_stages() {
        let perf = PerformanceImportFile {
            index_parse_us: 1,
            index_build_us: 2,
            cache_load_us: 3,
            querydb_id_map_us: 4,
            querydb_apply_us: 5,
        };
        assert_eq!(perf.total_us(), 15);
    }
}
