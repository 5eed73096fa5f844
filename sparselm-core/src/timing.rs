use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::Write,
    path::Path,
    time::{Duration, Instant},
};

/// A record of timing information for a solver step.
///
/// This structure captures timing information for individual
/// steps within ADMM iterations, useful for spotting which step
/// dominates a fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Name of the solver step (e.g., "update_x", "update_z")
    pub step_name: String,
    /// The iteration number when this step was executed
    pub iteration: usize,
    /// Duration of the step in milliseconds
    pub duration_ms: f64,
    /// Unix timestamp when the step was recorded
    pub timestamp: u64,
}

/// Performance tracking for solver runs.
///
/// `TimingTracker` collects step timings from [`crate::problem::ADMMSolver`] and provides
/// summary statistics and CSV export. Estimators that run several solves (adaptive
/// reweighting, support searches) merge the trackers of every solve into one.
#[derive(Debug, Clone, Default)]
pub struct TimingTracker {
    /// Collection of step timing records
    step_timings: Vec<TimingRecord>,
    /// Current iteration number for new recordings
    current_iteration: usize,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_iteration(&mut self) {
        self.current_iteration += 1;
    }

    pub fn current_iteration(&self) -> usize {
        self.current_iteration
    }

    pub fn record_step(&mut self, step_name: &str, duration: Duration) {
        let record = TimingRecord {
            step_name: step_name.to_string(),
            iteration: self.current_iteration,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        self.step_timings.push(record);
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.step_timings
    }

    /// Appends the records of another tracker, shifting its iterations after ours.
    pub fn merge(&mut self, other: &TimingTracker) {
        let offset = self.current_iteration;
        for record in &other.step_timings {
            let mut record = record.clone();
            record.iteration += offset;
            self.step_timings.push(record);
        }
        self.current_iteration += other.current_iteration;
    }

    pub fn write_step_timings_to_csv<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;

        writeln!(file, "step_name,iteration,duration_ms,timestamp")?;

        for record in &self.step_timings {
            writeln!(
                file,
                "{},{},{:.3},{}",
                record.step_name, record.iteration, record.duration_ms, record.timestamp
            )?;
        }

        Ok(())
    }

    /// Returns (average ms, max ms, count) per step name.
    pub fn get_step_statistics(&self) -> HashMap<String, (f64, f64, usize)> {
        let mut stats = HashMap::new();

        for record in &self.step_timings {
            let entry = stats
                .entry(record.step_name.clone())
                .or_insert((0.0f64, 0.0f64, 0));
            entry.0 += record.duration_ms;
            entry.1 = entry.1.max(record.duration_ms);
            entry.2 += 1;
        }

        for (_, stats) in stats.iter_mut() {
            stats.0 /= stats.2 as f64;
        }

        stats
    }

    /// Logs the step statistics at info level.
    pub fn log_summary(&self) {
        let mut stats: Vec<_> = self.get_step_statistics().into_iter().collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        for (step, (avg, max, count)) in stats {
            tracing::info!(
                "{}: avg={:.3}ms, max={:.3}ms, count={}",
                step,
                avg,
                max,
                count
            );
        }
    }
}

pub fn time_fn<F, R>(tracker: &mut TimingTracker, name: &str, f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    let start = Instant::now();
    let result = f();
    tracker.record_step(name, start.elapsed());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_average_per_step() {
        let mut tracker = TimingTracker::new();
        tracker.start_iteration();
        tracker.record_step("update_x", Duration::from_millis(2));
        tracker.record_step("update_x", Duration::from_millis(4));
        tracker.record_step("update_z", Duration::from_millis(1));

        let stats = tracker.get_step_statistics();
        let (avg, max, count) = stats["update_x"];
        assert!((avg - 3.0).abs() < 1e-9);
        assert!((max - 4.0).abs() < 1e-9);
        assert_eq!(count, 2);
        assert_eq!(stats["update_z"].2, 1);
    }

    #[test]
    fn merge_offsets_iterations() {
        let mut first = TimingTracker::new();
        first.start_iteration();
        first.record_step("update_x", Duration::from_millis(1));

        let mut second = TimingTracker::new();
        second.start_iteration();
        second.record_step("update_x", Duration::from_millis(1));

        first.merge(&second);
        assert_eq!(first.records().len(), 2);
        assert_eq!(first.records()[1].iteration, 2);
        assert_eq!(first.current_iteration(), 2);
    }

    #[test]
    fn time_fn_records_even_on_error() {
        let mut tracker = TimingTracker::new();
        let result: Result<()> = time_fn(&mut tracker, "precompute", || {
            Err(crate::error::SparseLmError::Singular("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(tracker.records().len(), 1);
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.csv");
        let mut tracker = TimingTracker::new();
        tracker.start_iteration();
        tracker.record_step("update_y", Duration::from_micros(1500));
        tracker.write_step_timings_to_csv(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("step_name,iteration,duration_ms,timestamp"));
        assert!(lines.next().unwrap().starts_with("update_y,1,1.500,"));
    }
}
