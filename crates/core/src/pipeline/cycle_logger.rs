use std::collections::HashMap;
use std::time::Instant;

/// Observer for processing-cycle events.
///
/// Keeps the processing loop free of output concerns so the binary can log
/// a summary while tests stay silent.
pub trait CycleLogger: Send {
    /// A cycle ran to completion (processed a frame).
    fn cycle_completed(&mut self, sequence: u64);

    /// Record how long a named stage took within one cycle.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a per-cycle metric such as the face count.
    fn metric(&mut self, name: &str, value: f64);

    /// A cycle was abandoned; the loop carries on.
    fn cycle_failed(&mut self, error: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullCycleLogger;

impl CycleLogger for NullCycleLogger {
    fn cycle_completed(&mut self, _sequence: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn cycle_failed(&mut self, _error: &str) {}
}

/// Accumulates stage timings, metrics and failure counts, logging a summary
/// on shutdown.
pub struct LogCycleLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    cycles: usize,
    failures: usize,
    last_sequence: Option<u64>,
}

impl LogCycleLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            cycles: 0,
            failures: 0,
            last_sequence: None,
        }
    }

    /// Returns the formatted summary, or `None` if nothing happened.
    pub fn summary_string(&self) -> Option<String> {
        if self.cycles == 0 && self.failures == 0 {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Bridge summary ({} cycles, {} failed, {elapsed_s:.1}s uptime):",
            self.cycles, self.failures
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            lines.push(format!(
                "  {stage:8}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let total: f64 = values.iter().sum();
            lines.push(format!("  {name}: avg {:.1}  total {total:.0}", mean(values)));
        }

        if let Some(seq) = self.last_sequence {
            lines.push(format!("  Last frame: #{seq}"));
        }

        Some(lines.join("\n"))
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for LogCycleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleLogger for LogCycleLogger {
    fn cycle_completed(&mut self, sequence: u64) {
        self.cycles += 1;
        self.last_sequence = Some(sequence);
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn cycle_failed(&mut self, _error: &str) {
        self.failures += 1;
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
