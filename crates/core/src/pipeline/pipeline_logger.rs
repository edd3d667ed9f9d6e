use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for per-cycle pipeline events.
///
/// Decouples the pipelines from specific output mechanisms so tests can run
/// silently and the server can emit periodic summaries.
pub trait PipelineLogger: Send {
    /// Record how long a named stage took in one cycle.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces located, detections).
    fn metric(&mut self, name: &str, value: f64);

    /// Mark the end of one pull cycle.
    fn cycle_complete(&mut self);

    /// Emit a summary of everything recorded. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn cycle_complete(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
struct Aggregate {
    total: f64,
    count: usize,
}

impl Aggregate {
    fn push(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Aggregates stage timings and metrics for one stream and writes a summary
/// through `log` every `report_every` cycles.
///
/// Values are kept as running totals since a live stream never ends.
pub struct LogPipelineLogger {
    stream: String,
    report_every: usize,
    timings: HashMap<String, Aggregate>,
    metrics: HashMap<String, Aggregate>,
    start_time: Instant,
    cycles: usize,
}

impl LogPipelineLogger {
    pub fn new(stream: &str, report_every: usize) -> Self {
        Self {
            stream: stream.to_string(),
            report_every: report_every.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            cycles: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "{} stream ({} cycles, {:.1}s):",
            self.stream, self.cycles, elapsed_s
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, agg) in stages {
            lines.push(format!(
                "  {stage:10}: avg {:6.1}ms  total {:7.0}ms",
                agg.mean(),
                agg.total
            ));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, agg) in metrics {
            lines.push(format!("  {name}: avg {:.1}", agg.mean()));
        }

        if self.cycles > 0 && elapsed_s > 0.0 {
            lines.push(format!("  Throughput: {:.1} fps", self.cycles as f64 / elapsed_s));
        }

        Some(lines.join("\n"))
    }

    pub fn mean_timing(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Aggregate::mean)
    }

    pub fn mean_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(Aggregate::mean)
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn cycle_complete(&mut self) {
        self.cycles += 1;
        if self.cycles % self.report_every == 0 {
            if let Some(text) = self.summary_string() {
                log::debug!("{text}");
            }
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("{text}");
        }
    }
}
