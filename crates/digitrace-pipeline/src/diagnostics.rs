//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for tuning
//! the filter tolerances against real chart images. The `*_with_diagnostics`
//! entry points collect them alongside the digitized points.
//!
//! The library never reads a platform clock itself. Callers inject time
//! through the [`Clock`] trait; [`NoClock`] records zero durations.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::FilterStage;

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances. Every stage reports zero duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Vectorization (absent when paths were supplied directly).
    pub vectorize: Option<StageDiagnostics>,
    /// Flattening raw paths and building path records.
    pub flatten: StageDiagnostics,
    /// One entry per filter stage that ran, in order.
    pub filters: Vec<StageDiagnostics>,
    /// Joining and sorting (absent when a stage left no paths).
    pub join: Option<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Vectorization of the (possibly cropped) image.
    Vectorize {
        /// Width of the image handed to the vectorizer.
        width: u32,
        /// Height of the image handed to the vectorizer.
        height: u32,
        /// Whether the image was cropped to the trace first.
        cropped: bool,
        /// Number of raw paths produced.
        path_count: usize,
    },
    /// Flattening of raw paths into point sequences.
    Flatten {
        /// Raw paths in.
        path_count: usize,
        /// Path records out (single points are dropped).
        record_count: usize,
        /// Total flattened points across all records.
        point_count: usize,
    },
    /// One of the five filter stages.
    Filter {
        /// Which stage.
        stage: FilterStage,
        /// Paths before the stage.
        paths_before: usize,
        /// Paths after the stage.
        paths_after: usize,
        /// Points before the stage.
        points_before: usize,
        /// Points after the stage.
        points_after: usize,
    },
    /// Joining, sorting and de-duplication.
    Join {
        /// Surviving paths joined.
        input_path_count: usize,
        /// Points before de-duplication.
        input_point_count: usize,
        /// Points in the output.
        output_point_count: usize,
    },
}

/// High-level summary for the entire run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Points in the guide trace.
    pub trace_point_count: usize,
    /// Pen width in pixels.
    pub pen_width: u32,
    /// Raw paths from the vectorizer.
    pub raw_path_count: usize,
    /// Paths surviving every filter.
    pub final_path_count: usize,
    /// Points in the output.
    pub final_point_count: usize,
    /// The stage that removed the last path, if any did.
    pub emptied_by: Option<FilterStage>,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Digitizer Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Trace: {} points, pen {}px",
            self.summary.trace_point_count, self.summary.pen_width,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let mut stages: Vec<(&str, &StageDiagnostics)> = Vec::new();
        if let Some(ref v) = self.vectorize {
            stages.push(("Vectorize", v));
        }
        stages.push(("Flatten", &self.flatten));
        for diag in &self.filters {
            let name = match diag.metrics {
                StageMetrics::Filter { stage, .. } => stage.label(),
                _ => "Filter",
            };
            stages.push((name, diag));
        }
        if let Some(ref j) = self.join {
            stages.push(("Join", j));
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Raw paths: {}  |  Final paths: {}  |  Final points: {}",
            self.summary.raw_path_count,
            self.summary.final_path_count,
            self.summary.final_point_count,
        ));
        if let Some(stage) = self.summary.emptied_by {
            lines.push(format!("No line found: {} removed every path", stage.label()));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Vectorize {
            width,
            height,
            cropped,
            path_count,
        } => {
            let crop = if *cropped { " (cropped)" } else { "" };
            format!("{width}x{height}{crop} -> {path_count} paths")
        }
        StageMetrics::Flatten {
            path_count,
            record_count,
            point_count,
        } => format!("{path_count} paths -> {record_count} records, {point_count} pts"),
        StageMetrics::Filter {
            paths_before,
            paths_after,
            points_before,
            points_after,
            ..
        } => format!("paths {paths_before}->{paths_after}  pts {points_before}->{points_after}"),
        StageMetrics::Join {
            input_path_count,
            input_point_count,
            output_point_count,
        } => format!("{input_path_count} paths, {input_point_count}->{output_point_count} pts"),
    }
}
