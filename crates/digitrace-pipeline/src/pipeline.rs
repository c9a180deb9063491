//! Pipeline driver: vectorize, filter, join.
//!
//! [`Digitizer`] walks one run through its states:
//!
//! ```text
//! Idle -> Vectorizing -> Filtering -> Done
//!              |              |
//!              +--> Aborted <-+        (cancelled)
//!  any state  ---> Failed              (bad input, vectorizer error)
//! ```
//!
//! Cancellation is cooperative. The [`CancelToken`] is polled at every
//! stage boundary, so a cancelled run stops before the next stage starts
//! and never returns partial output.
//!
//! ```rust
//! # use digitrace_pipeline::{
//! #     CancelToken, DigitizeConfig, DigitizeError, GuideTrace, NoProgress, Point, RawPath,
//! #     digitize_paths,
//! # };
//! # fn run() -> Result<(), DigitizeError> {
//! let mut line = RawPath::new();
//! line.move_to((10.0, 50.0));
//! line.line_to((90.0, 50.0));
//!
//! let trace = GuideTrace::new(vec![Point::new(0.0, 50.0), Point::new(100.0, 50.0)], 20);
//! let points = digitize_paths(
//!     &[line],
//!     &trace,
//!     &DigitizeConfig::default(),
//!     &CancelToken::new(),
//!     NoProgress,
//! )?;
//! assert!(!points.is_empty());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use image::GrayImage;
use kurbo::Affine;
use serde::{Deserialize, Serialize};

use crate::corridor::TraceCorridor;
use crate::diagnostics::{
    Clock, NoClock, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics,
};
use crate::filter::{FilterContext, FilterStage};
use crate::fit::Scratch;
use crate::flatten::flatten;
use crate::join::join;
use crate::raster::CropRegion;
use crate::record::{PathRecord, build_records};
use crate::types::{DigitizeConfig, DigitizeError, DigitizedPoints, GuideTrace, RawPath};
use crate::vectorize::Vectorizer;

/// Share of the progress bar given to vectorization in a full run.
const VECTORIZE_SHARE: f64 = 0.5;

/// Progress steps in the filtering half: flatten, each filter, join.
const FILTER_STEPS: usize = FilterStage::ALL.len() + 2;

// ───────────────────────── Cancellation ──────────────────────────

/// Shared flag for cooperative cancellation.
///
/// Clones observe the same flag, so a UI thread can cancel a run that
/// is executing elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<(), DigitizeError> {
        if self.is_cancelled() {
            Err(DigitizeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ───────────────────────── Progress ──────────────────────────

/// Receives the fraction of work done, in `[0, 1]`.
///
/// Reported values never decrease. Throttling UI updates is up to the
/// receiver.
pub trait Progress {
    /// Record that `fraction` of the run is complete.
    fn report(&mut self, fraction: f64);
}

impl<F: FnMut(f64)> Progress for F {
    fn report(&mut self, fraction: f64) {
        self(fraction);
    }
}

/// Discards progress reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _fraction: f64) {}
}

/// Clamps reports into `[0, 1]` and holds them monotone.
struct Monotone<P> {
    inner: P,
    last: f64,
}

impl<P: Progress> Monotone<P> {
    const fn new(inner: P) -> Self {
        Self { inner, last: 0.0 }
    }

    fn report(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        self.inner.report(fraction);
    }
}

/// Maps filtering steps onto a slice of the progress range.
#[derive(Clone, Copy)]
struct Span {
    start: f64,
    width: f64,
}

impl Span {
    #[allow(clippy::cast_precision_loss)]
    fn at(self, step: usize) -> f64 {
        self.width.mul_add(step as f64 / FILTER_STEPS as f64, self.start)
    }
}

// ───────────────────────── Driver ──────────────────────────

/// Where a [`Digitizer`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverState {
    /// Not started.
    #[default]
    Idle,
    /// Waiting on the vectorizer.
    Vectorizing,
    /// Running the filter stages and joining.
    Filtering,
    /// Finished; the output may be empty ("no line found").
    Done,
    /// Cancelled before finishing.
    Aborted,
    /// Stopped by an error.
    Failed,
}

impl DriverState {
    /// Whether the run has ended, one way or another.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Failed)
    }

    /// Whether a run may step from `self` straight to `next`.
    ///
    /// Runs go `Idle -> Vectorizing -> Filtering -> Done`. Any state may
    /// fail; only the two working states can be aborted; an ended run
    /// resets to `Idle`.
    #[must_use]
    pub const fn can_move_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Failed)
            | (Self::Idle, Self::Vectorizing)
            | (Self::Vectorizing, Self::Filtering | Self::Aborted)
            | (Self::Filtering, Self::Done | Self::Aborted)
            | (Self::Done | Self::Aborted | Self::Failed, Self::Idle) => true,
            _ => false,
        }
    }
}

/// Runs the full digitizing pipeline on an image.
#[derive(Debug)]
pub struct Digitizer {
    config: DigitizeConfig,
    cancel: CancelToken,
    state: DriverState,
}

impl Digitizer {
    /// A driver with its own cancel token.
    #[must_use]
    pub fn new(config: DigitizeConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            state: DriverState::Idle,
        }
    }

    /// Use `token` for cancellation instead of a private one.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels this driver's runs.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// The configuration runs use.
    #[must_use]
    pub const fn config(&self) -> &DigitizeConfig {
        &self.config
    }

    /// Digitize the curve `trace` follows in `image`.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::InvalidConfig`] or
    /// [`DigitizeError::InvalidTrace`] for unusable input, whatever the
    /// vectorizer reports, and [`DigitizeError::Cancelled`] when the
    /// cancel token fires. An empty result is `Ok`.
    pub fn run<V, P>(
        &mut self,
        image: &GrayImage,
        vectorizer: &V,
        trace: &GuideTrace,
        progress: P,
    ) -> Result<DigitizedPoints, DigitizeError>
    where
        V: Vectorizer + ?Sized,
        P: Progress,
    {
        self.run_with_diagnostics(image, vectorizer, trace, progress, &NoClock)
            .map(|(points, _)| points)
    }

    /// [`run`](Self::run), also returning per-stage diagnostics timed
    /// with `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn run_with_diagnostics<V, P, C>(
        &mut self,
        image: &GrayImage,
        vectorizer: &V,
        trace: &GuideTrace,
        progress: P,
        clock: &C,
    ) -> Result<(DigitizedPoints, PipelineDiagnostics), DigitizeError>
    where
        V: Vectorizer + ?Sized,
        P: Progress,
        C: Clock,
    {
        self.transition(DriverState::Idle);
        let result = self.drive(image, vectorizer, trace, progress, clock);
        let end = match &result {
            Ok(_) => DriverState::Done,
            Err(DigitizeError::Cancelled) => DriverState::Aborted,
            Err(_) => DriverState::Failed,
        };
        self.transition(end);
        result
    }

    fn drive<V, P, C>(
        &mut self,
        image: &GrayImage,
        vectorizer: &V,
        trace: &GuideTrace,
        progress: P,
        clock: &C,
    ) -> Result<(DigitizedPoints, PipelineDiagnostics), DigitizeError>
    where
        V: Vectorizer + ?Sized,
        P: Progress,
        C: Clock,
    {
        let run_start = clock.now();
        self.config.validate()?;
        trace.validate()?;
        self.transition(DriverState::Vectorizing);
        self.cancel.check()?;

        let mut progress = Monotone::new(progress);
        progress.report(0.0);

        let (width, height) = image.dimensions();
        let region = self.config.crop_margin.and_then(|margin| {
            let region = CropRegion::around_trace(trace, width, height, margin);
            if region.is_none() {
                log::warn!("guide trace lies outside the {width}x{height} image; not cropping");
            }
            region
        });
        let working: Cow<'_, GrayImage> = match region {
            Some(r) if r != CropRegion::full(width, height) => Cow::Owned(r.apply(image)),
            _ => Cow::Borrowed(image),
        };
        let (ox, oy) = region.map_or((0.0, 0.0), |r| r.offset());

        let t = clock.now();
        let mut paths = vectorizer.vectorize(&working)?;
        let vectorize = StageDiagnostics {
            duration: clock.elapsed(&t),
            metrics: StageMetrics::Vectorize {
                width: working.width(),
                height: working.height(),
                cropped: matches!(working, Cow::Owned(_)),
                path_count: paths.len(),
            },
        };
        log::debug!(
            "vectorized {}x{} image into {} paths",
            working.width(),
            working.height(),
            paths.len()
        );
        progress.report(VECTORIZE_SHARE);
        self.cancel.check()?;

        if self.config.flip_vertical {
            let flip = Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, f64::from(working.height())]);
            for path in &mut paths {
                path.apply_affine(flip);
            }
        }

        self.transition(DriverState::Filtering);
        let local_trace = trace.translated(-ox, -oy);
        let span = Span {
            start: VECTORIZE_SHARE,
            width: 1.0 - VECTORIZE_SHARE,
        };
        let (points, mut diagnostics) = filter_and_join(
            &paths,
            &local_trace,
            &self.config,
            &self.cancel,
            &mut progress,
            span,
            clock,
        )?;

        let points = DigitizedPoints::new(
            points
                .into_points()
                .into_iter()
                .map(|p| p.translate(ox, oy))
                .collect(),
        );
        diagnostics.vectorize = Some(vectorize);
        diagnostics.total_duration = clock.elapsed(&run_start);
        Ok((points, diagnostics))
    }

    fn transition(&mut self, next: DriverState) {
        if self.state != next {
            debug_assert!(
                self.state.can_move_to(next),
                "digitizer cannot go from {:?} to {next:?}",
                self.state
            );
            log::debug!("digitizer: {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }
}

/// Run only the filtering half of the pipeline on paths vectorized
/// elsewhere.
///
/// Paths are taken as already being in image space; no crop or flip is
/// applied.
///
/// # Errors
///
/// Returns [`DigitizeError::InvalidConfig`] or
/// [`DigitizeError::InvalidTrace`] for unusable input and
/// [`DigitizeError::Cancelled`] when `cancel` fires.
pub fn digitize_paths<P: Progress>(
    paths: &[RawPath],
    trace: &GuideTrace,
    config: &DigitizeConfig,
    cancel: &CancelToken,
    progress: P,
) -> Result<DigitizedPoints, DigitizeError> {
    digitize_paths_with_diagnostics(paths, trace, config, cancel, progress, &NoClock)
        .map(|(points, _)| points)
}

/// [`digitize_paths`], also returning per-stage diagnostics.
///
/// # Errors
///
/// Same as [`digitize_paths`].
pub fn digitize_paths_with_diagnostics<P: Progress, C: Clock>(
    paths: &[RawPath],
    trace: &GuideTrace,
    config: &DigitizeConfig,
    cancel: &CancelToken,
    progress: P,
    clock: &C,
) -> Result<(DigitizedPoints, PipelineDiagnostics), DigitizeError> {
    let run_start = clock.now();
    config.validate()?;
    trace.validate()?;
    let mut progress = Monotone::new(progress);
    let span = Span {
        start: 0.0,
        width: 1.0,
    };
    let (points, mut diagnostics) =
        filter_and_join(paths, trace, config, cancel, &mut progress, span, clock)?;
    diagnostics.total_duration = clock.elapsed(&run_start);
    Ok((points, diagnostics))
}

/// Flatten, run the five filters, and join.
///
/// Stops early with an empty result as soon as a stage leaves no paths.
fn filter_and_join<P: Progress, C: Clock>(
    paths: &[RawPath],
    trace: &GuideTrace,
    config: &DigitizeConfig,
    cancel: &CancelToken,
    progress: &mut Monotone<P>,
    span: Span,
    clock: &C,
) -> Result<(DigitizedPoints, PipelineDiagnostics), DigitizeError> {
    cancel.check()?;
    if trace.points.len() == 1 {
        log::warn!("guide trace has a single point; its corridor encloses nothing");
    }
    let corridor = TraceCorridor::build(trace);
    let mut scratch = Scratch::new();

    let t = clock.now();
    let flattened: Vec<_> = paths
        .iter()
        .map(|p| flatten(p, config.flatten_tolerance, config.flatten_depth))
        .collect();
    let mut records = build_records(flattened, &mut scratch);
    let flatten_diag = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Flatten {
            path_count: paths.len(),
            record_count: records.len(),
            point_count: point_count(&records),
        },
    };
    progress.report(span.at(1));

    let mut diagnostics = PipelineDiagnostics {
        vectorize: None,
        flatten: flatten_diag,
        filters: Vec::with_capacity(FilterStage::ALL.len()),
        join: None,
        total_duration: std::time::Duration::ZERO,
        summary: PipelineSummary {
            trace_point_count: trace.points.len(),
            pen_width: trace.pen_width,
            raw_path_count: paths.len(),
            final_path_count: 0,
            final_point_count: 0,
            emptied_by: None,
        },
    };

    if records.is_empty() {
        log::debug!("no paths to filter");
        return Ok((DigitizedPoints::default(), diagnostics));
    }

    let mut ctx = FilterContext {
        config,
        corridor: &corridor,
        scratch: &mut scratch,
    };
    for stage in FilterStage::ALL {
        cancel.check()?;
        let (paths_before, points_before) = (records.len(), point_count(&records));
        let t = clock.now();
        records = stage.apply(records, &mut ctx);
        diagnostics.filters.push(StageDiagnostics {
            duration: clock.elapsed(&t),
            metrics: StageMetrics::Filter {
                stage,
                paths_before,
                paths_after: records.len(),
                points_before,
                points_after: point_count(&records),
            },
        });
        progress.report(span.at(stage.index() + 2));

        if records.is_empty() {
            log::debug!("no line found: {} removed every path", stage.name());
            diagnostics.summary.emptied_by = Some(stage);
            return Ok((DigitizedPoints::default(), diagnostics));
        }
    }

    cancel.check()?;
    let t = clock.now();
    let input_point_count = point_count(&records);
    let points = join(&records, config.snap_to_pixels);
    diagnostics.join = Some(StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Join {
            input_path_count: records.len(),
            input_point_count,
            output_point_count: points.len(),
        },
    });
    diagnostics.summary.final_path_count = records.len();
    diagnostics.summary.final_point_count = points.len();
    progress.report(span.at(FILTER_STEPS));
    log::debug!(
        "joined {} paths into {} points",
        records.len(),
        points.len()
    );
    Ok((points, diagnostics))
}

fn point_count(records: &[PathRecord]) -> usize {
    records.iter().map(PathRecord::len).sum()
}

// ───────────────────────── Background task ──────────────────────────

/// A run executing on its own thread.
///
/// [`join`](Self::join) consumes the task, so the result is handed over
/// exactly once.
#[derive(Debug)]
pub struct DigitizeTask {
    handle: JoinHandle<(DriverState, Result<DigitizedPoints, DigitizeError>)>,
    cancel: CancelToken,
}

impl DigitizeTask {
    /// Ask the run to stop at its next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels this run.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the worker thread has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run and take its result.
    ///
    /// # Errors
    ///
    /// Whatever the run returned, or [`DigitizeError::Worker`] if the
    /// worker thread panicked.
    pub fn join(self) -> Result<DigitizedPoints, DigitizeError> {
        self.join_with_state().1
    }

    /// Wait for the run and take its final state and result.
    #[must_use]
    pub fn join_with_state(self) -> (DriverState, Result<DigitizedPoints, DigitizeError>) {
        self.handle.join().unwrap_or_else(|_| {
            (
                DriverState::Failed,
                Err(DigitizeError::Worker("digitizing thread panicked".into())),
            )
        })
    }
}

/// Run a [`Digitizer`] on a dedicated thread.
///
/// # Errors
///
/// Returns [`DigitizeError::Worker`] if the thread cannot be spawned.
pub fn spawn<V, P>(
    config: DigitizeConfig,
    image: GrayImage,
    vectorizer: V,
    trace: GuideTrace,
    progress: P,
) -> Result<DigitizeTask, DigitizeError>
where
    V: Vectorizer + Send + 'static,
    P: Progress + Send + 'static,
{
    let mut digitizer = Digitizer::new(config);
    let cancel = digitizer.cancel_token();
    let handle = thread::Builder::new()
        .name("digitrace-worker".into())
        .spawn(move || {
            let result = digitizer.run(&image, &vectorizer, &trace, progress);
            (digitizer.state(), result)
        })
        .map_err(|e| DigitizeError::Worker(e.to_string()))?;
    Ok(DigitizeTask { handle, cancel })
}
