//! digitrace-pipeline: digitize one plotted curve from a chart image.
//!
//! A user draws a rough guide trace over the curve they want. The
//! pipeline vectorizes the image, keeps only the path pieces that run
//! along the trace, and joins them into a single list of points sorted
//! by x:
//!
//! vectorize -> flatten -> short segments -> corner splitting ->
//! non-intersecting -> outliers -> perpendiculars -> join.
//!
//! The crate does no I/O beyond decoding bytes handed to it. Vectorizing
//! is pluggable through [`Vectorizer`]; [`ContourVectorizer`] is the
//! built-in one.

pub mod corners;
pub mod corridor;
pub mod diagnostics;
pub mod filter;
pub mod fit;
pub mod flatten;
pub mod join;
pub mod pipeline;
pub mod raster;
pub mod record;
pub mod types;
pub mod vectorize;

pub use corridor::TraceCorridor;
pub use diagnostics::{Clock, NoClock, PipelineDiagnostics};
pub use filter::FilterStage;
pub use fit::Scratch;
pub use pipeline::{
    CancelToken, DigitizeTask, Digitizer, DriverState, NoProgress, Progress, digitize_paths,
    digitize_paths_with_diagnostics, spawn,
};
pub use raster::{CropRegion, decode_grayscale};
pub use record::PathRecord;
pub use types::{
    DigitizeConfig, DigitizeError, DigitizedPoints, GrayImage, GuideTrace, Point, RawPath,
};
pub use vectorize::{ContourVectorizer, Vectorizer};

/// Decode `image_bytes` and digitize the curve `trace` follows, using
/// the built-in contour vectorizer.
///
/// # Errors
///
/// Returns [`DigitizeError::EmptyInput`] or [`DigitizeError::ImageDecode`]
/// for unusable bytes, and any error [`Digitizer::run`] reports.
pub fn digitize(
    image_bytes: &[u8],
    trace: &GuideTrace,
    config: &DigitizeConfig,
) -> Result<DigitizedPoints, DigitizeError> {
    let image = decode_grayscale(image_bytes)?;
    let vectorizer = ContourVectorizer::from_config(config);
    Digitizer::new(config.clone()).run(&image, &vectorizer, trace, NoProgress)
}
