//! Integration tests: whole runs through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::mpsc;

use digitrace_pipeline::{
    CancelToken, ContourVectorizer, DigitizeConfig, DigitizeError, Digitizer, DriverState,
    FilterStage, GrayImage, GuideTrace, NoClock, NoProgress, Point, RawPath, digitize,
    digitize_paths, digitize_paths_with_diagnostics, spawn,
};
use image::Luma;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn polyline(points: &[(f64, f64)]) -> RawPath {
    let mut path = RawPath::new();
    let mut iter = points.iter();
    if let Some(&first) = iter.next() {
        path.move_to(first);
    }
    for &p in iter {
        path.line_to(p);
    }
    path
}

/// Horizontal trace at height `y` across `0..=width`, one point per 10 px.
fn horizontal_trace(y: f64, width: u32, pen_width: u32) -> GuideTrace {
    GuideTrace::new(
        (0..=width / 10)
            .map(|i| Point::new(f64::from(i * 10), y))
            .collect(),
        pen_width,
    )
}

fn run(paths: &[RawPath], trace: &GuideTrace) -> Vec<Point> {
    digitize_paths(
        paths,
        trace,
        &DigitizeConfig::default(),
        &CancelToken::new(),
        NoProgress,
    )
    .unwrap()
    .into_points()
}

fn white_page(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([255]))
}

fn draw_bar(image: &mut GrayImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) {
    for x in xs {
        for y in ys.clone() {
            image.put_pixel(x, y, Luma([0]));
        }
    }
}

#[test]
fn path_on_the_trace_comes_back_unchanged() {
    init_logs();
    let coords: Vec<(f64, f64)> = (1..=9).map(|i| (f64::from(i) * 10.0, 50.0)).collect();
    let out = run(&[polyline(&coords)], &horizontal_trace(50.0, 100, 20));
    let expected: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
    assert_eq!(out, expected);
}

#[test]
fn output_is_sorted_by_x() {
    let paths = [
        polyline(&[(80.0, 52.0), (60.0, 51.0), (40.0, 50.0)]),
        polyline(&[(10.0, 49.0), (30.0, 50.0)]),
    ];
    let out = run(&paths, &horizontal_trace(50.0, 100, 20));
    assert_eq!(out.len(), 5);
    assert!(out.windows(2).all(|w| w[0].x <= w[1].x));
}

#[test]
fn repeated_runs_are_bit_identical() {
    let paths = [
        polyline(&[(12.3, 50.7), (33.1, 49.2), (57.9, 51.4)]),
        polyline(&[(60.0, 50.0), (88.8, 48.1)]),
        polyline(&[(50.0, 0.0), (50.0, 100.0)]),
    ];
    let trace = horizontal_trace(50.0, 100, 20);
    let first = run(&paths, &trace);
    let second = run(&paths, &trace);
    assert_eq!(first.len(), second.len());
    assert!(first.iter().zip(&second).all(|(a, b)| a.bit_eq(*b)));
}

#[test]
fn path_crossing_the_corridor_is_rejected() {
    // Only 20 of its 100 px lie inside the corridor.
    let paths = [
        polyline(&[(10.0, 50.0), (90.0, 50.0)]),
        polyline(&[(45.0, 0.0), (45.0, 100.0)]),
    ];
    let out = run(&paths, &horizontal_trace(50.0, 100, 20));
    assert_eq!(out, vec![Point::new(10.0, 50.0), Point::new(90.0, 50.0)]);
}

#[test]
fn curve_turning_off_the_trace_keeps_its_on_trace_arm() {
    // Sparse vertices: the 20 px spacing is beyond the corner search's
    // outer radius, but the turn at (90, 50) still splits the path.
    let path = polyline(&[
        (10.0, 50.0),
        (30.0, 50.0),
        (50.0, 50.0),
        (70.0, 50.0),
        (90.0, 50.0),
        (90.0, 200.0),
    ]);
    let out = run(&[path], &horizontal_trace(50.0, 100, 20));
    let expected: Vec<Point> = (0..5)
        .map(|i| Point::new(f64::from(i).mul_add(20.0, 10.0), 50.0))
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn short_perpendicular_stub_is_rejected() {
    // Mostly inside, but it pokes out and runs across the trace.
    let stub = polyline(&[(50.0, 42.0), (50.0, 62.0)]);
    let (out, diagnostics) = digitize_paths_with_diagnostics(
        &[stub],
        &horizontal_trace(50.0, 100, 20),
        &DigitizeConfig::default(),
        &CancelToken::new(),
        NoProgress,
        &NoClock,
    )
    .unwrap();
    assert!(out.is_empty());
    assert_eq!(
        diagnostics.summary.emptied_by,
        Some(FilterStage::Perpendiculars)
    );
}

#[test]
fn far_away_paths_mean_no_line_found() {
    let paths = [polyline(&[(10.0, 5.0), (90.0, 5.0)])];
    assert!(run(&paths, &horizontal_trace(50.0, 100, 20)).is_empty());
}

#[test]
fn tiny_paths_are_dropped() {
    let paths = [polyline(&[(50.0, 50.0), (52.0, 50.0)])];
    assert!(run(&paths, &horizontal_trace(50.0, 100, 20)).is_empty());
}

#[test]
fn single_point_trace_finds_nothing() {
    let paths = [polyline(&[(10.0, 50.0), (90.0, 50.0)])];
    let trace = GuideTrace::new(vec![Point::new(50.0, 50.0)], 20);
    assert!(run(&paths, &trace).is_empty());
}

#[test]
fn snapping_truncates_to_pixels() {
    let paths = [polyline(&[(10.7, 50.2), (10.2, 50.9), (90.5, 49.5)])];
    let config = DigitizeConfig {
        snap_to_pixels: true,
        ..DigitizeConfig::default()
    };
    let out = digitize_paths(
        &paths,
        &horizontal_trace(50.0, 100, 20),
        &config,
        &CancelToken::new(),
        NoProgress,
    )
    .unwrap();
    assert_eq!(
        out.points(),
        &[Point::new(10.0, 50.0), Point::new(90.0, 49.0)]
    );
}

#[test]
fn invalid_config_is_reported() {
    let config = DigitizeConfig {
        inside_fraction: 1.5,
        ..DigitizeConfig::default()
    };
    let result = digitize_paths(
        &[],
        &horizontal_trace(50.0, 100, 20),
        &config,
        &CancelToken::new(),
        NoProgress,
    );
    assert!(matches!(result, Err(DigitizeError::InvalidConfig(_))));
}

#[test]
fn contour_vectorizer_finds_the_plotted_line() {
    init_logs();
    let mut image = white_page(300, 300);
    // The curve being digitized.
    draw_bar(&mut image, 20..280, 149..152);
    // A grid line inside the crop but well away from the trace.
    draw_bar(&mut image, 0..300, 100..102);
    // Ink outside the crop window.
    draw_bar(&mut image, 0..300, 10..12);

    let config = DigitizeConfig::default();
    let trace = horizontal_trace(150.0, 300, 20);
    let mut digitizer = Digitizer::new(config.clone());
    let out = digitizer
        .run(&image, &ContourVectorizer::from_config(&config), &trace, NoProgress)
        .unwrap();

    assert_eq!(digitizer.state(), DriverState::Done);
    assert!(!out.is_empty());
    let points = out.points();
    assert!(points.windows(2).all(|w| w[0].x <= w[1].x));
    assert!(points.iter().all(|p| (148.0..=152.0).contains(&p.y)));
    assert!(points.iter().all(|p| (19.0..=281.0).contains(&p.x)));
}

#[test]
fn digitize_decodes_png_bytes() {
    let mut page = white_page(120, 80);
    draw_bar(&mut page, 10..110, 39..42);
    let mut bytes = Vec::new();
    page
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();

    let out = digitize(
        &bytes,
        &horizontal_trace(40.0, 120, 20),
        &DigitizeConfig::default(),
    )
    .unwrap();
    assert!(!out.is_empty());
    assert!(out.points().iter().all(|p| (38.0..=42.0).contains(&p.y)));
}

#[test]
fn empty_bytes_are_rejected() {
    let result = digitize(
        &[],
        &horizontal_trace(40.0, 120, 20),
        &DigitizeConfig::default(),
    );
    assert!(matches!(result, Err(DigitizeError::EmptyInput)));
}

#[test]
fn background_run_can_be_cancelled() {
    let (release, gate) = mpsc::channel::<()>();
    let vectorizer = move |_: &GrayImage| -> Result<Vec<RawPath>, DigitizeError> {
        gate.recv().ok();
        Ok(vec![polyline(&[(10.0, 50.0), (90.0, 50.0)])])
    };
    let task = spawn(
        DigitizeConfig::default(),
        white_page(100, 100),
        vectorizer,
        horizontal_trace(50.0, 100, 20),
        NoProgress,
    )
    .unwrap();

    task.cancel();
    release.send(()).unwrap();
    let (state, result) = task.join_with_state();
    assert_eq!(state, DriverState::Aborted);
    assert!(matches!(result, Err(DigitizeError::Cancelled)));
}

#[test]
fn background_run_reports_progress() {
    let (tx, rx) = mpsc::channel();
    let task = spawn(
        DigitizeConfig::default(),
        white_page(100, 100),
        vec![polyline(&[(10.0, 50.0), (90.0, 50.0)])],
        horizontal_trace(50.0, 100, 20),
        move |f: f64| {
            tx.send(f).ok();
        },
    )
    .unwrap();

    let out = task.join().unwrap();
    assert_eq!(out.len(), 2);
    let reports: Vec<f64> = rx.try_iter().collect();
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reports.first().copied(), Some(0.0));
    assert!((reports.last().copied().unwrap() - 1.0).abs() < 1e-12);
}
