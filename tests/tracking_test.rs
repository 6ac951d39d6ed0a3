use std::convert::Infallible;
use std::time::Duration;

use hybridtrack_rs::integration::{SourceFrame, StopReason};
use hybridtrack_rs::marker::{MarkerBuilder, RawMarker};
use hybridtrack_rs::{
    DetectorConfig, FallbackConfig, Frame, MarkerBackend, MarkerDetector, MultiMarkerAggregator,
    PositionRecord, RecordingSession, TrackerPipeline, TrackingConfig, TrackingSource,
};
use ndarray::{Array2, ArrayView2, s};

const WIDTH: usize = 200;
const HEIGHT: usize = 120;

/// Backend replaying one scripted detection list per frame.
struct ScriptedBackend {
    frames: Vec<Vec<RawMarker>>,
    calls: usize,
}

impl MarkerBackend for ScriptedBackend {
    type Error = Infallible;

    fn detect(&mut self, _gray: ArrayView2<'_, u8>) -> Result<Vec<RawMarker>, Self::Error> {
        let out = self.frames.get(self.calls).cloned().unwrap_or_default();
        self.calls += 1;
        Ok(out)
    }
}

/// Backend reporting the same markers on every frame.
struct FixedBackend(Vec<RawMarker>);

impl MarkerBackend for FixedBackend {
    type Error = Infallible;

    fn detect(&mut self, _gray: ArrayView2<'_, u8>) -> Result<Vec<RawMarker>, Self::Error> {
        Ok(self.0.clone())
    }
}

fn texture(x: usize, y: usize, seed: u32) -> u8 {
    let mut h = (x as u32).wrapping_mul(2_654_435_761)
        ^ (y as u32).wrapping_mul(40_503)
        ^ seed.wrapping_mul(97_531);
    h ^= h >> 16;
    h = h.wrapping_mul(0x45d9_f3b);
    h ^= h >> 16;
    (h % 190 + 30) as u8
}

/// Flat frame with textured squares `(cx, cy, side, seed)`.
fn scene(patches: &[(usize, usize, usize, u32)]) -> Frame {
    let mut gray = Array2::from_elem((HEIGHT, WIDTH), 100u8);
    for &(cx, cy, side, seed) in patches {
        let (x0, y0) = (cx - side / 2, cy - side / 2);
        let patch = Array2::from_shape_fn((side, side), |(y, x)| texture(x, y, seed));
        gray.slice_mut(s![y0..y0 + side, x0..x0 + side]).assign(&patch);
    }
    Frame::from(gray)
}

fn blank() -> Frame {
    scene(&[])
}

fn marker(id: u32, cx: f64, cy: f64) -> RawMarker {
    MarkerBuilder::new().id(id).square(cx, cy, 20.0).decision_margin(60.0).build()
}

fn detector(frames: Vec<Vec<RawMarker>>) -> MarkerDetector<ScriptedBackend> {
    MarkerDetector::new(ScriptedBackend { frames, calls: 0 }, DetectorConfig::default()).unwrap()
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn aggregator(max_fallback_frames: u32, ids: &[u32]) -> MultiMarkerAggregator {
    let config = FallbackConfig {
        max_fallback_frames,
        ..FallbackConfig::default()
    };
    let mut aggregator = MultiMarkerAggregator::new(&config, 11.1).unwrap();
    aggregator.set_tracked_ids(ids.iter().copied());
    aggregator
}

#[test]
fn test_marker_dropout_and_recovery() {
    init_logging();
    let frame = scene(&[(60, 50, 30, 1)]);
    let script: Vec<_> = (0..17)
        .map(|i| if (10..16).contains(&i) { vec![] } else { vec![marker(1, 60.0, 50.0)] })
        .collect();
    let mut detector = detector(script);
    let mut agg = aggregator(30, &[1]);

    for _ in 0..10 {
        let update = agg.update(&mut detector, &frame).unwrap();
        let result = &update.results[&1];
        assert_eq!(result.source, TrackingSource::Marker);
        assert_eq!(result.confidence, 1.0);
        assert!(result.marker.is_some());
    }
    let scale = agg.mm_per_pixel().unwrap();
    assert_eq!(agg.state(1).unwrap().appearance_inits(), 10);

    let mut last = 1.0;
    for n in 1..=6 {
        let update = agg.update(&mut detector, &frame).unwrap();
        let result = &update.results[&1];
        assert_eq!(result.source, TrackingSource::Fallback);
        assert!(result.confidence < last);
        last = result.confidence;
        assert_eq!(agg.state(1).unwrap().frames_since_marker(), n);
        // Scale only comes from markers.
        assert_eq!(agg.mm_per_pixel().unwrap().to_bits(), scale.to_bits());
    }
    // Template only refreshes from ground truth.
    assert_eq!(agg.state(1).unwrap().appearance_inits(), 10);

    let update = agg.update(&mut detector, &frame).unwrap();
    assert_eq!(update.results[&1].source, TrackingSource::Marker);
    assert_eq!(update.results[&1].confidence, 1.0);
    assert_eq!(agg.state(1).unwrap().frames_since_marker(), 0);
    assert_eq!(agg.state(1).unwrap().appearance_inits(), 11);
}

#[test]
fn test_grace_window_then_lost() {
    let frame = scene(&[(60, 50, 30, 2)]);
    let mut detector = detector(vec![vec![marker(1, 60.0, 50.0)]]);
    let mut agg = aggregator(5, &[1]);
    agg.update(&mut detector, &frame).unwrap();

    // Marker gone and no texture left for the appearance tracker.
    let empty = blank();
    let expected = [0.4, 0.3, 0.2];
    for (i, conf) in expected.iter().enumerate() {
        let update = agg.update(&mut detector, &empty).unwrap();
        let result = &update.results[&1];
        assert_eq!(result.source, TrackingSource::Fallback, "frame {i}");
        assert_eq!(result.center.x, 60.0);
        assert!((result.confidence - conf).abs() < 1e-12);
    }
    for _ in 0..7 {
        let update = agg.update(&mut detector, &empty).unwrap();
        assert!(update.results.is_empty());
        assert!(update.aggregate.is_none());
        assert_eq!(agg.state(1).unwrap().last_source(), TrackingSource::Lost);
    }
}

#[test]
fn test_two_markers_aggregate() {
    // A is detected every frame; B only on the first frame but stays visible.
    let frame = scene(&[(50, 60, 30, 3), (150, 60, 30, 4)]);
    let script: Vec<_> = (0..10)
        .map(|i| {
            if i == 0 {
                vec![marker(1, 50.0, 60.0), marker(2, 150.0, 60.0)]
            } else {
                vec![marker(1, 50.0, 60.0)]
            }
        })
        .collect();
    let mut detector = detector(script);
    let mut agg = aggregator(5, &[1, 2]);

    for i in 0..10 {
        let update = agg.update(&mut detector, &frame).unwrap();
        let aggregate = update.aggregate.unwrap();
        assert_eq!(aggregate.source, TrackingSource::Marker);
        if i <= 5 {
            assert_eq!(aggregate.center.x, 100.0, "frame {i}");
            assert_eq!(aggregate.contributing.len(), 2);
        } else {
            assert_eq!(aggregate.center.x, 50.0, "frame {i}");
            assert_eq!(aggregate.contributing.len(), 1);
        }
    }
}

#[test]
fn test_never_detected_id_excluded() {
    let frame = scene(&[(50, 60, 30, 5)]);
    let mut detector = detector(vec![vec![marker(1, 50.0, 60.0)]; 3]);
    let mut agg = aggregator(30, &[1, 9]);
    for _ in 0..3 {
        let update = agg.update(&mut detector, &frame).unwrap();
        assert_eq!(update.aggregate.unwrap().center.x, 50.0);
        assert!(!update.results.contains_key(&9));
    }
}

#[test]
fn test_detector_is_deterministic() {
    let frame = scene(&[(60, 50, 30, 6)]);
    let mut detector = detector(vec![vec![marker(4, 60.0, 50.0)]; 2]);
    let first = detector.detect(&frame).unwrap();
    let second = detector.detect(&frame).unwrap();
    assert_eq!(first, second);
    assert!(first[0].has_pose());
}

#[test]
fn test_session_on_worker_thread() {
    init_logging();
    let config =
        TrackingConfig::from_json_str(r#"{ "session": { "status_interval_ms": 0 } }"#).unwrap();
    let backend = FixedBackend(vec![marker(1, 60.0, 50.0)]);
    let mut pipeline = TrackerPipeline::new(backend, &config).unwrap();
    pipeline.set_tracked_ids([1]);

    let frame = scene(&[(60, 50, 30, 7)]);
    let source = move || Some(SourceFrame::from(frame.clone()));
    let sink = Vec::<PositionRecord>::new();
    let handle = RecordingSession::new(pipeline, source, sink, config.session)
        .unwrap()
        .spawn();

    while handle.snapshot().frames_processed < 3 {
        std::thread::sleep(Duration::from_millis(1));
    }
    let snapshot = handle.snapshot();
    assert!(snapshot.running);
    assert!(snapshot.last_record.is_some());

    handle.stop();
    let (report, records) = handle.join().unwrap();
    assert_eq!(report.stop_reason, StopReason::Stopped);
    assert_eq!(report.records_emitted as usize, records.len());
    assert!(records.windows(2).all(|w| w[1].frame_index == w[0].frame_index + 1));
}
