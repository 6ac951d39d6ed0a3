//! Recording session: a dedicated worker feeding frames through the
//! pipeline, publishing read-only snapshots for the presentation layer.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SessionConfig;
use crate::error::{ConfigError, Result, TrackingError};
use crate::frame::Frame;
use crate::marker::{DetectedMarker, MarkerBackend};
use crate::tracker::{FrameStamp, HybridTrackingResult, PositionRecord};

use super::pipeline::{FrameOutput, TrackerPipeline};

/// A frame plus the source's own index for it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    pub frame: Frame,
    pub video_frame: Option<u64>,
}

impl From<Frame> for SourceFrame {
    fn from(frame: Frame) -> Self {
        Self {
            frame,
            video_frame: None,
        }
    }
}

/// Supplies frames on demand. `None` is end of stream.
///
/// Looping, seeking and device lifetime are the source's business.
pub trait FrameSource {
    fn read(&mut self) -> Option<SourceFrame>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<SourceFrame>,
{
    fn read(&mut self) -> Option<SourceFrame> {
        self()
    }
}

/// Replays a fixed list of frames, numbering them from zero.
#[derive(Debug, Clone, Default)]
pub struct FrameList {
    frames: std::collections::VecDeque<Frame>,
    next: u64,
}

impl FrameList {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            next: 0,
        }
    }
}

impl FrameSource for FrameList {
    fn read(&mut self) -> Option<SourceFrame> {
        let frame = self.frames.pop_front()?;
        let video_frame = Some(self.next);
        self.next += 1;
        Some(SourceFrame { frame, video_frame })
    }
}

/// Consumes position records as they are produced.
pub trait RecordSink {
    fn record(&mut self, record: &PositionRecord) -> Result<()>;
}

impl RecordSink for Vec<PositionRecord> {
    fn record(&mut self, record: &PositionRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per record per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn record(&mut self, record: &PositionRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The frame source ran out
    EndOfStream,
    /// The stop flag was raised
    Stopped,
    /// `max_frames` frames were processed
    FrameLimit,
}

/// Latest published state, for display only.
#[derive(Debug, Clone, Default)]
pub struct TrackingSnapshot {
    pub running: bool,
    pub frames_processed: u64,
    pub records_emitted: u64,
    /// Frames where every tracked id was lost
    pub lost_frames: u64,
    pub detector_errors: u64,
    pub detections: Vec<DetectedMarker>,
    pub results: BTreeMap<u32, HybridTrackingResult>,
    pub last_record: Option<PositionRecord>,
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub stop_reason: StopReason,
    pub frames_processed: u64,
    pub records_emitted: u64,
    pub lost_frames: u64,
    pub detector_errors: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    frames: u64,
    records: u64,
    lost: u64,
    detector_errors: u64,
}

/// Runs the per-frame loop over a [`FrameSource`].
///
/// Frames are processed strictly in order, one at a time. The stop flag is
/// checked after each frame, never during one.
pub struct RecordingSession<B: MarkerBackend, S: FrameSource, K: RecordSink> {
    pipeline: TrackerPipeline<B>,
    source: S,
    sink: K,
    config: SessionConfig,
    stop: Arc<AtomicBool>,
    snapshot: Arc<RwLock<TrackingSnapshot>>,
}

impl<B: MarkerBackend, S: FrameSource, K: RecordSink> RecordingSession<B, S, K> {
    /// Set up a session, rejecting an invalid `config` before any frame is read.
    pub fn new(
        pipeline: TrackerPipeline<B>,
        source: S,
        sink: K,
        config: SessionConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pipeline,
            source,
            sink,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            snapshot: Arc::new(RwLock::new(TrackingSnapshot::default())),
        })
    }

    /// Flag that ends the session after the current frame.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<TrackingSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub fn pipeline(&self) -> &TrackerPipeline<B> {
        &self.pipeline
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Process frames on the calling thread until the source ends, the
    /// frame limit is hit or the stop flag is raised.
    ///
    /// Backend failures on a frame are logged and counted; sink failures
    /// end the session with an error.
    pub fn run(&mut self) -> Result<SessionReport> {
        let start = Instant::now();
        let interval = Duration::from_millis(self.config.status_interval_ms);
        let mut counters = Counters::default();
        let mut latest = FrameOutput::default();
        let mut last_publish: Option<Instant> = None;

        log::info!(
            "recording started, tracking ids {:?}",
            self.pipeline.aggregator().tracked_ids()
        );
        self.publish(&counters, &latest, true);

        let stop_reason = loop {
            if self.config.max_frames.is_some_and(|max| counters.frames >= max) {
                break StopReason::FrameLimit;
            }
            let Some(SourceFrame { frame, video_frame }) = self.source.read() else {
                break StopReason::EndOfStream;
            };

            let time_s = match self.config.fps {
                Some(fps) => counters.frames as f64 / fps,
                None => start.elapsed().as_secs_f64(),
            };
            let stamp = FrameStamp::new(counters.frames, time_s).with_video_frame(video_frame);
            counters.frames += 1;

            match self.pipeline.process_frame(&frame, stamp) {
                Ok(output) => {
                    match &output.record {
                        Some(record) => {
                            self.sink.record(record)?;
                            counters.records += 1;
                        }
                        None => counters.lost += 1,
                    }
                    latest = output;
                }
                Err(TrackingError::Detector(err)) => {
                    log::warn!("frame {}: marker detection failed: {err}", stamp.frame_index);
                    counters.detector_errors += 1;
                }
                Err(err) => return Err(err),
            }

            if last_publish.is_none_or(|t| t.elapsed() >= interval) {
                self.publish(&counters, &latest, true);
                last_publish = Some(Instant::now());
            }

            if self.stop.load(Ordering::Acquire) {
                break StopReason::Stopped;
            }
        };

        self.publish(&counters, &latest, false);
        let report = SessionReport {
            stop_reason,
            frames_processed: counters.frames,
            records_emitted: counters.records,
            lost_frames: counters.lost,
            detector_errors: counters.detector_errors,
            elapsed: start.elapsed(),
        };
        log::info!(
            "recording stopped ({:?}): {} frame(s), {} record(s), {} lost",
            report.stop_reason,
            report.frames_processed,
            report.records_emitted,
            report.lost_frames
        );
        Ok(report)
    }

    fn publish(&self, counters: &Counters, latest: &FrameOutput, running: bool) {
        let Ok(mut snapshot) = self.snapshot.write() else {
            log::warn!("snapshot lock poisoned; skipping status update");
            return;
        };
        *snapshot = TrackingSnapshot {
            running,
            frames_processed: counters.frames,
            records_emitted: counters.records,
            lost_frames: counters.lost,
            detector_errors: counters.detector_errors,
            detections: latest.detections.clone(),
            results: latest.results.clone(),
            last_record: latest.record.clone(),
        };
    }
}

impl<B, S, K> RecordingSession<B, S, K>
where
    B: MarkerBackend + Send + 'static,
    S: FrameSource + Send + 'static,
    K: RecordSink + Send + 'static,
{
    /// Run the session on a dedicated worker thread.
    pub fn spawn(mut self) -> SessionHandle<K> {
        let stop = self.stop_flag();
        let snapshot = self.snapshot_handle();
        let join = thread::spawn(move || {
            let report = self.run()?;
            Ok((report, self.into_sink()))
        });
        SessionHandle { stop, snapshot, join }
    }
}

/// Owner-side handle to a session running on its worker thread.
pub struct SessionHandle<K> {
    stop: Arc<AtomicBool>,
    snapshot: Arc<RwLock<TrackingSnapshot>>,
    join: thread::JoinHandle<Result<(SessionReport, K)>>,
}

impl<K> SessionHandle<K> {
    /// Ask the worker to stop after the frame in progress.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Copy of the latest published state.
    pub fn snapshot(&self) -> TrackingSnapshot {
        match self.snapshot.read() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Wait for the worker, returning its report and the sink.
    pub fn join(self) -> Result<(SessionReport, K)> {
        self.join.join().map_err(|_| TrackingError::WorkerPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::marker::MarkerBuilder;
    use crate::test_utils::{ScriptedBackend, frame_with_patch};

    fn pipeline(frames: usize) -> TrackerPipeline<ScriptedBackend> {
        let marker = MarkerBuilder::new().id(1).square(40.0, 30.0, 20.0).build();
        let backend = ScriptedBackend::new(vec![vec![marker]; frames]);
        let mut pipeline = TrackerPipeline::new(backend, &TrackingConfig::default()).unwrap();
        pipeline.set_tracked_ids([1]);
        pipeline
    }

    fn frames(n: usize) -> FrameList {
        FrameList::new(
            (0..n).map(|_| Frame::from(frame_with_patch(80, 60, &[(40, 30, 24, 1)]))),
        )
    }

    fn new_session(
        n: usize,
        config: SessionConfig,
    ) -> RecordingSession<ScriptedBackend, FrameList, Vec<PositionRecord>> {
        RecordingSession::new(pipeline(n), frames(n), Vec::new(), config).unwrap()
    }

    #[test]
    fn test_runs_to_end_of_stream() {
        let config = SessionConfig {
            fps: Some(10.0),
            ..SessionConfig::default()
        };
        let mut session = new_session(4, config);
        let report = session.run().unwrap();
        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        assert_eq!(report.frames_processed, 4);
        assert_eq!(report.records_emitted, 4);

        let snapshot = session.snapshot_handle().read().unwrap().clone();
        assert!(!snapshot.running);
        assert_eq!(snapshot.frames_processed, 4);

        let records = session.into_sink();
        let indices: Vec<u64> = records.iter().map(|r| r.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(records[3].time_s, 0.3);
        assert_eq!(records[2].video_frame, Some(2));
    }

    #[test]
    fn test_frame_limit() {
        let config = SessionConfig {
            max_frames: Some(2),
            ..SessionConfig::default()
        };
        let mut session = new_session(5, config);
        let report = session.run().unwrap();
        assert_eq!(report.stop_reason, StopReason::FrameLimit);
        assert_eq!(report.frames_processed, 2);
    }

    #[test]
    fn test_stop_flag_checked_after_frame() {
        let mut session = new_session(3, SessionConfig::default());
        session.stop_flag().store(true, Ordering::Release);
        let report = session.run().unwrap();
        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert_eq!(report.frames_processed, 1);
    }

    #[test]
    fn test_json_lines_sink() {
        let mut session = RecordingSession::new(
            pipeline(2),
            frames(2),
            JsonLinesSink::new(Vec::new()),
            SessionConfig::default(),
        )
        .unwrap();
        session.run().unwrap();
        let out = String::from_utf8(session.into_sink().into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: PositionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.tag_ids, vec![1]);
    }

    #[test]
    fn test_rejects_zero_frame_rate() {
        let config = SessionConfig {
            fps: Some(0.0),
            ..SessionConfig::default()
        };
        let result =
            RecordingSession::new(pipeline(3), frames(3), Vec::<PositionRecord>::new(), config);
        assert!(matches!(result, Err(ConfigError::InvalidFrameRate(_))));
    }
}
