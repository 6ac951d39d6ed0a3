//! Integration module for running the tracker over a stream of frames.
//!
//! [`TrackerPipeline`] turns one frame into one optional [`PositionRecord`];
//! [`RecordingSession`] drives it from a [`FrameSource`] on a dedicated
//! worker, handing records to a [`RecordSink`].
//!
//! [`PositionRecord`]: crate::tracker::PositionRecord

mod pipeline;
mod session;

pub use pipeline::{FrameOutput, TrackerPipeline};
pub use session::{
    FrameList, FrameSource, JsonLinesSink, RecordSink, RecordingSession, SessionHandle,
    SessionReport, SourceFrame, StopReason, TrackingSnapshot,
};
