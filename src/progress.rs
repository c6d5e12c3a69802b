//! Progress reporting as data (spec §3, §4.9). The library never renders
//! anything itself — it emits [`ProgressEvent`]s down an mpsc channel; the
//! CLI binary is one consumer that happens to draw `indicatif` bars.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Stable, localization-key-shaped stage identifiers.
pub mod stage {
    pub const EXTRACT: &str = "extract";
    pub const CHUNK: &str = "chunk";
    pub const TRANSCRIBE: &str = "transcribe";
    pub const SCRUB: &str = "scrub";
    pub const REPAIR: &str = "repair";
    pub const TRANSLATE: &str = "translate";
    pub const REVIEW: &str = "review";
    pub const DUB: &str = "dub";
    pub const FINALIZE: &str = "finalize";
    pub const DONE: &str = "done";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 0..=100, or -1 to report a recovered per-item failure without
    /// moving the overall percentage.
    pub percent: i32,
    pub stage: String,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub partial_artifact: Option<String>,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn stage_progress(stage: &str, percent: i32) -> Self {
        Self {
            percent,
            stage: stage.to_string(),
            current: None,
            total: None,
            partial_artifact: None,
            error: None,
        }
    }

    pub fn item_progress(stage: &str, percent: i32, current: u64, total: u64) -> Self {
        Self {
            percent,
            stage: stage.to_string(),
            current: Some(current),
            total: Some(total),
            partial_artifact: None,
            error: None,
        }
    }

    /// A recovered per-item failure: does not advance the overall track.
    pub fn item_failed(stage: &str, error: impl Into<String>) -> Self {
        Self {
            percent: -1,
            stage: stage.to_string(),
            current: None,
            total: None,
            partial_artifact: None,
            error: Some(error.into()),
        }
    }

    pub fn failed(stage: &str, error: impl Into<String>) -> Self {
        Self {
            percent: 100,
            stage: stage.to_string(),
            current: None,
            total: None,
            partial_artifact: None,
            error: Some(error.into()),
        }
    }

    pub fn with_partial_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.partial_artifact = Some(artifact.into());
        self
    }
}

/// A band of the overall 0..=100 track allocated to one stage (spec §4.9).
#[derive(Debug, Clone, Copy)]
pub struct ProgressBand {
    pub start: i32,
    pub end: i32,
}

impl ProgressBand {
    pub const fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Scale a 0.0..=1.0 fraction of stage-local progress into this band.
    pub fn scale(&self, fraction: f64) -> i32 {
        let fraction = fraction.clamp(0.0, 1.0);
        self.start + ((self.end - self.start) as f64 * fraction).round() as i32
    }
}

/// Sink half of the progress channel, cloned into every stage.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Idempotent-safe: re-emitting the same stage/percent is allowed and
    /// expected (spec §4.9). Silently drops the event if the receiver has
    /// gone away, since progress is best-effort.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
