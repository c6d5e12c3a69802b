//! Core data types threaded through every pipeline stage (spec §3).

use serde::{Deserialize, Serialize};

/// A half-open time range in seconds. Used for VAD blocks, planned chunks,
/// and repair gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start_sec: f64,
    pub end_sec: f64,
}

impl Interval {
    pub fn new(start_sec: f64, end_sec: f64) -> Self {
        Self { start_sec, end_sec }
    }

    pub fn duration(&self) -> f64 {
        (self.end_sec - self.start_sec).max(0.0)
    }

    pub fn is_degenerate(&self) -> bool {
        self.end_sec <= self.start_sec
    }

    /// Gap in seconds between the end of `self` and the start of `other`.
    /// Negative when the intervals overlap.
    pub fn gap_to(&self, other: &Interval) -> f64 {
        other.start_sec - self.end_sec
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start_sec < other.end_sec && other.start_sec < self.end_sec
    }

    pub fn clamp_to(&self, bounds: &Interval) -> Interval {
        Interval {
            start_sec: self.start_sec.max(bounds.start_sec),
            end_sec: self.end_sec.min(bounds.end_sec),
        }
    }
}

/// A word with its timestamp, as returned by ASR providers that expose
/// word-level timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

/// The unit of transcription/translation output (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// 1-based, dense after finalization.
    pub index: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    /// Source-language text. May be empty for anchor/silence markers.
    pub original: String,
    /// Present after translation; may be empty if judged redundant.
    pub translation: Option<String>,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
    #[serde(default)]
    pub words: Vec<WordTimestamp>,
    /// Monotonic marker set by the review pass; newest batch wins on overlap.
    pub reviewed_in_batch: Option<u32>,
}

impl Segment {
    pub fn new(start_sec: f64, end_sec: f64, original: impl Into<String>) -> Self {
        Self {
            index: 0,
            start_sec,
            end_sec,
            original: original.into(),
            translation: None,
            avg_logprob: None,
            no_speech_prob: None,
            words: Vec::new(),
            reviewed_in_batch: None,
        }
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start_sec, self.end_sec)
    }

    pub fn duration(&self) -> f64 {
        (self.end_sec - self.start_sec).max(0.0)
    }

    /// Text that should be rendered for this segment: the translation when
    /// present, otherwise the original.
    pub fn display_text(&self) -> &str {
        match &self.translation {
            Some(t) if !t.is_empty() => t.as_str(),
            _ => self.original.as_str(),
        }
    }
}

/// Re-index a segment sequence to dense, 1-based indices in start order.
/// Enforces I1/I2: strictly ordered by `start_sec`, overlaps allowed.
pub fn reindex(segments: &mut [Segment]) {
    segments.sort_by(|a, b| {
        a.start_sec
            .partial_cmp(&b.start_sec)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, segment) in segments.iter_mut().enumerate() {
        segment.index = i + 1;
    }
}

/// Opaque identifier for one pipeline run, used in logs, temp filenames,
/// and the cancellation registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64) -> Segment {
        Segment::new(start, end, "x")
    }

    #[test]
    fn interval_duration_and_degenerate() {
        let i = Interval::new(2.0, 6.0);
        assert_eq!(i.duration(), 4.0);
        assert!(!i.is_degenerate());
        assert!(Interval::new(5.0, 5.0).is_degenerate());
    }

    #[test]
    fn interval_gap_and_overlap() {
        let a = Interval::new(0.0, 5.0);
        let b = Interval::new(6.0, 10.0);
        assert_eq!(a.gap_to(&b), 1.0);
        assert!(!a.overlaps(&b));

        let c = Interval::new(4.0, 8.0);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn reindex_sorts_and_renumbers() {
        let mut segments = vec![seg(10.0, 12.0), seg(0.0, 2.0), seg(5.0, 6.0)];
        reindex(&mut segments);
        assert_eq!(segments[0].start_sec, 0.0);
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[1].start_sec, 5.0);
        assert_eq!(segments[1].index, 2);
        assert_eq!(segments[2].start_sec, 10.0);
        assert_eq!(segments[2].index, 3);
    }

    #[test]
    fn reindex_preserves_stacked_overlaps() {
        // I2 allows overlap, forbids reordering only.
        let mut segments = vec![seg(0.0, 5.0), seg(1.0, 3.0)];
        reindex(&mut segments);
        assert!(segments[0].start_sec <= segments[1].start_sec);
    }

    #[test]
    fn display_text_prefers_translation() {
        let mut s = seg(0.0, 1.0);
        s.original = "hello".into();
        assert_eq!(s.display_text(), "hello");
        s.translation = Some("hola".into());
        assert_eq!(s.display_text(), "hola");
        s.translation = Some(String::new());
        assert_eq!(s.display_text(), "hello");
    }

    #[test]
    fn operation_ids_are_unique() {
        let a = OperationId::new();
        let b = OperationId::new();
        assert_ne!(a, b);
    }
}
