use thiserror::Error;

/// Error taxonomy for the subtitling/dubbing pipeline.
///
/// Some variants are fatal to the whole run (media decode, bad config);
/// others are recovered locally by the component that raised them and
/// only ever reach a caller embedded in a log line or a negative-progress
/// event — see each component's "Failure semantics".
#[derive(Error, Debug)]
pub enum AutosubError {
    #[error("failed to probe media duration: {0}")]
    MediaProbe(String),

    #[error("failed to extract media segment: {0}")]
    MediaExtract(String),

    #[error("failed to mux media: {0}")]
    MediaMux(String),

    #[error("voice activity detection unavailable: {0}")]
    VadUnavailable(String),

    #[error("chunk transcription failed: {0}")]
    AsrChunkFailed(String),

    #[error("translation batch failed: {0}")]
    TranslationBatchFailed(String),

    #[error("review batch rejected: {0}")]
    ReviewBatchRejected(String),

    #[error("text-to-speech failed: {0}")]
    TtsFailed(String),

    #[error("dub clip fit failed: {0}")]
    DubFitFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("API error: {0}")]
    Api(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutosubError {
    /// Whether this error must abort the whole run rather than being
    /// recovered locally and folded into a partial result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutosubError::MediaProbe(_)
                | AutosubError::MediaExtract(_)
                | AutosubError::MediaMux(_)
                | AutosubError::VadUnavailable(_)
                | AutosubError::FileNotFound(_)
                | AutosubError::Config(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AutosubError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, AutosubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds() {
        assert!(AutosubError::MediaProbe("x".into()).is_fatal());
        assert!(AutosubError::VadUnavailable("x".into()).is_fatal());
        assert!(!AutosubError::AsrChunkFailed("x".into()).is_fatal());
        assert!(!AutosubError::TranslationBatchFailed("x".into()).is_fatal());
    }

    #[test]
    fn cancelled_is_not_fatal_or_logged_as_error() {
        let e = AutosubError::Cancelled;
        assert!(e.is_cancelled());
        assert!(!e.is_fatal());
    }
}
