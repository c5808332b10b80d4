/// Crate-wide result alias.
pub type FrameplotResult<T> = Result<T, FrameplotError>;

/// Error taxonomy for conversion and playback.
///
/// Per-segment geometry problems are never errors; they are counted in
/// [`SegmentStats`](crate::SegmentStats) and dropped.
#[derive(thiserror::Error, Debug)]
pub enum FrameplotError {
    /// A frame key was present without any path data.
    #[error("conversion error: frame '{frame}' has no path data")]
    Conversion {
        /// Offending frame key.
        frame: String,
    },

    /// `play` was called while another session was presenting or retracting.
    #[error("playback error: a playback session is already running")]
    AlreadyRunning,

    /// The rendering sink rejected an add/remove call.
    #[error("sink error: {0}")]
    Sink(String),

    /// Invalid options or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Input or output could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Anything else, with its source preserved.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FrameplotError {
    /// Structural conversion failure for `frame`.
    pub fn conversion(frame: impl Into<String>) -> Self {
        Self::Conversion {
            frame: frame.into(),
        }
    }

    /// Sink failure.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// (De)serialization failure.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for FrameplotError {
    fn from(e: serde_json::Error) -> Self {
        Self::serde(e.to_string())
    }
}
