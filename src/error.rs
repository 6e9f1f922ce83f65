use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelopError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("{service} failed: {reason}")]
    Collaborator { service: &'static str, reason: String },

    #[error("{tool} failed while {action}: {diagnostic}")]
    Toolchain {
        tool: String,
        action: String,
        diagnostic: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelopError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn collaborator(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Collaborator {
            service,
            reason: reason.into(),
        }
    }

    pub fn toolchain(
        tool: impl Into<String>,
        action: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self::Toolchain {
            tool: tool.into(),
            action: action.into(),
            diagnostic: diagnostic.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TelopError>;

/// Non-fatal conditions. Processing continues with the documented fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum TimingWarning {
    LineCountMismatch {
        first: &'static str,
        first_count: usize,
        second: &'static str,
        second_count: usize,
    },
    NoWordTimestamps { lines: usize },
    WordsExhausted { line: usize },
    EmptyLineSkipped { line: usize },
    WavFormatMismatch { clip: usize, detail: String },
}

impl fmt::Display for TimingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingWarning::LineCountMismatch {
                first,
                first_count,
                second,
                second_count,
            } => write!(
                f,
                "{} has {} lines but {} has {}; truncating both to {}",
                first,
                first_count,
                second,
                second_count,
                first_count.min(second_count)
            ),
            TimingWarning::NoWordTimestamps { lines } => write!(
                f,
                "no word timestamps available; dividing audio equally across {} lines",
                lines
            ),
            TimingWarning::WordsExhausted { line } => write!(
                f,
                "word timestamps ran out at line {}; using equal subdivision from there",
                line
            ),
            TimingWarning::EmptyLineSkipped { line } => {
                write!(f, "line {} has no speakable characters; skipped", line)
            }
            TimingWarning::WavFormatMismatch { clip, detail } => {
                write!(f, "audio clip {} differs from the first clip: {}", clip, detail)
            }
        }
    }
}
