use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechTokError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("CSV error while {context}: {source}")]
    Csv {
        context: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("failed to load vocabulary table '{path}': {message}")]
    VocabLoad { path: String, message: String },
    #[error("label id {id} has no vocabulary entry")]
    UnknownId { id: usize },
    #[error("unsupported recurrent cell type '{name}' (expected one of: lstm, gru, rnn)")]
    UnsupportedCellType { name: String },
    #[error("unsupported tokenizer unit '{unit}'")]
    UnsupportedUnit { unit: String },
    #[error(
        "audio reference count ({audio_references}) does not match transcript count ({transcripts})"
    )]
    LengthMismatch {
        audio_references: usize,
        transcripts: usize,
    },
    #[error("preprocessing task #{index} ({path}) failed: {source}")]
    TaskFailure {
        index: usize,
        path: String,
        #[source]
        source: Box<SpeechTokError>,
    },
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl SpeechTokError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn csv(context: &'static str, source: csv::Error) -> Self {
        Self::Csv { context, source }
    }

    pub(crate) fn vocab_load(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Self::VocabLoad {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
