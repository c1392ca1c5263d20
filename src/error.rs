use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Stage of the smart generation pipeline that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Optimizing,
    Generating,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Optimizing => "optimizing",
            Stage::Generating => "generating",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable client configuration, raised at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller supplied parameter is outside its contract. No request was sent.
    #[error("invalid `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-2xx status
    #[error("api error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("unexpected response: {0}")]
    ResponseFormat(String),

    #[error("smart generation failed while {stage}: {source}")]
    Pipeline {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("timed out after {0:?} waiting for task result")]
    Timeout(Duration),
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn at(stage: Stage) -> impl FnOnce(Error) -> Error {
        move |source| Error::Pipeline {
            stage,
            source: Box::new(source),
        }
    }

    /// The pipeline stage that failed, if this error came out of smart generation
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, looking through pipeline stage tags
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status of an [Error::Api], looking through pipeline stage tags
    pub fn status(&self) -> Option<StatusCode> {
        match self.root() {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::ResponseFormat(error.to_string())
    }
}
