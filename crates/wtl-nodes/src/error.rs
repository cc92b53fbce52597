use thiserror::Error;

/// A control-panel request that could not be applied to the store.
/// Every variant maps to a 400 response with `reason` set to the message.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("invalid JSON body: {0}")]
    InvalidBody(String),

    #[error("{0} missing")]
    MissingField(&'static str),

    #[error("unknown node_type '{0}'")]
    UnknownNodeType(String),

    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("parameter '{0}' missing")]
    MissingParam(String),

    #[error("parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
}

/// Failure turning a frame into a preview payload. Logged and dropped at the
/// push site; the polling loop never sees it.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("frame has no pixels")]
    EmptyFrame,

    #[error("unsupported channel count {0}")]
    UnsupportedChannels(usize),

    #[error("frame buffer holds {actual} samples, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
