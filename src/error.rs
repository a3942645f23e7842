use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure surface of the extraction and routing pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The OCR engine rejected an image mid-pass. Terminal for the whole
    /// pass; nothing recognized earlier in the same pass is kept.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("session store failure: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("an extraction pass is already running")]
    ExtractionInProgress,

    #[error("previous extraction failure has not been acknowledged")]
    FailureNotAcknowledged,

    #[error("no images queued for extraction")]
    NoImagesQueued,

    #[error("no addresses available for routing")]
    EmptyRoster,

    #[error("could not decode image {name}: {source}")]
    UnreadableImage {
        name: String,
        #[source]
        source: image::ImageError,
    },
}
