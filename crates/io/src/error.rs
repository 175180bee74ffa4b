use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse GPX: {0}")]
    Gpx(String),
    #[error("no tracks with usable points in {0}")]
    NoTracks(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
