use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("engine used before load()")]
    NotLoaded,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("video inference is not available in this build (enable the `video` feature)")]
    VideoUnsupported,

    #[error("video processing failed: {0}")]
    Video(String),

    #[error("session did not send the handshake")]
    HandshakeFailed,

    #[error("session closed before replying")]
    Disconnected,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("remote inference error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(feature = "video")]
impl From<opencv::Error> for Error {
    fn from(e: opencv::Error) -> Self {
        Error::Video(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
