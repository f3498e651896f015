pub mod classify;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod segmentation;
pub mod session;
pub mod utils;
#[cfg(feature = "video")]
pub mod video;

pub use config::EngineConfig;
pub use engine::InferenceEngine;
pub use error::{Error, Result};
