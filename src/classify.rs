//! Input path classification.
//!
//! Classification only looks at the text after the last `.` and, for directories, performs
//! a single `stat`. File contents are never opened.

use std::fs;
use std::path::Path;

/// Extensions routed to video inference. Matching is case-sensitive.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mkv", "mov"];

/// Extensions routed to image inference. Matching is case-sensitive.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Image,
    Video,
    Directory,
    /// Callers fall back to image inference.
    Unknown,
}

/// Text after the last `.`, or the whole string when there is none.
pub fn extension(path: &str) -> &str {
    path.rsplit_once('.').map_or(path, |(_, ext)| ext)
}

/// Classify by extension alone, without touching the filesystem.
pub fn from_extension(path: &str) -> InputKind {
    let ext = extension(path);
    if VIDEO_EXTENSIONS.contains(&ext) {
        InputKind::Video
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        InputKind::Image
    } else {
        InputKind::Unknown
    }
}

pub fn is_directory(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Extension sets first, then the directory check for anything they do not match.
pub fn classify(path: &str) -> InputKind {
    match from_extension(path) {
        InputKind::Unknown if is_directory(path) => InputKind::Directory,
        kind => kind,
    }
}
