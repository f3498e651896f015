//! Mode selection and the start-up sequence shared by every mode.

use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{info, instrument, warn};

use crate::classify::{self, InputKind};
use crate::engine::InferenceEngine;
use crate::session::Session;
use crate::Result;

/// Target that starts the interactive session instead of a one-shot run.
pub const SESSION_TOKEN: &str = "webui";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Session,
    Folder,
    Video,
    Image,
}

impl Mode {
    /// First match wins: session token, existing directory, video extension, else image.
    pub fn select(target: &str) -> Self {
        if target == SESSION_TOKEN {
            Self::Session
        } else if classify::is_directory(target) {
            Self::Folder
        } else if classify::from_extension(target) == InputKind::Video {
            Self::Video
        } else {
            Self::Image
        }
    }

    /// Line printed before a one-shot run. The session prints nothing but the protocol.
    pub fn banner(self) -> Option<&'static str> {
        match self {
            Self::Session => None,
            Self::Folder => Some("Mode: Folder Inference"),
            Self::Video => Some("Mode: Single Video Inference"),
            Self::Image => Some("Mode: Single Image Inference"),
        }
    }
}

/// Build and load the engine, then run the mode `target` selects.
///
/// The engine lives for the duration of this call and is dropped once at the end. If the
/// factory or `load()` fails, nothing is written to `output`.
///
/// # Errors
///
/// Engine construction and load failures, and I/O failures on `input`/`output`.
/// Inference failures in one-shot modes are logged, not returned.
#[instrument(skip_all, fields(config = %config_path.display(), input = target))]
pub fn launch<E, F, R, W>(
    config_path: &Path,
    target: &str,
    factory: F,
    input: R,
    output: W,
) -> Result<Mode>
where
    E: InferenceEngine,
    F: FnOnce(&Path) -> Result<E>,
    R: BufRead,
    W: Write,
{
    let mut engine = factory(config_path)?;
    engine.load()?;

    let mode = Mode::select(target);
    info!(?mode, "engine ready");
    run_mode(&mut engine, mode, target, input, output)?;
    Ok(mode)
}

/// Run one mode against an already loaded engine.
pub fn run_mode<E, R, W>(
    engine: &mut E,
    mode: Mode,
    target: &str,
    input: R,
    mut output: W,
) -> Result<()>
where
    E: InferenceEngine,
    R: BufRead,
    W: Write,
{
    if let Some(banner) = mode.banner() {
        writeln!(output, "{banner}")?;
        output.flush()?;
    }

    let path = Path::new(target);
    let outcome = match mode {
        Mode::Session => {
            Session::new(engine, input, output).run()?;
            return Ok(());
        }
        Mode::Folder => engine.infer_folder(path),
        Mode::Video => engine
            .infer_video(path)
            .map(|out| info!(output = %out.display(), "video done")),
        Mode::Image => engine
            .infer_image(path)
            .map(|out| info!(output = %out.display(), "image done")),
    };

    // one-shot runs are best-effort
    if let Err(e) = outcome {
        warn!(?mode, input = target, error = %e, "inference failed");
    }
    Ok(())
}
