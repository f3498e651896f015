use std::path::{Path, PathBuf};

use crate::Result;

/// A warm inference backend.
///
/// One instance is constructed and loaded per process, then every mode borrows it mutably
/// for as long as it runs. Implementations keep whatever per-call state they need.
pub trait InferenceEngine {
    /// Load the model. Calling it again on a loaded engine is a no-op.
    fn load(&mut self) -> Result<()>;

    /// Run one image and return the path of the rendered result.
    fn infer_image(&mut self, path: &Path) -> Result<PathBuf>;

    /// Run every frame of a video and return the path of the rendered result.
    fn infer_video(&mut self, path: &Path) -> Result<PathBuf>;

    /// Run every image in a directory, writing results to the configured output location.
    fn infer_folder(&mut self, dir: &Path) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    use super::InferenceEngine;
    use crate::{Error, Result};

    /// Shared, ordered record of engine calls and transport writes.
    pub type EventLog = Rc<RefCell<Vec<String>>>;

    /// Engine that records each call and answers with `out/<name>`.
    ///
    /// Paths containing `fail` produce an inference error.
    pub struct RecordingEngine {
        pub log: EventLog,
        pub loads: usize,
        pub fail_load: bool,
    }

    impl RecordingEngine {
        pub fn new(log: EventLog) -> Self {
            Self {
                log,
                loads: 0,
                fail_load: false,
            }
        }

        fn reply(&self, op: &str, path: &Path) -> Result<PathBuf> {
            let shown = path.display().to_string();
            self.log.borrow_mut().push(format!("{op}:{shown}"));
            if shown.contains("fail") {
                return Err(Error::Inference(format!("cannot read {shown}")));
            }
            Ok(PathBuf::from("out").join(shown.replace('/', "_")))
        }
    }

    impl InferenceEngine for RecordingEngine {
        fn load(&mut self) -> Result<()> {
            self.log.borrow_mut().push("load".to_string());
            if self.fail_load {
                return Err(Error::ModelLoad("no such model".to_string()));
            }
            self.loads += 1;
            Ok(())
        }

        fn infer_image(&mut self, path: &Path) -> Result<PathBuf> {
            self.reply("image", path)
        }

        fn infer_video(&mut self, path: &Path) -> Result<PathBuf> {
            self.reply("video", path)
        }

        fn infer_folder(&mut self, dir: &Path) -> Result<()> {
            self.reply("folder", dir).map(|_| ())
        }
    }

    /// Writer that logs every flushed line into the shared event log.
    pub struct LoggingWriter {
        pub log: EventLog,
        pending: Vec<u8>,
    }

    impl LoggingWriter {
        pub fn new(log: EventLog) -> Self {
            Self {
                log,
                pending: Vec::new(),
            }
        }
    }

    impl std::io::Write for LoggingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            let mut log = self.log.borrow_mut();
            for line in text.lines() {
                log.push(format!("out:{line}"));
            }
            Ok(())
        }
    }

    pub fn events(log: &EventLog) -> Vec<String> {
        log.borrow().clone()
    }
}
