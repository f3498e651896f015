//! Interactive session: a warm engine served over a line-oriented stream.
//!
//! The session writes the handshake, then reads one request at a time and answers it
//! before reading the next. See [`crate::protocol`] for the line grammar.

use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{debug, error, info, instrument};

use crate::classify::{self, InputKind};
use crate::engine::InferenceEngine;
use crate::protocol::{self, Reply, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent the exit token.
    ExitToken,
    /// The input stream was closed.
    EndOfInput,
}

pub struct Session<'e, E, R, W> {
    engine: &'e mut E,
    reader: R,
    writer: W,
    served: u64,
}

impl<'e, E, R, W> Session<'e, E, R, W>
where
    E: InferenceEngine,
    R: BufRead,
    W: Write,
{
    /// `engine` must already be loaded; the session never loads or reloads it.
    pub fn new(engine: &'e mut E, reader: R, writer: W) -> Self {
        Self {
            engine,
            reader,
            writer,
            served: 0,
        }
    }

    /// Serve requests until `exit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error only when reading from or writing to the transport fails.
    /// Inference failures are answered with an `ERROR:` reply and the loop continues.
    #[instrument(skip_all)]
    pub fn run(mut self) -> io::Result<SessionEnd> {
        protocol::write_handshake(&mut self.writer)?;
        info!("session ready");

        let mut buf = Vec::new();
        let end = loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                break SessionEnd::EndOfInput;
            }
            protocol::strip_line_ending(&mut buf);

            let reply = match std::str::from_utf8(&buf) {
                Ok(line) => match Request::parse(line) {
                    Request::Exit => break SessionEnd::ExitToken,
                    Request::Blank => continue,
                    Request::Infer(path) => self.dispatch(path),
                },
                Err(e) => {
                    error!(%e, "request is not valid UTF-8");
                    Reply::Error(format!("request is not valid UTF-8: {e}"))
                }
            };

            reply.write_to(&mut self.writer)?;
            self.served += 1;
        };

        info!(?end, served = self.served, "session finished");
        Ok(end)
    }

    // No directory check here: a directory path goes to image inference and fails there.
    fn dispatch(&mut self, line: &str) -> Reply {
        let path = Path::new(line);
        let result = match classify::from_extension(line) {
            InputKind::Video => {
                debug!(path = line, "video request");
                self.engine.infer_video(path)
            }
            _ => {
                debug!(path = line, "image request");
                self.engine.infer_image(path)
            }
        };

        match result {
            Ok(output) => Reply::Result(output),
            Err(e) => {
                error!(path = line, error = %e, "inference failed");
                Reply::Error(e.to_string())
            }
        }
    }
}
