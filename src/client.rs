//! Parent-process side of the interactive session.
//!
//! [`SessionClient`] starts the binary in session mode and keeps it warm; [`Channel`] holds
//! the request/reply logic over any reader/writer pair.

use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use tracing::{debug, info, warn};

use crate::dispatch::SESSION_TOKEN;
use crate::protocol::{self, Reply, EXIT_TOKEN, HANDSHAKE};
use crate::{Error, Result};

pub struct Channel<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Channel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        protocol::strip_line_ending(&mut buf);
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Block until the handshake line arrives. Anything printed before it is skipped.
    pub fn wait_ready(&mut self) -> Result<()> {
        while let Some(line) = self.read_line()? {
            if line == HANDSHAKE {
                return Ok(());
            }
            debug!(line = %line, "skipping output before handshake");
        }
        Err(Error::HandshakeFailed)
    }

    /// Send one path and wait for its reply.
    pub fn request(&mut self, path: &Path) -> Result<PathBuf> {
        let line = path
            .to_str()
            .ok_or_else(|| Error::InvalidRequest(format!("non UTF-8 path {}", path.display())))?;
        if line.is_empty() || line == EXIT_TOKEN || line.contains(['\n', '\r']) {
            return Err(Error::InvalidRequest(format!("{line:?} cannot be sent as a path")));
        }

        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;

        match self.read_line()?.map(|l| Reply::parse(&l)) {
            Some(Reply::Result(output)) => Ok(output),
            Some(Reply::Error(message)) => Err(Error::Remote(message)),
            None => Err(Error::Disconnected),
        }
    }

    pub fn send_exit(&mut self) -> Result<()> {
        writeln!(self.writer, "{EXIT_TOKEN}")?;
        self.writer.flush()?;
        Ok(())
    }
}

type ChildChannel = Channel<BufReader<ChildStdout>, ChildStdin>;

/// A running session child process. A child that dies between requests is started again.
pub struct SessionClient {
    program: OsString,
    config_path: PathBuf,
    child: Child,
    channel: ChildChannel,
}

fn start(program: &OsStr, config_path: &Path) -> Result<(Child, ChildChannel)> {
    let mut child = Command::new(program)
        .arg(config_path)
        .arg(SESSION_TOKEN)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        let _ = child.kill();
        return Err(Error::HandshakeFailed);
    };

    let mut channel = Channel::new(BufReader::new(stdout), stdin);
    if let Err(e) = channel.wait_ready() {
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }
    info!(pid = child.id(), "session ready");
    Ok((child, channel))
}

/// The peer went away while the request was in flight.
fn is_dead_pipe(e: &Error) -> bool {
    match e {
        Error::Disconnected => true,
        Error::Io(io) => io.kind() == ErrorKind::BrokenPipe,
        _ => false,
    }
}

impl SessionClient {
    /// Start `program <config_path> webui` and wait for its handshake. The child's stderr
    /// is inherited so its logs stay visible.
    pub fn spawn(program: impl AsRef<OsStr>, config_path: &Path) -> Result<Self> {
        let program = program.as_ref().to_os_string();
        let (child, channel) = start(&program, config_path)?;
        Ok(Self {
            program,
            config_path: config_path.to_path_buf(),
            child,
            channel,
        })
    }

    /// Send one path. If the child has exited it is restarted first, and a request that
    /// finds the pipe closed is sent once more to a fresh child.
    pub fn infer(&mut self, path: &Path) -> Result<PathBuf> {
        if !self.is_running() {
            self.restart()?;
        }
        match self.channel.request(path) {
            Err(e) if is_dead_pipe(&e) => {
                warn!(error = %e, "session died during request");
                self.restart()?;
                self.channel.request(path)
            }
            reply => reply,
        }
    }

    fn restart(&mut self) -> Result<()> {
        let _ = self.child.kill();
        match self.child.wait() {
            Ok(status) => info!(%status, "restarting session"),
            Err(e) => warn!(error = %e, "restarting session"),
        }
        let (child, channel) = start(&self.program, &self.config_path)?;
        self.child = child;
        self.channel = channel;
        Ok(())
    }

    /// Whether the child has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the session to exit and wait for the process.
    pub fn close(mut self) -> Result<ExitStatus> {
        if let Err(e) = self.channel.send_exit() {
            warn!(error = %e, "could not send exit");
        }
        Ok(self.child.wait()?)
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn channel(server_output: &str) -> Channel<Cursor<Vec<u8>>, Vec<u8>> {
        Channel::new(Cursor::new(server_output.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn handshake_skips_noise() {
        let mut ch = channel("loading model\nwarming up\nREADY\n");
        ch.wait_ready().unwrap();
    }

    #[test]
    fn missing_handshake_fails() {
        let mut ch = channel("loading model\n");
        assert!(matches!(ch.wait_ready(), Err(Error::HandshakeFailed)));
    }

    #[test]
    fn request_writes_line_and_reads_reply() {
        let mut ch = channel("READY\nresults/result_a.png\nERROR: cannot open b.png\n");
        ch.wait_ready().unwrap();

        let out = ch.request(Path::new("a.png")).unwrap();
        assert_eq!(out, PathBuf::from("results/result_a.png"));

        match ch.request(Path::new("b.png")) {
            Err(Error::Remote(message)) => assert_eq!(message, "cannot open b.png"),
            other => panic!("unexpected {other:?}"),
        }

        ch.send_exit().unwrap();
        assert_eq!(ch.writer, b"a.png\nb.png\nexit\n");
    }

    #[test]
    fn closed_stream_is_disconnect() {
        let mut ch = channel("READY\n");
        ch.wait_ready().unwrap();
        assert!(matches!(ch.request(Path::new("a.png")), Err(Error::Disconnected)));
    }

    #[cfg(unix)]
    #[test]
    fn spawned_child_speaks_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_session.sh");
        std::fs::write(
            &script,
            "[ \"$1\" = webui ] || exit 3\n\
             echo booting\n\
             echo READY\n\
             while read -r line; do\n\
             [ \"$line\" = exit ] && exit 0\n\
             echo \"out/$line\"\n\
             done\n",
        )
        .unwrap();

        let mut client = SessionClient::spawn("sh", &script).unwrap();
        assert!(client.is_running());
        assert_eq!(client.infer(Path::new("x.png")).unwrap(), PathBuf::from("out/x.png"));
        assert_eq!(client.infer(Path::new("y.mp4")).unwrap(), PathBuf::from("out/y.mp4"));
        assert!(client.close().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn dead_child_is_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("one_shot.sh");
        let starts = dir.path().join("starts.log");
        std::fs::write(
            &script,
            format!(
                "echo started >> '{}'\n\
                 echo READY\n\
                 read -r line || exit 0\n\
                 echo \"out/$line\"\n\
                 exit 0\n",
                starts.display()
            ),
        )
        .unwrap();

        let mut client = SessionClient::spawn("sh", &script).unwrap();
        for name in ["a.png", "b.png", "c.mp4"] {
            assert_eq!(
                client.infer(Path::new(name)).unwrap(),
                Path::new("out").join(name)
            );
        }
        let started = std::fs::read_to_string(&starts).unwrap();
        assert_eq!(started.lines().count(), 3, "{started}");
    }

    #[cfg(unix)]
    #[test]
    fn restart_that_fails_handshake_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("once.sh");
        let marker = dir.path().join("ran");
        std::fs::write(
            &script,
            format!(
                "[ -e '{m}' ] && exit 1\n\
                 touch '{m}'\n\
                 echo READY\n\
                 read -r line\n\
                 echo \"out/$line\"\n",
                m = marker.display()
            ),
        )
        .unwrap();

        let mut client = SessionClient::spawn("sh", &script).unwrap();
        assert_eq!(client.infer(Path::new("a.png")).unwrap(), PathBuf::from("out/a.png"));
        assert!(matches!(
            client.infer(Path::new("b.png")),
            Err(Error::HandshakeFailed)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn child_exiting_early_fails_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sh");
        std::fs::write(&script, "echo 'model not found' >&2\nexit 1\n").unwrap();

        assert!(matches!(
            SessionClient::spawn("sh", &script),
            Err(Error::HandshakeFailed)
        ));
    }

    #[test]
    fn unsendable_paths_are_rejected() {
        let mut ch = channel("READY\n");
        for bad in ["", "exit", "a\nb.png"] {
            assert!(
                matches!(ch.request(Path::new(bad)), Err(Error::InvalidRequest(_))),
                "{bad:?}"
            );
        }
        assert!(ch.writer.is_empty());
    }
}
