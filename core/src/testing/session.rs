//! Pseudo-terminal sessions with the candidate shell.
//!
//! The candidate runs as a session leader with the pty slave as its controlling
//! terminal, so keystrokes like Ctrl-Z reach its foreground process group through the
//! line discipline, exactly as they would from a real terminal.

use std::{
    fs::File,
    io::{self, Read as _, Write as _},
    os::fd::{AsRawFd, OwnedFd},
    path::Path,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::Context as _;
use nix::{
    fcntl::{fcntl, FcntlArg, OFlag},
    libc,
    pty::{openpty, Winsize},
};
use tokio::{
    io::unix::AsyncFd,
    process::{Child, Command},
    time::{timeout_at, Instant},
};

use super::failure::{AssertionFailure, CheckError};

pub const CTRL_C: u8 = 3;
pub const CTRL_Z: u8 = 26;

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;
const READ_CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Timed out after {:.1}s waiting for {pattern:?}, got {pending:?}", .timeout.as_secs_f64())]
    Timeout {
        pattern: String,
        timeout: Duration,
        pending: String,
    },

    #[error("Shell terminated ({status}) while waiting for {pattern:?}, got {pending:?}")]
    Eof {
        pattern: String,
        status: String,
        pending: String,
    },

    #[error("pty I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof { .. })
    }
}

impl From<SessionError> for CheckError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Io(e) => CheckError::Fatal(anyhow::Error::new(e).context("pty session")),
            other => CheckError::Failed(AssertionFailure::new(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Spawned,
    Matching,
    Ready,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Replaces the inherited environment entirely when set.
    env: Option<Vec<(String, String)>>,
    rows: u16,
    cols: u16,
    timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            env: None,
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SessionOptions {
    pub fn env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn window_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One pty-attached child.
///
/// Dropping a session kills the child (`kill_on_drop`) and closes the pty master, so
/// cleanup also happens when a check bails out early; [`Session::close`] does the same
/// and additionally reaps the child.
#[derive(Debug)]
pub struct Session {
    child: Child,
    master: AsyncFd<File>,
    pending: Vec<u8>,
    before: String,
    state: SessionState,
    exit_status: Option<ExitStatus>,
    timeout: Duration,
}

impl Session {
    pub fn spawn(program: impl AsRef<Path>, opts: SessionOptions) -> anyhow::Result<Self> {
        let program = program.as_ref();
        let winsize = Winsize {
            ws_row: opts.rows,
            ws_col: opts.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None).context("Failed to allocate pty")?;
        set_nonblocking(&pty.master).context("Failed to make pty master non-blocking")?;

        let child = {
            let mut cmd = Command::new(program);
            if let Some(env) = &opts.env {
                cmd.env_clear().envs(env.iter().map(|(k, v)| (k, v)));
            }
            cmd.stdin(Stdio::from(pty.slave.try_clone()?))
                .stdout(Stdio::from(pty.slave.try_clone()?))
                .stderr(Stdio::from(pty.slave))
                .kill_on_drop(true);
            // SAFETY: only async-signal-safe calls between fork and exec.
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()?;
                    if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) < 0 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
            cmd.spawn()
                .with_context(|| format!("Failed to spawn '{}'", program.to_string_lossy()))?
            // `cmd` drops here, closing the parent's copies of the slave
        };
        log::debug!(
            "Spawned {} on a pty (pid {:?})",
            program.to_string_lossy(),
            child.id()
        );

        let master = AsyncFd::new(File::from(pty.master)).context("Failed to register pty")?;
        Ok(Self {
            child,
            master,
            pending: Vec::new(),
            before: String::new(),
            state: SessionState::Spawned,
            exit_status: None,
            timeout: opts.timeout,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Output between the previous match and the latest one.
    pub fn before(&self) -> &str {
        &self.before
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.and_then(|s| s.code())
    }

    /// Blocks until the output contains `pattern`, consuming everything up to and
    /// including it.
    pub async fn expect(&mut self, pattern: &str) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.timeout;
        if self.state != SessionState::Terminated {
            self.state = SessionState::Matching;
        }
        loop {
            if let Some(pos) = find(&self.pending, pattern.as_bytes()) {
                let consumed: Vec<u8> = self.pending.drain(..pos + pattern.len()).collect();
                self.before = String::from_utf8_lossy(&consumed[..pos]).into_owned();
                if self.state != SessionState::Terminated {
                    self.state = SessionState::Ready;
                }
                return Ok(());
            }

            if self.state == SessionState::Terminated {
                self.before = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Err(SessionError::Eof {
                    pattern: pattern.to_owned(),
                    status: self.describe_exit(),
                    pending: self.before.clone(),
                });
            }

            match timeout_at(deadline, self.fill()).await {
                Err(_elapsed) => {
                    return Err(SessionError::Timeout {
                        pattern: pattern.to_owned(),
                        timeout: self.timeout,
                        pending: String::from_utf8_lossy(&self.pending).into_owned(),
                    })
                }
                Ok(Ok(0)) => self.on_eof().await?,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn send_line(&mut self, text: &str) -> Result<(), SessionError> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.write_all(&line).await
    }

    /// A single keystroke such as [`CTRL_Z`], without a line terminator.
    pub async fn send_raw(&mut self, byte: u8) -> Result<(), SessionError> {
        self.write_all(&[byte]).await
    }

    pub fn set_window_size(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: TIOCSWINSZ reads a `winsize` from a valid pointer.
        let ret = unsafe {
            libc::ioctl(
                self.master.get_ref().as_raw_fd(),
                libc::TIOCSWINSZ as _,
                &winsize,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Kills the child if it is still running and reaps it.
    pub async fn close(mut self) {
        if self.exit_status.is_some() {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                return;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Failed to poll shell: {:#}", e),
        }
        if let Err(e) = self.child.start_kill() {
            log::warn!("Failed to kill shell: {:#}", e);
        }
        match self.child.wait().await {
            Ok(status) => self.exit_status = Some(status),
            Err(e) => log::warn!("Failed to reap shell: {:#}", e),
        }
        self.state = SessionState::Terminated;
    }

    /// Reads whatever is available into `pending`; `Ok(0)` means end of output.
    async fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let mut guard = self.master.readable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(&mut chunk)
            }) {
                Ok(Ok(n)) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                // Linux reports a hung-up slave as EIO rather than EOF.
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => return Ok(0),
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_all(&mut self, mut data: &[u8]) -> Result<(), SessionError> {
        while !data.is_empty() {
            let mut guard = self.master.writable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write(data)
            }) {
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) => return Err(e.into()),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    async fn on_eof(&mut self) -> io::Result<()> {
        self.state = SessionState::Terminated;
        if self.exit_status.is_none() {
            self.exit_status = Some(self.child.wait().await?);
        }
        Ok(())
    }

    fn describe_exit(&self) -> String {
        match self.exit_status {
            Some(status) => status.to_string(),
            None => "no exit status".to_owned(),
        }
    }
}

fn set_nonblocking(fd: &OwnedFd) -> nix::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sh() -> Session {
        let opts = SessionOptions::default()
            .env(vec![
                ("PS1".into(), "$ ".into()),
                ("PATH".into(), "/usr/bin:/bin".into()),
            ])
            .timeout(Duration::from_secs(5));
        Session::spawn("/bin/sh", opts).unwrap()
    }

    #[test]
    fn find_locates_needle() {
        assert_eq!(find(b"abc$ ", b"$"), Some(3));
        assert_eq!(find(b"abc", b"$"), None);
        assert_eq!(find(b"abc", b""), Some(0));
    }

    #[tokio::test]
    async fn expect_records_text_before_match() {
        let mut s = sh();
        assert_eq!(s.state(), SessionState::Spawned);
        s.expect("$").await.unwrap();
        assert_eq!(s.state(), SessionState::Ready);

        s.send_line("echo hel''lo").await.unwrap();
        s.expect("hello").await.unwrap();
        s.expect("$").await.unwrap();
        s.close().await;
    }

    #[tokio::test]
    async fn exit_status_is_available_after_eof() {
        let mut s = sh();
        s.expect("$").await.unwrap();
        s.send_line("exit 42").await.unwrap();

        let e = s.expect("$").await.unwrap_err();
        assert!(e.is_eof(), "{:?}", e);
        assert_eq!(s.state(), SessionState::Terminated);
        assert_eq!(s.exit_code(), Some(42));
    }

    #[tokio::test]
    async fn expect_times_out() {
        let opts = SessionOptions::default().timeout(Duration::from_millis(200));
        let mut s = Session::spawn("/bin/cat", opts).unwrap();
        let e = s.expect("never printed").await.unwrap_err();
        assert!(matches!(e, SessionError::Timeout { .. }), "{:?}", e);
        assert!(matches!(CheckError::from(e), CheckError::Failed(_)));
        s.close().await;
    }

    #[tokio::test]
    async fn ctrl_c_interrupts_foreground_job() {
        let mut s = sh();
        s.expect("$").await.unwrap();
        s.send_line("sleep 5").await.unwrap();
        let start = Instant::now();
        s.send_raw(CTRL_C).await.unwrap();
        s.expect("$").await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(3));
        s.close().await;
    }

    #[tokio::test]
    async fn window_size_is_seen_by_the_shell() {
        let opts = SessionOptions::default()
            .env(vec![
                ("PS1".into(), "$ ".into()),
                ("PATH".into(), "/usr/bin:/bin".into()),
            ])
            .window_size(30, 100)
            .timeout(Duration::from_secs(5));
        let mut s = Session::spawn("/bin/sh", opts).unwrap();
        s.expect("$").await.unwrap();
        s.send_line("stty size").await.unwrap();
        s.expect("30 100").await.unwrap();
        s.expect("$").await.unwrap();

        s.set_window_size(10, 1024).unwrap();
        s.send_line("stty size").await.unwrap();
        s.expect("10 1024").await.unwrap();
        s.close().await;
    }
}
