use std::{borrow::Cow, os::unix::process::ExitStatusExt, process, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or the negated signal number when the process was killed by a signal.
    pub returncode: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

impl From<process::Output> for ProcessOutput {
    fn from(out: process::Output) -> Self {
        Self {
            returncode: returncode(out.status),
            stdout: out.stdout,
            stderr: out.stderr,
        }
    }
}

pub fn returncode(status: process::ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutput {
    pub output: ProcessOutput,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Verdict {
    #[strum(serialize = "OK")]
    Ok,
    #[strum(serialize = "FAIL")]
    Fail,
    /// Not executed because an earlier test of an abort-on-failure group failed.
    #[strum(serialize = "SKIP")]
    Skipped,
}

impl serde::Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
