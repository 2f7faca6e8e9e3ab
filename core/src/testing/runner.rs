use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Context as _;
use tokio::{io::AsyncWriteExt as _, process::Command};

use super::result::ProcessOutput;

/// Runs a program to completion with all three standard streams piped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRunner {
    program: PathBuf,
    prefix: Vec<OsString>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    /// Wraps every invocation, e.g. `valgrind --log-file=x <program> ...`.
    pub fn prefix<I, S>(mut self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix = prefix.into_iter().map(Into::into).collect();
        self
    }

    pub fn get_program(&self) -> &Path {
        &self.program
    }

    pub fn is_wrapped(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// `<program> -c <cmd>`
    pub async fn run_command(&self, cmd: &str) -> anyhow::Result<ProcessOutput> {
        self.run(&["-c", cmd], None).await
    }

    pub async fn run<S>(&self, args: &[S], stdin: Option<&[u8]>) -> anyhow::Result<ProcessOutput>
    where
        S: AsRef<OsStr>,
    {
        let mut argv = self.prefix.clone();
        argv.push(self.program.clone().into_os_string());
        argv.extend(args.iter().map(|a| a.as_ref().to_owned()));
        let cmdline = display_argv(&argv);

        log::debug!("Spawning {}", cmdline);
        let mut proc = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", cmdline))?;

        let mut stdin_pipe = proc.stdin.take().context("Failed to open stdin")?;
        if let Some(input) = stdin {
            stdin_pipe
                .write_all(input)
                .await
                .context("Failed to pass input-data to stdin")?;
        }
        drop(stdin_pipe); // NOTE: the child only sees EOF once this is closed

        let output = proc
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to communicate with '{}'", cmdline))?;
        Ok(output.into())
    }
}

fn display_argv(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
