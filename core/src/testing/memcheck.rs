//! Gate around the (slow) external memory checker.
//!
//! The checker wraps the candidate only for tests that ask for it, and only until it has
//! found errors once. The first failure is frozen: later invocations run the candidate
//! unwrapped, and the dedicated penalty check reports the stored failure.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;
use lazy_regex::regex_captures;
use once_cell::sync::OnceCell;

use super::{failure::CheckResult, result::ProcessOutput, runner::ProcessRunner};
use crate::{config::MemcheckConfig, fail, fsutil};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcheckFailure {
    pub command: String,
    pub report: String,
}

#[derive(Debug)]
pub struct MemcheckGate {
    tool: Option<MemcheckConfig>,
    failure: OnceCell<MemcheckFailure>,
    enabled_for_current_test: AtomicBool,
}

impl MemcheckGate {
    /// `None` (or a disabled config) turns every guarded run into a plain run.
    pub fn new(tool: Option<MemcheckConfig>) -> Self {
        Self {
            tool: tool.filter(|t| t.enabled),
            failure: OnceCell::new(),
            enabled_for_current_test: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.tool.is_some()
    }

    pub fn enable_for_current_test(&self, enabled: bool) {
        self.enabled_for_current_test
            .store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled_for_current_test(&self) -> bool {
        self.enabled_for_current_test.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> Option<&MemcheckFailure> {
        self.failure.get()
    }

    /// Runs `<candidate> -c <cmd>`, wrapped by the checker if the current test asked for
    /// it and no failure has been recorded yet.
    pub async fn run_guarded(
        &self,
        candidate: &ProcessRunner,
        cmd: &str,
    ) -> anyhow::Result<ProcessOutput> {
        let tool = match &self.tool {
            Some(tool) if self.is_enabled_for_current_test() && self.failure.get().is_none() => {
                tool
            }
            _ => return candidate.run_command(cmd).await,
        };

        fsutil::remove_file_if_exists(&tool.log_file)?;
        let output = candidate
            .clone()
            .prefix(tool.prefix())
            .run_command(cmd)
            .await?;
        let report = fsutil::read_to_string(&tool.log_file)
            .with_context(|| format!("{} did not write a report", tool.program))?;

        match parse_error_count(&report) {
            Some(0) => {}
            Some(n) => {
                log::info!("{} reported {} errors for '{}'", tool.program, n, cmd);
                let failure = MemcheckFailure {
                    command: cmd.to_owned(),
                    report,
                };
                if self.failure.set(failure).is_err() {
                    log::debug!("Memcheck failure was already recorded");
                }
            }
            None => log::warn!(
                "No error summary in {}, assuming no errors",
                tool.log_file.to_string_lossy()
            ),
        }
        Ok(output)
    }

    /// Runs `stress_cmd` under the checker unless a failure is already known, then fails
    /// with the stored report if there is one.
    pub async fn ensure_clean(&self, candidate: &ProcessRunner, stress_cmd: &str) -> CheckResult {
        let Some(tool) = &self.tool else {
            log::warn!("Memory checker disabled, skipping memcheck");
            return Ok(());
        };
        if self.failure.get().is_none() {
            self.enable_for_current_test(true);
            self.run_guarded(candidate, stress_cmd).await?;
        }
        if let Some(MemcheckFailure { command, report }) = self.failure() {
            fail!("{} failed for command {}:\n{}", tool.program, command, report);
        }
        Ok(())
    }
}

/// Error count from the first `ERROR SUMMARY` line of a valgrind-style report.
pub fn parse_error_count(report: &str) -> Option<u64> {
    let line = report.lines().find(|l| l.contains("ERROR SUMMARY"))?;
    let (_, count) = regex_captures!(r"ERROR SUMMARY:\s*([0-9,]+)", line)?;
    count.replace(',', "").parse().ok()
}
