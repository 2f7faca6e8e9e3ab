use std::time::{Duration, Instant};

use super::{
    failure::{ensure_same_text, AssertionFailure, CheckResult},
    result::TimedOutput,
};
use crate::context::RunContext;

/// Expected wall time of a command, accepted within the open interval
/// `(expected - tolerance, expected + tolerance)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingWindow {
    pub expected: Duration,
    pub tolerance: Duration,
}

impl TimingWindow {
    pub const DEFAULT_TOLERANCE: Duration = Duration::from_millis(300);

    pub fn new(expected_secs: f64, tolerance_secs: f64) -> Self {
        Self {
            expected: Duration::from_secs_f64(expected_secs.max(0.0)),
            tolerance: Duration::from_secs_f64(tolerance_secs.max(0.0)),
        }
    }

    pub fn contains(&self, elapsed: Duration) -> bool {
        let lower = self.expected.saturating_sub(self.tolerance);
        let upper = self.expected + self.tolerance;
        // Open below even when the lower bound saturates to zero.
        elapsed > lower && elapsed < upper
    }

    pub fn ensure(&self, cmd: &str, elapsed: Duration) -> Result<(), AssertionFailure> {
        if self.contains(elapsed) {
            return Ok(());
        }
        Err(AssertionFailure::new(format!(
            "Command did not finish in expected time.\nCommand: {}\nExpected time: {:.6}\nTime taken: {:.6}",
            cmd,
            self.expected.as_secs_f64(),
            elapsed.as_secs_f64()
        )))
    }
}

/// Runs the candidate unwrapped and measures the whole process lifetime.
pub async fn timed_run(ctx: &RunContext, cmd: &str) -> anyhow::Result<TimedOutput> {
    let start = Instant::now();
    let output = ctx.run_candidate_plain(cmd).await?;
    let elapsed = start.elapsed();
    log::debug!("'{}' took {:.3}s", cmd, elapsed.as_secs_f64());
    Ok(TimedOutput { output, elapsed })
}

pub async fn ensure_finishes_within(
    ctx: &RunContext,
    cmd: &str,
    window: TimingWindow,
    stdout: &str,
    stderr: &str,
) -> CheckResult {
    let TimedOutput { output, elapsed } = timed_run(ctx, cmd).await?;
    ensure_same_text("stdout", &output.stdout, stdout.as_bytes())?;
    ensure_same_text("stderr", &output.stderr, stderr.as_bytes())?;
    window.ensure(cmd, elapsed)?;
    Ok(())
}
