use std::path::Path;

use super::{
    failure::{ensure_same, ensure_same_text, AssertionFailure, CheckResult},
    result::ProcessOutput,
};
use crate::context::RunContext;

/// Literal expectations for a candidate run; `None` fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedOutput<'a> {
    pub stdout: Option<&'a str>,
    pub stderr: Option<&'a str>,
    pub returncode: Option<i32>,
}

/// Runs `cmd` through the candidate (memcheck-gated) and the reference shell and
/// requires byte-identical streams.
pub async fn differential(ctx: &RunContext, cmd: &str, check_returncode: bool) -> CheckResult {
    let got = ctx.run_candidate(cmd).await?;
    let want = ctx.run_reference(cmd).await?;
    compare_outputs(&got, &want, check_returncode).map_err(|e| {
        e.within(format!(
            "Error while comparing your shell output to {}.\nCommand: {}",
            reference_name(&ctx.config().engine.reference_shell),
            cmd
        ))
    })?;
    Ok(())
}

/// Runs `cmd` through the candidate (memcheck-gated) and checks it against literals.
pub async fn literal(ctx: &RunContext, cmd: &str, want: &ExpectedOutput<'_>) -> CheckResult {
    let got = ctx.run_candidate(cmd).await?;
    expect_output(&got, want).map_err(|e| {
        e.within(format!(
            "Error while comparing your shell output to expected output.\nCommand: {}",
            cmd
        ))
    })?;
    Ok(())
}

pub fn compare_outputs(
    got: &ProcessOutput,
    want: &ProcessOutput,
    check_returncode: bool,
) -> Result<(), AssertionFailure> {
    ensure_same_text("stdout", &got.stdout, &want.stdout)?;
    ensure_same_text("stderr", &got.stderr, &want.stderr)?;
    if check_returncode {
        ensure_same("return value", got.returncode, want.returncode)?;
    }
    Ok(())
}

pub fn expect_output(got: &ProcessOutput, want: &ExpectedOutput<'_>) -> Result<(), AssertionFailure> {
    if let Some(stdout) = want.stdout {
        ensure_same_text("stdout", &got.stdout, stdout.as_bytes())?;
    }
    if let Some(stderr) = want.stderr {
        ensure_same_text("stderr", &got.stderr, stderr.as_bytes())?;
    }
    if let Some(rv) = want.returncode {
        ensure_same("return value", got.returncode, rv)?;
    }
    Ok(())
}

fn reference_name(shell: &Path) -> String {
    shell
        .file_name()
        .unwrap_or(shell.as_os_str())
        .to_string_lossy()
        .into_owned()
}
