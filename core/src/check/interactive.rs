//! Scenarios driven through a pty: exit status, prompt rendering and job control.
//!
//! Every scenario owns its session and closes it before returning, whatever the outcome.

use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::context::RunContext;
use crate::fail;
use crate::prompt::{self, PromptEnv};
use crate::testing::{
    ensure_same, jobs, returncode,
    session::{Session, SessionOptions, SessionState, CTRL_C, CTRL_Z},
    CheckError, CheckResult,
};

const PROMPT: &str = "$";

/// Rewrites a failure caused by the shell dying into the scenario's own explanation.
fn exited_due_to(session: &Session, cause: &str, res: CheckResult) -> CheckResult {
    match res {
        Err(CheckError::Failed(e)) if session.state() == SessionState::Terminated => {
            Err(e.within(format!("Shell exited due to {}", cause)).into())
        }
        other => other,
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

fn ensure_stopped_in_background(process: &str, status: &str) -> CheckResult {
    if status == "T+" {
        fail!(
            "`{}` correctly stopped in background, but still in foreground process group. \
             Are you using setpgid() correctly?",
            process
        );
    }
    if status != "T" {
        fail!(
            "`{}` found in background, but not stopped ('ps t' should show status 'T').",
            process
        );
    }
    Ok(())
}

async fn ensure_running_in_background(
    ctx: &RunContext,
    s: &mut Session,
    process: &str,
    after: &str,
) -> CheckResult {
    if jobs::query_job_status(s, &ctx.config().jobs, process).await? != "S" {
        fail!("`{}` not running in background{}.", process, after);
    }
    Ok(())
}

/// Presses `key` once the configured delay has passed and returns when it was pressed.
async fn press(ctx: &RunContext, s: &mut Session, key: u8) -> CheckResult<Instant> {
    let delay = ctx.config().control_key_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    s.send_raw(key).await?;
    Ok(Instant::now())
}

async fn ensure_waited_after_fg(
    s: &mut Session,
    process: &str,
    since: Instant,
    min_total_secs: f64,
) -> CheckResult {
    s.send_line("fg").await?;
    s.expect(PROMPT).await?;
    if since.elapsed() < secs(min_total_secs) {
        fail!("`{}` did not finish properly with a wait after fg.", process);
    }
    Ok(())
}

pub(super) async fn exit(ctx: &RunContext, code: i32) -> CheckResult {
    ctx.set_last_command(format!(
        "exit {} ... make sure your shell prompt contains a '{}'",
        code, PROMPT
    ));
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res = exit_scenario(&mut s, code).await;
    s.close().await;
    res
}

async fn exit_scenario(s: &mut Session, code: i32) -> CheckResult {
    s.expect(PROMPT).await?;
    s.send_line(&format!("exit {}", code)).await?;
    match s.expect(PROMPT).await {
        Ok(()) => fail!("Shell did not exit on 'exit' command."),
        Err(e) if e.is_eof() => {
            let status = s.exit_status().map(returncode).unwrap_or(-1);
            ensure_same("exit status", status, code)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn prompt(ctx: &RunContext, template: &str) -> CheckResult {
    ctx.set_last_command("<none>");
    let env = PromptEnv::current()?;
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;

    let opts = SessionOptions::default()
        .env(vec![("PS1".to_owned(), template.to_owned())])
        // Long prompts must not be wrapped.
        .window_size(10, 1024);
    let mut s = ctx.spawn_session(opts)?;
    let res = prompt_scenario(&mut s, template, &env, &cwd).await;
    s.close().await;
    res
}

async fn prompt_scenario(
    s: &mut Session,
    template: &str,
    env: &PromptEnv,
    cwd: &std::path::Path,
) -> CheckResult {
    s.expect(PROMPT).await?;
    let want = env.expand(template, cwd);
    let got = format!("{}{}", s.before(), PROMPT);
    if got != want {
        fail!(
            "Prompt incorrect for \"{}\", expected \"{}\", got \"{}\"",
            template,
            want,
            got
        );
    }

    if prompt::mentions_cwd(template) {
        s.send_line("cd /").await?;
        s.expect(PROMPT).await?;
        let mut lines = s.before().split("\r\n");
        let echoed = lines.next().unwrap_or_default();
        if echoed != "cd /" {
            fail!("Expected \"cd /\", got \"{}\"", echoed);
        }
        let want = env.expand(template, std::path::Path::new("/"));
        let got = format!("{}{}", lines.next().unwrap_or_default(), PROMPT);
        if got != want {
            fail!(
                "Prompt incorrect for \"{}\", expected \"{}\", got \"{}\"",
                template,
                want,
                got
            );
        }
    }
    Ok(())
}

pub(super) async fn detach(
    ctx: &RunContext,
    command: &str,
    process: &str,
    max_secs: f64,
) -> CheckResult {
    ctx.set_last_command(command);
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res = detach_scenario(ctx, &mut s, command, process, secs(max_secs)).await;
    s.close().await;
    res
}

async fn detach_scenario(
    ctx: &RunContext,
    s: &mut Session,
    command: &str,
    process: &str,
    max: Duration,
) -> CheckResult {
    let ps = &ctx.config().jobs.ps_command;
    s.expect(PROMPT).await?;

    s.send_line(command).await?;
    let start = Instant::now();
    s.expect(PROMPT).await?;
    if start.elapsed() > max {
        fail!("Detach did not return immediately.\nCommand: {}", command);
    }

    s.send_line(ps).await?;
    let start = Instant::now();
    s.expect(PROMPT).await?;
    if start.elapsed() > max {
        fail!(
            "Command after detach did not return immediately.\nCommand: {} \\n {}",
            command,
            ps
        );
    }
    if !s.before().contains(process) {
        fail!("Detached command not in {} output.\nCommand: {}", ps, command);
    }
    Ok(())
}

pub(super) async fn interrupt(
    ctx: &RunContext,
    command: &str,
    process: &str,
    max_secs: f64,
    settle_secs: f64,
) -> CheckResult {
    ctx.set_last_command(command);
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res = interrupt_scenario(ctx, &mut s, command, process, max_secs, settle_secs).await;
    let res = exited_due_to(&s, "SIGINT (ctrl-c)", res);
    s.close().await;
    res
}

async fn interrupt_scenario(
    ctx: &RunContext,
    s: &mut Session,
    command: &str,
    process: &str,
    max_secs: f64,
    settle_secs: f64,
) -> CheckResult {
    s.expect(PROMPT).await?;
    s.send_line(command).await?;
    let start = press(ctx, s, CTRL_C).await?;
    s.expect(PROMPT).await?;
    if start.elapsed() > secs(max_secs) {
        fail!("`{}` was not killed by SIGINT in time.", process);
    }

    tokio::time::sleep(secs(settle_secs)).await;
    s.send_line(&ctx.config().jobs.ps_command).await?;
    s.expect(PROMPT).await?;
    if s.before().contains(process) {
        fail!("`{}` still active in background.", process);
    }
    Ok(())
}

pub(super) async fn suspend(
    ctx: &RunContext,
    command: &str,
    process: &str,
    max_secs: f64,
) -> CheckResult {
    ctx.set_last_command(command);
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res = suspend_scenario(ctx, &mut s, command, process, max_secs).await;
    let res = exited_due_to(&s, "SIGTSTP (ctrl-z)", res);
    s.close().await;
    res
}

async fn suspend_scenario(
    ctx: &RunContext,
    s: &mut Session,
    command: &str,
    process: &str,
    max_secs: f64,
) -> CheckResult {
    s.expect(PROMPT).await?;
    s.send_line(command).await?;
    let start = press(ctx, s, CTRL_Z).await?;
    s.expect(PROMPT).await?;
    let elapsed = start.elapsed();
    if elapsed > secs(max_secs) {
        fail!(
            "`{}` was not stopped by SIGTSTP in time ({:.2} sec).",
            process,
            elapsed.as_secs_f64()
        );
    }

    if jobs::query_job_status(s, &ctx.config().jobs, process).await? != "T" {
        fail!("`{}` found in background, but not stopped.", process);
    }
    Ok(())
}

pub(super) async fn suspend_resume(
    ctx: &RunContext,
    command: &str,
    process: &str,
    max_secs: f64,
    min_total_secs: f64,
) -> CheckResult {
    ctx.set_last_command(command);
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res =
        suspend_resume_scenario(ctx, &mut s, command, process, max_secs, min_total_secs).await;
    let res = exited_due_to(&s, "SIGTSTP (ctrl-z) or bg/fg", res);
    s.close().await;
    res
}

async fn suspend_resume_scenario(
    ctx: &RunContext,
    s: &mut Session,
    command: &str,
    process: &str,
    max_secs: f64,
    min_total_secs: f64,
) -> CheckResult {
    s.expect(PROMPT).await?;
    s.send_line(command).await?;
    let start = Instant::now();
    let pressed = press(ctx, s, CTRL_Z).await?;
    s.expect(PROMPT).await?;
    if pressed.elapsed() > secs(max_secs) {
        fail!("`{}` was not stopped by SIGTSTP in time.", process);
    }
    let status = jobs::query_job_status(s, &ctx.config().jobs, process).await?;
    ensure_stopped_in_background(process, &status)?;

    s.send_line("bg").await?;
    s.expect(PROMPT).await?;
    ensure_running_in_background(ctx, s, process, " after bg command").await?;

    ensure_waited_after_fg(s, process, start, min_total_secs).await
}

pub(super) async fn detach_resume(
    ctx: &RunContext,
    command: &str,
    process: &str,
    min_total_secs: f64,
) -> CheckResult {
    ctx.set_last_command(command);
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res = detach_resume_scenario(ctx, &mut s, command, process, min_total_secs).await;
    s.close().await;
    res
}

async fn detach_resume_scenario(
    ctx: &RunContext,
    s: &mut Session,
    command: &str,
    process: &str,
    min_total_secs: f64,
) -> CheckResult {
    s.expect(PROMPT).await?;
    s.send_line(command).await?;
    let start = Instant::now();
    s.expect(PROMPT).await?;
    ensure_running_in_background(ctx, s, process, "").await?;

    ensure_waited_after_fg(s, process, start, min_total_secs).await
}

pub(super) async fn detach_suspend_resume(
    ctx: &RunContext,
    command: &str,
    process: &str,
    min_total_secs: f64,
) -> CheckResult {
    ctx.set_last_command(command);
    let mut s = ctx.spawn_session(SessionOptions::default())?;
    let res = detach_suspend_resume_scenario(ctx, &mut s, command, process, min_total_secs).await;
    s.close().await;
    res
}

async fn detach_suspend_resume_scenario(
    ctx: &RunContext,
    s: &mut Session,
    command: &str,
    process: &str,
    min_total_secs: f64,
) -> CheckResult {
    s.expect(PROMPT).await?;
    s.send_line(command).await?;
    let start = Instant::now();
    s.expect(PROMPT).await?;
    ensure_running_in_background(ctx, s, process, "").await?;

    s.send_line("fg").await?;
    press(ctx, s, CTRL_Z).await?;
    s.expect(PROMPT).await?;
    let status = jobs::query_job_status(s, &ctx.config().jobs, process).await?;
    ensure_stopped_in_background(process, &status)?;

    ensure_waited_after_fg(s, process, start, min_total_secs).await
}
