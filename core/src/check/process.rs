use crate::context::RunContext;
use crate::fail;
use crate::testing::{
    compare::{self, ExpectedOutput},
    ensure_same_text,
    timing::{self, TimingWindow},
    CheckResult,
};

pub(super) async fn compare(ctx: &RunContext, command: &str, check_rv: bool) -> CheckResult {
    compare::differential(ctx, command, check_rv).await
}

pub(super) async fn expect(
    ctx: &RunContext,
    command: &str,
    stdout: Option<&str>,
    stderr: Option<&str>,
    rv: Option<i32>,
) -> CheckResult {
    let want = ExpectedOutput {
        stdout,
        stderr,
        returncode: rv,
    };
    compare::literal(ctx, command, &want).await
}

pub(super) async fn diagnose(
    ctx: &RunContext,
    command: &str,
    stdout: &str,
    stderr_contains: &str,
    hint: Option<&str>,
) -> CheckResult {
    let out = ctx.run_candidate(command).await?;
    ensure_same_text("stdout", &out.stdout, stdout.as_bytes())?;
    if !out.stderr_lossy().contains(stderr_contains) {
        match hint {
            Some(hint) => fail!("String {:?} not found in stderr: {}", stderr_contains, hint),
            None => fail!("String {:?} not found in stderr.", stderr_contains),
        }
    }
    Ok(())
}

pub(super) async fn stdin(ctx: &RunContext, input: &str, stdout: &str, stderr: &str) -> CheckResult {
    ctx.set_last_command(input.trim_end().replace('\n', "; "));
    let out = ctx
        .candidate()
        .run::<&str>(&[], Some(input.as_bytes()))
        .await?;
    ensure_same_text("stdout", &out.stdout, stdout.as_bytes())?;
    ensure_same_text("stderr", &out.stderr, stderr.as_bytes())?;
    Ok(())
}

pub(super) async fn wait(
    ctx: &RunContext,
    command: &str,
    seconds: f64,
    tolerance: f64,
    stdout: &str,
    stderr: &str,
) -> CheckResult {
    let window = TimingWindow::new(seconds, tolerance);
    timing::ensure_finishes_within(ctx, command, window, stdout, stderr).await
}

pub(super) async fn usage(ctx: &RunContext, flag: &str) -> CheckResult {
    let candidate = ctx.candidate();
    let cmdline = format!("{} {}", candidate.get_program().to_string_lossy(), flag);
    ctx.set_last_command(&cmdline);

    let out = candidate.run(&[flag], None).await?;
    if out.returncode != 0 {
        fail!(
            "Command returned non-zero value.\nCommand: {}\nReturn code: {}\nstdout: {}\nstderr: {}",
            cmdline,
            out.returncode,
            out.stdout_lossy(),
            out.stderr_lossy()
        );
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::check::{Check, Evaluate as _};
    use crate::context::test_support::sh_context;
    use crate::testing::CheckError;

    fn failure(res: crate::testing::CheckResult) -> String {
        match res {
            Err(CheckError::Failed(e)) => e.message,
            other => panic!("expected an assertion failure: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_diagnosed() {
        let ctx = sh_context();
        let check = Check::Diagnose {
            command: "blablabla".into(),
            stdout: "".into(),
            stderr_contains: "not found".into(),
            hint: None,
        };
        check.evaluate(&ctx).await.unwrap();

        let check = Check::Diagnose {
            command: "blablabla".into(),
            stdout: "".into(),
            stderr_contains: "No such file or directory".into(),
            hint: Some("use perror if execvp fails.".into()),
        };
        let msg = failure(check.evaluate(&ctx).await);
        assert_eq!(
            msg,
            "String \"No such file or directory\" not found in stderr: use perror if execvp fails."
        );
    }

    #[tokio::test]
    async fn script_on_stdin() {
        let ctx = sh_context();
        let check = Check::Stdin {
            input: "cd /tmp\npwd\n".into(),
            stdout: "/tmp\n".into(),
            stderr: "".into(),
        };
        check.evaluate(&ctx).await.unwrap();
        assert_eq!(ctx.last_command(), "cd /tmp; pwd");
    }

    #[tokio::test]
    async fn usage_requires_zero_exit() {
        let ctx = sh_context();
        // `sh -h` is not a valid invocation of dash or bash.
        let check = Check::Usage {
            flag: "-h".into(),
        };
        let msg = failure(check.evaluate(&ctx).await);
        assert!(msg.starts_with("Command returned non-zero value.\nCommand: /bin/sh -h\n"), "{}", msg);

        let check = Check::Usage { flag: "-".into() };
        check.evaluate(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn wait_with_expected_output() {
        let ctx = sh_context();
        let check = Check::Wait {
            command: "sleep 0.5; echo done".into(),
            seconds: 0.5,
            stdout: "done\n".into(),
            stderr: "".into(),
            tolerance: 0.3,
        };
        check.evaluate(&ctx).await.unwrap();
    }
}
