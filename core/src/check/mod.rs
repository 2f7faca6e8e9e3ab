//! Test behaviors as data.
//!
//! A catalog names each test's behavior with a [`Check`] variant; [`Evaluate`] turns it
//! into actual process or pty interaction against the candidate.

mod interactive;
mod penalty;
mod process;

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::RunContext;
use crate::testing::CheckResult;

#[async_trait]
pub trait Evaluate {
    async fn evaluate(&self, ctx: &RunContext) -> CheckResult;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    /// Same stdout and stderr as the reference shell, and the same return value unless
    /// `check_rv` is off.
    Compare {
        command: String,
        #[serde(default = "default_true")]
        check_rv: bool,
    },

    /// Literal expectations; unset fields are not checked.
    Expect {
        command: String,
        stdout: Option<String>,
        stderr: Option<String>,
        rv: Option<i32>,
    },

    /// Literal stdout and an error message that must appear somewhere in stderr.
    Diagnose {
        command: String,
        #[serde(default)]
        stdout: String,
        stderr_contains: String,
        #[serde(default)]
        hint: Option<String>,
    },

    /// Candidate without arguments reading a script from stdin.
    Stdin {
        input: String,
        stdout: String,
        #[serde(default)]
        stderr: String,
    },

    Wait {
        command: String,
        seconds: f64,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },

    /// `<candidate> <flag>` must exit with 0.
    Usage {
        #[serde(default = "default_usage_flag")]
        flag: String,
    },

    /// Fails with the memory checker's report if any checked run found errors.
    Memcheck { command: String },

    /// Fails if the build emitted compiler warnings.
    Warnings,

    Exit {
        code: i32,
    },

    /// Expands `template` the way the candidate should render `PS1`.
    Prompt {
        template: String,
    },

    Detach {
        command: String,
        process: String,
        #[serde(default = "default_detach_secs")]
        max_secs: f64,
    },

    Interrupt {
        command: String,
        process: String,
        #[serde(default = "default_interrupt_secs")]
        max_secs: f64,
        #[serde(default = "default_settle_secs")]
        settle_secs: f64,
    },

    Suspend {
        command: String,
        process: String,
        #[serde(default = "default_suspend_secs")]
        max_secs: f64,
    },

    SuspendResume {
        command: String,
        process: String,
        #[serde(default = "default_suspend_secs")]
        max_secs: f64,
        min_total_secs: f64,
    },

    DetachResume {
        command: String,
        process: String,
        min_total_secs: f64,
    },

    DetachSuspendResume {
        command: String,
        process: String,
        min_total_secs: f64,
    },
}

fn default_true() -> bool {
    true
}

fn default_tolerance() -> f64 {
    0.3
}

fn default_usage_flag() -> String {
    "-h".to_owned()
}

fn default_detach_secs() -> f64 {
    0.1
}

fn default_interrupt_secs() -> f64 {
    0.3
}

fn default_settle_secs() -> f64 {
    0.2
}

fn default_suspend_secs() -> f64 {
    0.5
}

impl Check {
    pub fn kind(&self) -> &'static str {
        use Check::*;
        match self {
            Compare { .. } => "compare",
            Expect { .. } => "expect",
            Diagnose { .. } => "diagnose",
            Stdin { .. } => "stdin",
            Wait { .. } => "wait",
            Usage { .. } => "usage",
            Memcheck { .. } => "memcheck",
            Warnings => "warnings",
            Exit { .. } => "exit",
            Prompt { .. } => "prompt",
            Detach { .. } => "detach",
            Interrupt { .. } => "interrupt",
            Suspend { .. } => "suspend",
            SuspendResume { .. } => "suspend_resume",
            DetachResume { .. } => "detach_resume",
            DetachSuspendResume { .. } => "detach_suspend_resume",
        }
    }

    /// Whether the check drives the candidate through a pty.
    pub fn is_interactive(&self) -> bool {
        use Check::*;
        matches!(
            self,
            Exit { .. }
                | Prompt { .. }
                | Detach { .. }
                | Interrupt { .. }
                | Suspend { .. }
                | SuspendResume { .. }
                | DetachResume { .. }
                | DetachSuspendResume { .. }
        )
    }
}

#[async_trait]
impl Evaluate for Check {
    async fn evaluate(&self, ctx: &RunContext) -> CheckResult {
        use Check::*;
        match self {
            Compare { command, check_rv } => process::compare(ctx, command, *check_rv).await,
            Expect {
                command,
                stdout,
                stderr,
                rv,
            } => process::expect(ctx, command, stdout.as_deref(), stderr.as_deref(), *rv).await,
            Diagnose {
                command,
                stdout,
                stderr_contains,
                hint,
            } => process::diagnose(ctx, command, stdout, stderr_contains, hint.as_deref()).await,
            Stdin {
                input,
                stdout,
                stderr,
            } => process::stdin(ctx, input, stdout, stderr).await,
            Wait {
                command,
                seconds,
                stdout,
                stderr,
                tolerance,
            } => process::wait(ctx, command, *seconds, *tolerance, stdout, stderr).await,
            Usage { flag } => process::usage(ctx, flag).await,
            Memcheck { command } => penalty::memcheck(ctx, command).await,
            Warnings => penalty::warnings(ctx),
            Exit { code } => interactive::exit(ctx, *code).await,
            Prompt { template } => interactive::prompt(ctx, template).await,
            Detach {
                command,
                process,
                max_secs,
            } => interactive::detach(ctx, command, process, *max_secs).await,
            Interrupt {
                command,
                process,
                max_secs,
                settle_secs,
            } => interactive::interrupt(ctx, command, process, *max_secs, *settle_secs).await,
            Suspend {
                command,
                process,
                max_secs,
            } => interactive::suspend(ctx, command, process, *max_secs).await,
            SuspendResume {
                command,
                process,
                max_secs,
                min_total_secs,
            } => {
                interactive::suspend_resume(ctx, command, process, *max_secs, *min_total_secs)
                    .await
            }
            DetachResume {
                command,
                process,
                min_total_secs,
            } => interactive::detach_resume(ctx, command, process, *min_total_secs).await,
            DetachSuspendResume {
                command,
                process,
                min_total_secs,
            } => {
                interactive::detach_suspend_resume(ctx, command, process, *min_total_secs).await
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        check: Check,
    }

    fn parse(toml: &str) -> Check {
        toml::from_str::<Wrapper>(toml).unwrap().check
    }

    #[test]
    fn defaults_are_filled_in() {
        assert_eq!(
            parse(r#"check = { kind = "compare", command = "pwd" }"#),
            Check::Compare {
                command: "pwd".into(),
                check_rv: true
            }
        );
        assert_eq!(
            parse(r#"check = { kind = "wait", command = "sleep 2", seconds = 2 }"#),
            Check::Wait {
                command: "sleep 2".into(),
                seconds: 2.0,
                stdout: "".into(),
                stderr: "".into(),
                tolerance: 0.3,
            }
        );
        assert_eq!(
            parse(r#"check = { kind = "usage" }"#),
            Check::Usage { flag: "-h".into() }
        );
    }

    #[test]
    fn unit_and_multiword_kinds() {
        let c = parse(r#"check = { kind = "warnings" }"#);
        assert_eq!(c, Check::Warnings);
        assert!(!c.is_interactive());

        let c = parse(
            r#"check = { kind = "detach_suspend_resume", command = "sleep 1 &", process = "sleep", min_total_secs = 0.95 }"#,
        );
        assert_eq!(c.kind(), "detach_suspend_resume");
        assert!(c.is_interactive());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(toml::from_str::<Wrapper>(r#"check = { kind = "teleport" }"#).is_err());
        assert!(toml::from_str::<Wrapper>(r#"check = { kind = "exit" }"#).is_err());
    }
}
