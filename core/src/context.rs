use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::config::Config;
use crate::testing::{
    memcheck::MemcheckGate,
    session::{Session, SessionOptions},
    ProcessOutput, ProcessRunner,
};

/// State shared by every check of one grading run.
///
/// Everything that outlives a single test lives here and is write-once: the memcheck
/// failure, the compiler warnings, and (for diagnostics only) the command in flight.
#[derive(Debug)]
pub struct RunContext {
    config: Config,
    memcheck: MemcheckGate,
    compiler_warnings: OnceCell<String>,
    last_command: Mutex<String>,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        let memcheck = MemcheckGate::new(Some(config.memcheck.clone()));
        Self {
            config,
            memcheck,
            compiler_warnings: OnceCell::new(),
            last_command: Mutex::new(String::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memcheck(&self) -> &MemcheckGate {
        &self.memcheck
    }

    pub fn candidate(&self) -> ProcessRunner {
        ProcessRunner::new(&self.config.engine.candidate)
    }

    pub fn reference(&self) -> ProcessRunner {
        ProcessRunner::new(&self.config.engine.reference_shell)
    }

    /// First write wins; returns whether this call recorded the text.
    pub fn record_compiler_warnings(&self, text: impl Into<String>) -> bool {
        self.compiler_warnings.set(text.into()).is_ok()
    }

    pub fn compiler_warnings(&self) -> Option<&str> {
        self.compiler_warnings.get().map(String::as_str)
    }

    pub fn set_last_command(&self, cmd: impl Into<String>) {
        let mut last = self
            .last_command
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = cmd.into();
    }

    pub fn last_command(&self) -> String {
        self.last_command
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Candidate `-c cmd`, through the memcheck gate.
    pub async fn run_candidate(&self, cmd: &str) -> anyhow::Result<ProcessOutput> {
        self.set_last_command(cmd);
        self.memcheck.run_guarded(&self.candidate(), cmd).await
    }

    /// Candidate `-c cmd`, never wrapped.
    pub async fn run_candidate_plain(&self, cmd: &str) -> anyhow::Result<ProcessOutput> {
        self.set_last_command(cmd);
        self.candidate().run_command(cmd).await
    }

    pub async fn run_reference(&self, cmd: &str) -> anyhow::Result<ProcessOutput> {
        self.set_last_command(cmd);
        self.reference().run_command(cmd).await
    }

    pub fn spawn_session(&self, opts: SessionOptions) -> anyhow::Result<Session> {
        Session::spawn(
            &self.config.engine.candidate,
            opts.timeout(self.config.expect_timeout()),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// `/bin/sh` as both candidate and reference, no checker, no build.
    ///
    /// Interactive sessions inherit `PS1='$ '` so that root gets a `$` prompt too.
    pub(crate) fn sh_context() -> RunContext {
        static PS1: std::sync::Once = std::sync::Once::new();
        PS1.call_once(|| std::env::set_var("PS1", "$ "));

        let mut cfg = Config::from_toml(&Config::example_toml()).unwrap();
        cfg.engine.candidate = "/bin/sh".into();
        cfg.engine.reference_shell = "/bin/sh".into();
        cfg.engine.expect_timeout_secs = 5.0;
        cfg.memcheck.enabled = false;
        cfg.build.enabled = false;
        RunContext::new(cfg)
    }

    /// Like [`sh_context`], with a job-control shell (`bash --norc`) as the candidate.
    ///
    /// Readline's terminal escapes are turned off, and `HOME` points nowhere so that `\w`
    /// renders the full path. Ctrl-C and Ctrl-Z wait until the job has started.
    pub(crate) fn job_control_context() -> RunContext {
        static WRAPPER: once_cell::sync::Lazy<std::path::PathBuf> =
            once_cell::sync::Lazy::new(|| {
                let bash = ["/bin/bash", "/usr/bin/bash"]
                    .into_iter()
                    .find(|p| std::path::Path::new(p).is_file())
                    .expect("bash is required for job-control tests");
                let dir = std::env::temp_dir().join(format!("shgrade-bash-{}", std::process::id()));
                std::fs::create_dir_all(&dir).unwrap();

                let inputrc = dir.join("inputrc");
                std::fs::write(&inputrc, "set enable-bracketed-paste off\n").unwrap();

                let wrapper = dir.join("candidate");
                let script = format!(
                    "#!/bin/sh\n\
                     HOME=/nonexistent TERM=dumb INPUTRC='{}'\n\
                     export HOME TERM INPUTRC\n\
                     exec {} --norc --noprofile \"$@\"\n",
                    inputrc.to_string_lossy(),
                    bash,
                );
                std::fs::write(&wrapper, script).unwrap();
                use std::os::unix::fs::PermissionsExt as _;
                std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755))
                    .unwrap();
                wrapper
            });

        let mut cfg = sh_context().config().clone();
        cfg.engine.candidate = WRAPPER.clone();
        cfg.engine.control_key_delay_secs = 0.2;
        RunContext::new(cfg)
    }
}

#[cfg(test)]
mod test {
    use super::test_support::sh_context;

    #[test]
    fn compiler_warnings_are_write_once() {
        let ctx = sh_context();
        assert_eq!(ctx.compiler_warnings(), None);
        assert!(ctx.record_compiler_warnings("shell.c:3: warning: unused variable"));
        assert!(!ctx.record_compiler_warnings("other"));
        assert_eq!(
            ctx.compiler_warnings(),
            Some("shell.c:3: warning: unused variable")
        );
    }

    #[tokio::test]
    async fn last_command_tracks_runs() {
        let ctx = sh_context();
        ctx.run_reference("true").await.unwrap();
        assert_eq!(ctx.last_command(), "true");
        ctx.run_candidate("echo x").await.unwrap();
        assert_eq!(ctx.last_command(), "echo x");
    }
}
