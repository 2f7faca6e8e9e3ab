//! Builds the submission before anything is graded.
//!
//! The submitted Makefile may list extra files in `ADDITIONAL_SOURCES` and
//! `ADDITIONAL_HEADERS`. They are validated, the Makefile itself is replaced by the clean
//! copy when one is installed, and the candidate is rebuilt from scratch so compiler
//! warnings show up.

use std::path::Path;

use anyhow::Context as _;

use crate::config::BuildConfig;
use crate::context::RunContext;
use crate::fsutil;
use crate::testing::{ProcessOutput, ProcessRunner};

pub const SOURCES_VAR: &str = "ADDITIONAL_SOURCES";
pub const HEADERS_VAR: &str = "ADDITIONAL_HEADERS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("File does not end with {suffix} in {var}: '{file}'")]
    WrongSuffix {
        suffix: &'static str,
        var: &'static str,
        file: String,
    },

    #[error("No quotes allowed in {var}: '{file}'")]
    Quote { var: &'static str, file: String },

    #[error("No slashes allowed in {var}: '{file}'")]
    Slash { var: &'static str, file: String },

    #[error("No $ allowed in {var}: '{file}'")]
    Dollar { var: &'static str, file: String },

    #[error("No flags allowed in {var}: '{file}'")]
    Flag { var: &'static str, file: String },

    #[error("Command returned non-zero value.\nCommand: {command}\nReturn code: {returncode}\nstdout: {stdout}\nstderr: {stderr}")]
    CommandFailed {
        command: String,
        returncode: i32,
        stdout: String,
        stderr: String,
    },
}

/// Extra files the submission asks to compile with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalFiles {
    pub sources: Vec<String>,
    pub headers: Vec<String>,
}

impl AdditionalFiles {
    /// Scans Makefile text for `NAME = a b c` lines; the last occurrence of each wins.
    pub fn parse(makefile: &str) -> Self {
        let mut files = Self::default();
        for line in makefile.lines().map(str::trim) {
            if let Some(list) = assignment(line, SOURCES_VAR) {
                files.sources = list;
            }
            if let Some(list) = assignment(line, HEADERS_VAR) {
                files.headers = list;
            }
        }
        files
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        validate_entries(&self.sources, SOURCES_VAR, ".c")?;
        validate_entries(&self.headers, HEADERS_VAR, ".h")?;
        Ok(())
    }

    /// `make` variable assignments, e.g. `ADDITIONAL_SOURCES=util.c list.c`.
    pub fn make_vars(&self) -> Vec<String> {
        vec![
            format!("{}={}", SOURCES_VAR, self.sources.join(" ")),
            format!("{}={}", HEADERS_VAR, self.headers.join(" ")),
        ]
    }
}

fn assignment(line: &str, var: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix(var)?.strip_prefix(" = ")?;
    Some(
        rest.split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

pub fn validate_entries(
    files: &[String],
    var: &'static str,
    suffix: &'static str,
) -> Result<(), BuildError> {
    for f in files {
        let file = f.clone();
        if !f.ends_with(suffix) {
            return Err(BuildError::WrongSuffix { suffix, var, file });
        }
        if f.contains('"') {
            return Err(BuildError::Quote { var, file });
        }
        if f.contains('/') {
            return Err(BuildError::Slash { var, file });
        }
        if f.contains('$') {
            return Err(BuildError::Dollar { var, file });
        }
        if f.starts_with('-') {
            return Err(BuildError::Flag { var, file });
        }
    }
    Ok(())
}

/// Reads and validates the submitted Makefile, then swaps in the clean copy.
pub fn prepare(cfg: &BuildConfig) -> anyhow::Result<AdditionalFiles> {
    let text = fsutil::read_to_string(&cfg.makefile).context("Cannot read the submitted Makefile")?;
    let files = AdditionalFiles::parse(&text);
    files.validate()?;
    log::debug!("Additional files: {:?}", files);

    // Only installed on the grading server; elsewhere the submitted Makefile stays.
    match fsutil::copy_file(&cfg.clean_makefile, &cfg.makefile) {
        Ok(_) => log::info!(
            "Replaced {} with {}",
            cfg.makefile.to_string_lossy(),
            cfg.clean_makefile.to_string_lossy()
        ),
        Err(e) => log::debug!("Keeping submitted Makefile: {}", e),
    }
    Ok(files)
}

/// `make <clean_target>` then `make`, recording compiler warnings in the run context.
pub async fn compile(ctx: &RunContext, files: &AdditionalFiles) -> anyhow::Result<()> {
    let cfg = &ctx.config().build;
    let make = ProcessRunner::new(&cfg.program);
    let vars = files.make_vars();

    let mut clean_args = vec![cfg.clean_target.clone()];
    clean_args.extend(vars.iter().cloned());
    check_cmd(ctx, &make, &clean_args).await?;

    let out = check_cmd(ctx, &make, &vars).await?;
    if let Some(warnings) = compiler_warnings(&out.stderr_lossy()) {
        log::info!("Build emitted compiler warnings");
        ctx.record_compiler_warnings(warnings);
    }
    Ok(())
}

/// Runs the whole build phase if enabled.
pub async fn run(ctx: &RunContext) -> anyhow::Result<()> {
    let cfg = &ctx.config().build;
    if !cfg.enabled {
        log::info!("Build disabled, grading {} as is", ctx.candidate().get_program().to_string_lossy());
        return Ok(());
    }
    log::info!("Building the submission");
    let files = prepare(cfg)?;
    compile(ctx, &files).await
}

async fn check_cmd(
    ctx: &RunContext,
    runner: &ProcessRunner,
    args: &[String],
) -> anyhow::Result<ProcessOutput> {
    let command = display_command(runner.get_program(), args);
    ctx.set_last_command(&command);
    let out = runner.run(args, None).await?;
    if out.returncode != 0 {
        return Err(BuildError::CommandFailed {
            command,
            returncode: out.returncode,
            stdout: out.stdout_lossy().into_owned(),
            stderr: out.stderr_lossy().into_owned(),
        }
        .into());
    }
    Ok(out)
}

fn display_command(program: &Path, args: &[String]) -> String {
    std::iter::once(program.to_string_lossy().into_owned())
        .chain(args.iter().map(|a| {
            if a.contains(' ') {
                match a.split_once('=') {
                    Some((k, v)) => format!("{}=\"{}\"", k, v),
                    None => format!("\"{}\"", a),
                }
            } else {
                a.clone()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build stderr without make's own `make:` lines, if anything in it is a warning.
pub fn compiler_warnings(stderr: &str) -> Option<String> {
    let filtered = stderr
        .split('\n')
        .filter(|l| !l.starts_with("make:"))
        .collect::<Vec<_>>()
        .join("\n");
    filtered.contains("warning").then_some(filtered)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test_support::sh_context;

    const MAKEFILE: &str = "\
CC = gcc
ADDITIONAL_SOURCES = parser.c  jobs.c
ADDITIONAL_HEADERS = parser.h
ADDITIONAL_HEADERS = parser.h jobs.h

all: mysh
";

    #[test]
    fn additional_files_are_parsed() {
        let files = AdditionalFiles::parse(MAKEFILE);
        assert_eq!(files.sources, ["parser.c", "jobs.c"]);
        assert_eq!(files.headers, ["parser.h", "jobs.h"]);
        assert_eq!(
            files.make_vars(),
            [
                "ADDITIONAL_SOURCES=parser.c jobs.c",
                "ADDITIONAL_HEADERS=parser.h jobs.h"
            ]
        );
    }

    #[test]
    fn missing_or_empty_assignments() {
        assert_eq!(AdditionalFiles::parse("all: mysh\n"), AdditionalFiles::default());
        // Needs the exact ` = ` spelling.
        assert!(AdditionalFiles::parse("ADDITIONAL_SOURCES=a.c\n").sources.is_empty());
        assert!(AdditionalFiles::parse("ADDITIONAL_SOURCES = \n").sources.is_empty());
    }

    #[test]
    fn entries_are_validated_in_order() {
        struct X {
            file: &'static str,
            want: &'static str,
        }
        let cases = [
            X {
                file: "main.cpp",
                want: "File does not end with .c in ADDITIONAL_SOURCES: 'main.cpp'",
            },
            X {
                file: "a\".c",
                want: "No quotes allowed in ADDITIONAL_SOURCES: 'a\".c'",
            },
            X {
                file: "../x.c",
                want: "No slashes allowed in ADDITIONAL_SOURCES: '../x.c'",
            },
            X {
                file: "$(EVIL).c",
                want: "No $ allowed in ADDITIONAL_SOURCES: '$(EVIL).c'",
            },
            X {
                file: "-Dx.c",
                want: "No flags allowed in ADDITIONAL_SOURCES: '-Dx.c'",
            },
        ];
        for x in cases {
            let e = validate_entries(&[x.file.to_owned()], SOURCES_VAR, ".c").unwrap_err();
            assert_eq!(e.to_string(), x.want);
        }
        assert!(validate_entries(&["ok.h".into()], HEADERS_VAR, ".h").is_ok());
    }

    #[test]
    fn make_lines_do_not_count_as_warnings() {
        assert_eq!(
            compiler_warnings("make: warning: Clock skew detected\n"),
            None
        );
        assert_eq!(
            compiler_warnings("shell.c:3:5: warning: unused variable 'x'\nmake: *** done\n"),
            Some("shell.c:3:5: warning: unused variable 'x'\n".to_owned())
        );
    }

    #[test]
    fn command_display_quotes_lists() {
        let args = vec!["moreclean".to_owned(), "ADDITIONAL_SOURCES=a.c b.c".to_owned()];
        assert_eq!(
            display_command(Path::new("make"), &args),
            "make moreclean ADDITIONAL_SOURCES=\"a.c b.c\""
        );
    }

    #[tokio::test]
    async fn failing_build_step_is_fatal() {
        let ctx = sh_context();
        let sh = ProcessRunner::new("/bin/sh");
        let args = vec!["-c".to_owned(), "echo broken >&2; exit 2".to_owned()];
        let e = check_cmd(&ctx, &sh, &args).await.unwrap_err();
        let e = e.downcast::<BuildError>().unwrap();
        assert!(matches!(
            e,
            BuildError::CommandFailed { returncode: 2, ref stderr, .. } if stderr == "broken\n"
        ));
    }
}
