use std::path::PathBuf;

use anyhow::{bail, Context as _};
use shgrade_core::{
    action::{self, GradeOptions},
    suite::Suite,
    RunContext,
};
use tokio::signal::unix::{signal, SignalKind};

use crate::util;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, Clone, Default, clap::Args)]
pub struct Args {
    /// Also write `<group>: <points>` lines to this file
    #[arg()] // positional argument
    pub output: Option<PathBuf>,

    /// Catalog to run instead of the configured one
    #[arg(long, value_name = "FILE")]
    pub suite: Option<PathBuf>,

    /// Shell under test
    #[arg(long, value_name = "PATH")]
    pub candidate: Option<PathBuf>,

    /// Shell whose output counts as correct
    #[arg(long, value_name = "PATH")]
    pub reference: Option<PathBuf>,

    #[arg(long)]
    pub no_memcheck: bool,

    /// Grade the existing candidate without running make
    #[arg(long)]
    pub skip_build: bool,

    /// Write a JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,
}

pub async fn exec(args: &Args, global: &GlobalArgs) -> SubcmdResult {
    let mut cfg = util::load_config(global)?;
    if let Some(path) = &args.suite {
        cfg.engine.suite = Some(util::current_dir().join(path));
    }
    if let Some(path) = &args.candidate {
        cfg.engine.candidate = path.clone();
    }
    if let Some(path) = &args.reference {
        cfg.engine.reference_shell = path.clone();
    }
    if args.no_memcheck {
        cfg.memcheck.enabled = false;
    }
    if args.skip_build {
        cfg.build.enabled = false;
    }
    log::debug!("{:#?}", cfg);

    let suite = action::load_suite(&cfg)?;
    let ctx = RunContext::new(cfg);
    let opts = GradeOptions {
        output_file: args.output.clone(),
        json_file: args.json.clone(),
    };

    grade_until_sigterm(&ctx, &suite, &opts).await
}

/// Grades, unless SIGTERM arrives first; then the command in flight is reported instead.
async fn grade_until_sigterm(ctx: &RunContext, suite: &Suite, opts: &GradeOptions) -> SubcmdResult {
    let mut sigterm = signal(SignalKind::terminate()).context("Cannot install SIGTERM handler")?;
    tokio::select! {
        res = action::grade(ctx, suite, opts) => {
            res?;
        }
        _ = sigterm.recv() => {
            bail!("SIGTERM while executing command:\n\"{}\"", ctx.last_command());
        }
    }
    Ok(())
}
