pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::path::{Path, PathBuf};

use error::*;

use crate::build;
use crate::config::Config;
use crate::context::RunContext;
use crate::fsutil;
use crate::report::RunReport;
use crate::style;
use crate::suite::{Suite, Tier};
use crate::testing::GroupOutcome;

/// Writes the example `shgrade.toml` into `dir`, refusing to overwrite.
pub fn init_config(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    ensure!(dir.is_dir(), "Not a directory: {}", dir.to_string_lossy());

    let path = dir.join(Config::FILENAME);
    fsutil::write_new(&path, Config::example_toml())
        .with_context(|| format!("Failed to create {}", Config::FILENAME))?;
    Ok(path)
}

/// The catalog named in the config, or the built-in one.
pub fn load_suite(cfg: &Config) -> Result<Suite> {
    match &cfg.engine.suite {
        Some(path) => {
            let path = cfg.resolve(path);
            log::info!("Using suite {}", path.to_string_lossy());
            Suite::from_toml_file(&path)
        }
        None => Suite::builtin(),
    }
}

/// Runs every tier of `suite` in order, recording each group into `report`.
///
/// A tier with `required_points` runs only if the points so far reach it. Once an
/// abort-on-failure group fails or a tier is refused, every remaining group is recorded
/// as 0 without being run.
pub async fn run_suite(ctx: &RunContext, suite: &Suite, report: &mut RunReport) -> Result<()> {
    let mut aborted = false;
    let mut previous: Option<&Tier> = None;

    for tier in &suite.tiers {
        if !aborted && !gate_passed(tier, previous, report.points()) {
            aborted = true;
        }
        log::info!(
            "{} tier '{}'",
            if aborted { "Skipping" } else { "Running" },
            tier.name
        );

        for group in &tier.groups {
            if aborted {
                report
                    .record(GroupOutcome::skipped(group))
                    .context("Failed to write the result file")?;
                continue;
            }
            let outcome = group.run(ctx).await?;
            if group.requests_abort(&outcome) {
                log::info!("'{}' did not fully pass, skipping the rest", group.name);
                aborted = true;
            }
            report
                .record(outcome)
                .context("Failed to write the result file")?;
        }
        previous = Some(tier);
    }

    style::print_run_summary(report.points(), report.max_points());
    Ok(())
}

fn gate_passed(tier: &Tier, previous: Option<&Tier>, points: f64) -> bool {
    let Some(required) = tier.required_points else {
        return true;
    };
    let previous = previous.map(|t| t.name.as_str()).unwrap_or("previous");
    if points >= required {
        style::print_tier_passed(previous, &tier.name);
        true
    } else {
        style::print_tier_refused(previous, points, required);
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradeOptions {
    /// Receives `<group>: <points>` lines as groups complete.
    pub output_file: Option<PathBuf>,
    pub json_file: Option<PathBuf>,
}

/// Build, then grade. Build errors abort before anything is scored.
pub async fn grade(ctx: &RunContext, suite: &Suite, opts: &GradeOptions) -> Result<RunReport> {
    build::run(ctx).await?;

    let mut report = RunReport::new(suite.max_points());
    if let Some(path) = &opts.output_file {
        report = report
            .with_output_file(path)
            .context("Failed to open the result file")?;
    }

    run_suite(ctx, suite, &mut report).await?;

    if let Some(path) = &opts.json_file {
        fsutil::write_json_pretty(path, &report.to_json())
            .context("Failed to write the JSON report")?;
        log::info!("Wrote {}", path.to_string_lossy());
    }
    Ok(report)
}
