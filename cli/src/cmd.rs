pub mod init;
pub mod list;
pub mod run;

use std::path::PathBuf;

use anyhow::Context as _;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Option<Subcommand>,

    /// Arguments of the default `run` subcommand
    #[command(flatten)]
    pub run: run::Args,

    /// Config file to use instead of the nearest shgrade.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Change to this directory before doing anything
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Build the submission and grade it (default)
    #[command(alias("r"))]
    Run(run::Args),

    /// Write an example shgrade.toml
    Init(init::Args),

    /// Print the test catalog
    #[command(alias("ls"))]
    List(list::Args),
}

pub type SubcmdResult = anyhow::Result<()>;

impl GlobalArgs {
    pub async fn exec_subcmd(&self) -> SubcmdResult {
        if let Some(dir) = &self.dir {
            std::env::set_current_dir(dir)
                .with_context(|| format!("Cannot change directory to {}", dir.to_string_lossy()))?;
        }

        use Subcommand::*;
        match &self.subcmd {
            None => run::exec(&self.run, self).await,
            Some(Run(args)) => run::exec(args, self).await,
            Some(Init(args)) => init::exec(args, self),
            Some(List(args)) => list::exec(args, self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn verify_cli() {
        GlobalArgs::command().debug_assert();
    }

    #[test]
    fn bare_output_path_means_run() {
        let app = GlobalArgs::parse_from(["shgrade", "result.txt", "--no-memcheck"]);
        assert!(app.subcmd.is_none());
        assert_eq!(app.run.output, Some(PathBuf::from("result.txt")));
        assert!(app.run.no_memcheck);
    }

    #[test]
    fn subcommands_take_precedence() {
        let app = GlobalArgs::parse_from(["shgrade", "list", "-C", "/tmp"]);
        assert!(matches!(app.subcmd, Some(Subcommand::List(_))));
        assert_eq!(app.dir, Some(PathBuf::from("/tmp")));
    }
}
