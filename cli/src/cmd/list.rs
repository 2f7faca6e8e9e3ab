use colored::Colorize as _;
use shgrade_core::action;

use crate::util;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Also show each test's check kind
    #[arg(short, long)]
    verbose: bool,
}

pub fn exec(args: &Args, global: &GlobalArgs) -> SubcmdResult {
    let cfg = util::load_config(global)?;
    let suite = action::load_suite(&cfg)?;

    for tier in &suite.tiers {
        match tier.required_points {
            Some(req) => println!("{} (needs {:.1} points)", tier.name.bold(), req),
            None => println!("{}", tier.name.bold()),
        }
        for group in &tier.groups {
            let weight = format!("{:+.1}", group.weight);
            let weight = if group.weight < 0.0 {
                weight.red()
            } else {
                weight.green()
            };
            let abort = if group.abort_on_failure {
                " (stops on failure)".dimmed().to_string()
            } else {
                String::new()
            };
            println!("  {} {}{}", weight, group.name.blue().bold(), abort);

            for test in &group.tests {
                if args.verbose {
                    let memcheck = if test.memcheck { ", memcheck" } else { "" };
                    println!(
                        "      - {} {}",
                        test.name,
                        format!("[{}{}]", test.check.kind(), memcheck).dimmed()
                    );
                } else {
                    println!("      - {}", test.name);
                }
            }
        }
    }
    println!(
        "\nMaximum: {:.2} points",
        suite.max_points()
    );
    Ok(())
}
