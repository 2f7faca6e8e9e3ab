use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use super::{failure::CheckError, result::Verdict};
use crate::check::{Check, Evaluate as _};
use crate::context::RunContext;
use crate::style;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Test {
    pub name: String,
    /// Runs this test under the memory checker unless a failure is already recorded.
    #[serde(default)]
    pub memcheck: bool,
    pub check: Check,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestGroup {
    pub name: String,
    /// Negative for penalty groups.
    pub weight: f64,
    #[serde(rename = "test", default)]
    pub tests: Vec<Test>,
    #[serde(default)]
    pub abort_on_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRecord {
    pub name: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub name: String,
    pub weight: f64,
    pub passed: usize,
    pub total: usize,
    pub points: f64,
    pub records: Vec<TestRecord>,
    /// The group did not run at all because an earlier group or tier aborted.
    pub skipped: bool,
}

impl GroupOutcome {
    pub fn skipped(group: &TestGroup) -> Self {
        Self {
            name: group.name.clone(),
            weight: group.weight,
            passed: 0,
            total: group.tests.len(),
            points: 0.0,
            records: Vec::new(),
            skipped: true,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Rounds half away from zero to two decimals, mapping `-0.0` to `0.0`.
pub fn round2(x: f64) -> f64 {
    let r = (x * 100.0).round() / 100.0;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// Points awarded for `passed` out of `total` tests.
///
/// A positive weight is earned in proportion to the pass rate. A negative weight is a
/// penalty charged in proportion to the failure rate, so a fully passing penalty group
/// costs nothing.
pub fn score(weight: f64, passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pass_rate = passed as f64 / total as f64;
    if weight >= 0.0 {
        round2(weight * pass_rate)
    } else {
        round2(weight * (1.0 - pass_rate))
    }
}

impl TestGroup {
    pub fn max_points(&self) -> f64 {
        self.weight.max(0.0)
    }

    /// Only an abort-on-failure group that did not fully pass stops the run.
    pub fn requests_abort(&self, outcome: &GroupOutcome) -> bool {
        self.abort_on_failure && !outcome.all_passed()
    }

    /// Runs every test in order and prints the transcript as it goes.
    ///
    /// Assertion failures are recorded; anything else aborts the whole run.
    pub async fn run(&self, ctx: &RunContext) -> anyhow::Result<GroupOutcome> {
        style::print_group_header(&self.name);

        let mut records = Vec::with_capacity(self.tests.len());
        let mut tests = self.tests.iter();
        for test in tests.by_ref() {
            let record = test.run(ctx).await?;
            let failed = record.verdict == Verdict::Fail;
            records.push(record);
            if failed && self.abort_on_failure {
                break;
            }
        }
        records.extend(tests.map(|t| TestRecord {
            name: t.name.clone(),
            verdict: Verdict::Skipped,
            message: None,
        }));

        let passed = records.iter().filter(|r| r.verdict == Verdict::Ok).count();
        let outcome = GroupOutcome {
            name: self.name.clone(),
            weight: self.weight,
            passed,
            total: self.tests.len(),
            points: score(self.weight, passed, self.tests.len()),
            records,
            skipped: false,
        };
        style::print_group_score(&outcome);
        Ok(outcome)
    }
}

impl Test {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<TestRecord> {
        ctx.memcheck().enable_for_current_test(self.memcheck);

        let spinner = ProgressBar::new_spinner()
            .with_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?)
            .with_message(self.name.clone());
        // Without a terminal the name goes to the transcript first, so a hang shows where.
        let live = !spinner.is_hidden();
        if live {
            spinner.enable_steady_tick(Duration::from_millis(50));
        } else {
            style::print_test_started(&self.name);
        }

        let res = self.check.evaluate(ctx).await;
        spinner.finish_and_clear();

        let (verdict, message) = match res {
            Ok(()) => (Verdict::Ok, None),
            Err(CheckError::Failed(e)) => (Verdict::Fail, Some(e.message)),
            Err(CheckError::Fatal(e)) => {
                return Err(e.context(format!("Test '{}' could not be executed", self.name)))
            }
        };
        log::debug!("{}: {}", self.name, verdict);
        let record = TestRecord {
            name: self.name.clone(),
            verdict,
            message,
        };
        if live {
            style::print_test_record(&record);
        } else {
            style::print_test_outcome(&record);
        }
        Ok(record)
    }
}
