use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;

use crate::config::Asset;
use crate::fsutil;
use crate::testing::TestGroup;

/// The whole catalog: tiers of weighted groups, run in declared order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Suite {
    #[serde(rename = "tier")]
    pub tiers: Vec<Tier>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tier {
    pub name: String,
    /// Points earlier tiers must have reached for this tier to run.
    #[serde(default)]
    pub required_points: Option<f64>,
    #[serde(rename = "group")]
    pub groups: Vec<TestGroup>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SuiteError {
    #[error("Group '{0}' has no tests")]
    EmptyGroup(String),

    #[error("Group name '{0}' is used more than once")]
    DuplicateGroup(String),

    #[error("Group '{0}' has a non-finite weight")]
    InvalidWeight(String),

    #[error("Tier '{0}' has no groups")]
    EmptyTier(String),
}

impl Suite {
    pub const FILENAME: &str = "suite.toml";

    pub fn builtin_toml() -> String {
        Asset::text(Self::FILENAME)
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml(&Self::builtin_toml()).context("Built-in suite is invalid")
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let suite: Self = toml::from_str(s)?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn from_toml_file(filepath: impl AsRef<Path>) -> anyhow::Result<Self> {
        let filepath = filepath.as_ref();
        let toml = fsutil::read_to_string(filepath)?;
        Self::from_toml(&toml).with_context(|| format!("Invalid suite TOML: {:?}", filepath))
    }

    pub fn validate(&self) -> Result<(), SuiteError> {
        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.groups.is_empty() {
                return Err(SuiteError::EmptyTier(tier.name.clone()));
            }
            for g in &tier.groups {
                if g.tests.is_empty() {
                    return Err(SuiteError::EmptyGroup(g.name.clone()));
                }
                if !g.weight.is_finite() {
                    return Err(SuiteError::InvalidWeight(g.name.clone()));
                }
                if !seen.insert(g.name.as_str()) {
                    return Err(SuiteError::DuplicateGroup(g.name.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn groups(&self) -> impl Iterator<Item = &TestGroup> {
        self.tiers.iter().flat_map(|t| t.groups.iter())
    }

    /// Sum of positive weights over every group, run or not.
    pub fn max_points(&self) -> f64 {
        self.groups().map(TestGroup::max_points).sum()
    }
}

impl Tier {
    pub fn max_points(&self) -> f64 {
        self.groups.iter().map(TestGroup::max_points).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::check::Check;

    #[test]
    fn builtin_suite_should_be_parsable() {
        let suite = dbg!(Suite::builtin()).unwrap();
        let names: Vec<_> = suite.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["basic", "advanced"]);

        let basic = &suite.tiers[0];
        let advanced = &suite.tiers[1];
        assert_eq!(basic.required_points, None);
        assert_eq!(advanced.required_points, Some(5.0));
        assert_eq!(basic.max_points(), 7.0);
        assert_eq!(advanced.max_points(), 6.0);
        assert_eq!(suite.max_points(), 13.0);

        let first = &basic.groups[0];
        assert_eq!(first.name, "Valid submission");
        assert!(first.abort_on_failure);
        assert_eq!(first.tests[0].check, Check::Usage { flag: "-h".into() });

        let penalties: Vec<_> = suite
            .groups()
            .filter(|g| g.weight < 0.0)
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(
            penalties,
            ["Valgrind memcheck", "Compiler warnings", "Errors", "Signals"]
        );
    }

    #[test]
    fn every_check_kind_is_used_by_the_builtin_suite() {
        let suite = Suite::builtin().unwrap();
        let kinds: HashSet<_> = suite
            .groups()
            .flat_map(|g| g.tests.iter())
            .map(|t| t.check.kind())
            .collect();
        for kind in [
            "compare",
            "expect",
            "diagnose",
            "stdin",
            "wait",
            "usage",
            "memcheck",
            "warnings",
            "exit",
            "prompt",
            "detach",
            "interrupt",
            "suspend",
            "suspend_resume",
            "detach_resume",
            "detach_suspend_resume",
        ] {
            assert!(kinds.contains(kind), "{} unused", kind);
        }
    }

    #[test]
    fn invalid_suites_are_rejected() {
        let empty = r#"
            [[tier]]
            name = "t"
            [[tier.group]]
            name = "g"
            weight = 1.0
            test = []
        "#;
        let e = Suite::from_toml(empty).unwrap_err();
        assert_eq!(
            e.downcast_ref::<SuiteError>(),
            Some(&SuiteError::EmptyGroup("g".into()))
        );

        let dup = r#"
            [[tier]]
            name = "t"
            [[tier.group]]
            name = "g"
            weight = 1.0
            [[tier.group.test]]
            name = "a"
            check = { kind = "warnings" }
            [[tier.group]]
            name = "g"
            weight = -1.0
            [[tier.group.test]]
            name = "b"
            check = { kind = "warnings" }
        "#;
        let e = Suite::from_toml(dup).unwrap_err();
        assert_eq!(
            e.downcast_ref::<SuiteError>(),
            Some(&SuiteError::DuplicateGroup("g".into()))
        );
    }
}
