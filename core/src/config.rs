use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::fsutil;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,
    pub engine: EngineConfig,
    pub memcheck: MemcheckConfig,
    pub build: BuildConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    pub candidate: PathBuf,
    pub reference_shell: PathBuf,
    pub expect_timeout_secs: f64,
    /// Pause between starting a foreground job and pressing Ctrl-C or Ctrl-Z.
    #[serde(default)]
    pub control_key_delay_secs: f64,

    /// Catalog to run instead of the built-in one.
    #[serde(default)]
    pub suite: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemcheckConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    /// Where `args` make the checker write its report.
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildConfig {
    pub enabled: bool,
    pub program: PathBuf,
    pub clean_target: String,
    pub makefile: PathBuf,
    pub clean_makefile: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobsConfig {
    pub ps_command: String,
    pub status_column: usize,
}

#[derive(RustEmbed)]
#[folder = "assets/"]
pub(crate) struct Asset;

impl Asset {
    pub(crate) fn text(filename: &str) -> String {
        let file = Asset::get(filename)
            .unwrap_or_else(|| panic!("'{}' is not embedded", filename));
        String::from_utf8_lossy(file.data.as_ref()).into_owned()
    }
}

impl Config {
    pub const FILENAME: &str = "shgrade.toml";

    pub fn example_toml() -> String {
        Asset::text(Self::FILENAME)
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file in ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// Explicit file first, then the nearest `shgrade.toml`, then the built-in defaults.
    pub fn load(explicit: Option<&Path>, cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_toml_file(path.to_owned());
        }
        match Self::find_file_in_ancestors(cur_dir) {
            Some(path) => {
                log::info!("Using config {}", path.to_string_lossy());
                Self::from_toml_file(path)
            }
            None => {
                log::info!("No {} found, using built-in defaults", Self::FILENAME);
                Self::from_toml(&Self::example_toml()).context("Built-in config is invalid")
            }
        }
    }

    pub fn expect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.engine.expect_timeout_secs.max(0.0))
    }

    pub fn control_key_delay(&self) -> Duration {
        Duration::from_secs_f64(self.engine.control_key_delay_secs.max(0.0))
    }

    /// Relative paths in the config file are relative to the file's directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match self.source_config_file.as_ref().and_then(|f| f.parent()) {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_owned(),
        }
    }
}

impl MemcheckConfig {
    pub fn prefix(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn example_toml_should_be_parsable() {
        let toml = Config::example_toml();
        let cfg = dbg!(Config::from_toml(&toml)).unwrap();

        let Config {
            source_config_file,
            engine,
            memcheck,
            build,
            jobs,
        } = cfg;

        assert_eq!(source_config_file, None);
        assert_eq!(engine.candidate, Path::new("./mysh"));
        assert_eq!(engine.reference_shell, Path::new("bash"));
        assert_eq!(engine.expect_timeout_secs, 30.0);
        assert_eq!(engine.control_key_delay_secs, 0.0);
        assert_eq!(engine.suite, None);

        assert!(memcheck.enabled);
        assert_eq!(
            memcheck.prefix(),
            vec!["valgrind".to_owned(), "--log-file=_valgrind.out".to_owned()]
        );
        assert_eq!(memcheck.log_file, Path::new("_valgrind.out"));

        assert!(build.enabled);
        assert_eq!(build.program, Path::new("make"));
        assert_eq!(build.clean_target, "moreclean");
        assert_eq!(build.makefile, Path::new("Makefile"));
        assert_eq!(build.clean_makefile, Path::new("/framework/Makefile"));

        assert_eq!(jobs.ps_command, "ps t");
        assert_eq!(jobs.status_column, 2);
    }

    #[test]
    fn resolve_is_relative_to_config_file() {
        let mut cfg = Config::from_toml(&Config::example_toml()).unwrap();
        assert_eq!(cfg.resolve("suite.toml"), Path::new("suite.toml"));

        cfg.source_config_file = Some(PathBuf::from("/work/sub/shgrade.toml"));
        assert_eq!(cfg.resolve("suite.toml"), Path::new("/work/sub/suite.toml"));
        assert_eq!(cfg.resolve("/abs/suite.toml"), Path::new("/abs/suite.toml"));
    }

    #[test]
    fn missing_section_is_rejected() {
        let res = Config::from_toml("[engine]\ncandidate = './mysh'\n");
        assert!(res.is_err());
    }
}
