use std::{path::PathBuf, process::exit};

use shgrade_core::Config;

use crate::cmd::GlobalArgs;

pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("Failed to get current dir: {}", e);
        exit(1);
    })
}

pub fn load_config(global: &GlobalArgs) -> anyhow::Result<Config> {
    Config::load(global.config.as_deref(), current_dir())
}
