pub mod action;
pub mod build;
pub mod check;
pub mod config;
pub mod context;
pub mod fsutil;
pub mod prompt;
pub mod report;
pub mod style;
pub mod suite;
pub mod testing;

pub use crate::config::Config;
pub use crate::context::RunContext;
