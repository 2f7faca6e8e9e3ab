pub mod compare;
pub mod failure;
pub mod group;
pub mod jobs;
pub mod memcheck;
pub mod result;
pub mod runner;
pub mod session;
pub mod timing;

pub use failure::*;
pub use group::*;
pub use result::*;
pub use runner::*;
