//! distci Builder Library
//!
//! A builder turns BuilderTasks into test binaries, one task at a time,
//! and forwards them to a runner as a RunnerTask.

pub mod artifacts;
pub mod builder;
pub mod command;
pub mod config;
pub mod error;
pub mod http;
pub mod toolchain;
pub mod vcs;

pub use artifacts::ArtifactStore;
pub use builder::Builder;
pub use config::Config;
pub use error::BuildError;
pub use toolchain::{GoToolchain, Toolchain};
