pub mod cli;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod render;

#[cfg(test)]
mod test_support;

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder, PipelineReport};
pub use error::{AppError, ConfigError, FrameError};
