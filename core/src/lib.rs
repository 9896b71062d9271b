pub mod aggregate;
pub mod config;
pub mod error;
pub mod flags;
pub mod loader;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod writer;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, Preview, RunSummary};
