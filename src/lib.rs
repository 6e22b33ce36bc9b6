pub mod alerts;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod fetch;
pub mod grading;
pub mod markets;
pub mod odds;
pub mod pipeline;
pub mod stadiums;
pub mod stats;
pub mod store;

pub use config::AppConfig;
pub use error::{MlbError, Result};
pub use store::Store;
