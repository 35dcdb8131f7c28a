pub mod config;
pub mod error;
pub mod feed;
pub mod types;

pub use config::{Config, RunMode};
pub use error::{Error, Result};
pub use types::*;
