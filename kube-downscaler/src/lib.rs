pub mod config;
pub mod error;
pub mod kubernetes;
pub mod timespan;

pub use error::{Error, Result};
