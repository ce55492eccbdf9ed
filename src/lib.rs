pub mod config;
pub mod descriptor;
pub mod error;
pub mod fsutil;
pub mod model;
pub mod provision;

pub use error::{Error, Result};
