pub mod browser;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod types;

pub use config::Config;
pub use error::{FormatError, ScrapeError};
