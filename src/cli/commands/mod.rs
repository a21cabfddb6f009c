//! CLI command implementations

pub mod config;
pub mod volume;

pub use config::execute as config;
pub use volume::execute as volume;
