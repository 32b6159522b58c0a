//! Configuration loading for the command-line tool.

pub mod duration;
pub mod settings;

pub use duration::parse_duration;
pub use settings::Settings;
