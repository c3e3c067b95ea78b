pub mod analyzer;
pub mod brew_log;
pub mod prompt;
pub mod response_parser;

pub use analyzer::{AnalyzerSettings, BrewAnalyzer};
pub use brew_log::{BrewLogError, BrewLogHandler};
