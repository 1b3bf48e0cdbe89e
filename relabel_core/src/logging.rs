// Logging setup (log4rs backend for the `log` facade)
use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::{RelabelError, Result};

const CONSOLE_PATTERN: &str = "[{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {M}] {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} {M} - {m}{n}";

pub fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs the global logger. Console output always, plus an optional log
/// file (its parent directory is created).
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .build(path)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let config = builder
        .build(root.build(level))
        .map_err(|e| RelabelError::Configuration(format!("invalid logging config: {}", e)))?;
    log4rs::init_config(config)
        .map_err(|e| RelabelError::Configuration(format!("logger already installed: {}", e)))?;
    Ok(())
}
