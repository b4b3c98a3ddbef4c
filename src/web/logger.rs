use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}";

/// Build the log4rs config: stderr plus one timestamped file per run.
pub fn build_config(log_dir: &Path, level: LevelFilter) -> Result<(Config, PathBuf), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    let log_path = log_dir.join(format!("sidecar-{timestamp}.log"));

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(&log_path)?;

    // stdout belongs to the host process
    let console_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(Appender::builder().build("console", Box::new(console_appender)))
        .build(
            Root::builder()
                .appender("file")
                .appender("console")
                .build(level),
        )?;

    Ok((config, log_path))
}

pub fn setup_logging(log_dir: &Path, level: LevelFilter) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let (config, log_path) = build_config(log_dir, level)?;
    log4rs::init_config(config)?;
    Ok(log_path)
}
