use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum LogLevel {
    Info(Color),
    Warn,
    Error,
}

impl LogLevel {
    fn label(&self) -> &'static str {
        match self {
            LogLevel::Info(_) => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// The escape sequence a console echo is wrapped in. Info lines carry
    /// the caller's color; warnings and errors get the bright variants.
    fn ansi_prefix(&self) -> &'static str {
        match self {
            LogLevel::Info(color) => color.to_ansi_code(),
            LogLevel::Warn => "\x1b[93m",
            LogLevel::Error => "\x1b[91m",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
}

impl Color {
    fn to_ansi_code(self) -> &'static str {
        match self {
            Color::Red => "\x1b[31m",
            Color::Green => "\x1b[32m",
            Color::Blue => "\x1b[34m",
            Color::Yellow => "\x1b[33m",
            Color::Cyan => "\x1b[36m",
            Color::Magenta => "\x1b[35m",
        }
    }
}

/// File logger shared by the whole process. Cloning it is cheap; every clone
/// appends to the same `airport_{tag}.log` file.
#[derive(Debug, Clone)]
pub struct Logger {
    log_file: PathBuf,
}

impl Logger {
    /// Creates a logger writing to `airport_{tag}.log` inside `log_dir`,
    /// creating the directory if needed. The file is opened in append mode so
    /// restarts keep the history of earlier runs.
    pub fn new(log_dir: &Path, tag: &str) -> Result<Self, LoggerError> {
        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir).map_err(LoggerError::from)?;
        } else if !log_dir.is_dir() {
            return Err(LoggerError::InvalidPath(
                "Provided path is not a directory.".into(),
            ));
        }

        let sanitized_tag = tag.replace([':', '/'], "_");
        let log_file = log_dir.join(format!("airport_{}.log", sanitized_tag));

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(LoggerError::from)?;

        Ok(Logger { log_file })
    }

    /// Formats one line and writes it to the file, echoing it to stdout in
    /// color first when asked. The file copy never carries escape codes.
    fn log(&self, level: LogLevel, message: &str, to_console: bool) -> Result<(), LoggerError> {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] [{}]: {}\n", level.label(), timestamp, message);

        if to_console {
            print!("{}{}\x1b[0m", level.ansi_prefix(), line);
            io::stdout().flush()?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Logs an informational message, optionally echoed to the console in the
    /// given color.
    pub fn info(&self, message: &str, color: Color, to_console: bool) -> Result<(), LoggerError> {
        self.log(LogLevel::Info(color), message, to_console)
    }

    /// Logs a warning message.
    pub fn warn(&self, message: &str, to_console: bool) -> Result<(), LoggerError> {
        self.log(LogLevel::Warn, message, to_console)
    }

    /// Logs an error message.
    pub fn error(&self, message: &str, to_console: bool) -> Result<(), LoggerError> {
        self.log(LogLevel::Error, message, to_console)
    }
}

#[derive(Debug)]
pub enum LoggerError {
    IoError(std::io::Error),
    InvalidPath(String),
}

impl std::fmt::Display for LoggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggerError::IoError(e) => write!(f, "log file i/o failed: {}", e),
            LoggerError::InvalidPath(msg) => write!(f, "bad log directory: {}", msg),
        }
    }
}

impl std::error::Error for LoggerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggerError::IoError(e) => Some(e),
            LoggerError::InvalidPath(_) => None,
        }
    }
}

impl From<std::io::Error> for LoggerError {
    fn from(err: std::io::Error) -> Self {
        LoggerError::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    #[test]
    fn test_logging_writes_levels_and_message() {
        let log_dir = Path::new("/tmp/test_airport_logs");
        fs::create_dir_all(log_dir).expect("Failed to create test directory");

        let logger = Logger::new(log_dir, "server").expect("Failed to create logger");

        logger
            .info("tower online", Color::Green, false)
            .expect("Failed to log info");
        logger.warn("gusty crosswind", false).expect("Failed to log warn");

        let log_file_path = log_dir.join("airport_server.log");
        let log_contents = fs::read_to_string(&log_file_path).expect("Failed to read log file");

        assert!(log_contents.contains("[INFO]"), "INFO level missing in log");
        assert!(log_contents.contains("[WARN]"), "WARN level missing in log");
        assert!(log_contents.contains("tower online"), "Logged message missing");
        assert!(
            !log_contents.contains('\x1b'),
            "escape codes belong on the console, not in the file"
        );

        fs::remove_dir_all(log_dir).expect("Failed to remove test directory");
    }

    #[test]
    fn test_new_creates_missing_directory_and_appends() {
        let log_dir = Path::new("/tmp/test_airport_logs_fresh");
        let _ = fs::remove_dir_all(log_dir);

        let logger = Logger::new(log_dir, "messenger").expect("Failed to create logger");
        logger.error("first run", false).expect("Failed to log");

        // A second logger over the same tag must keep the earlier lines.
        let again = Logger::new(log_dir, "messenger").expect("Failed to reopen logger");
        again.error("second run", false).expect("Failed to log");

        let log_contents = fs::read_to_string(log_dir.join("airport_messenger.log"))
            .expect("Failed to read log file");
        assert!(log_contents.contains("first run"));
        assert!(log_contents.contains("second run"));

        fs::remove_dir_all(log_dir).expect("Failed to remove test directory");
    }

    #[test]
    fn test_rejects_path_that_is_a_file() {
        let file_path = Path::new("/tmp/test_airport_logs_file");
        fs::write(file_path, b"not a directory").expect("Failed to create file");

        let result = Logger::new(file_path, "server");
        assert!(result.is_err(), "Logger should fail when the path is a file");

        fs::remove_file(file_path).expect("Failed to remove test file");
    }
}
