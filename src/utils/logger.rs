use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, OnceLock};
use std::thread;

use chrono::Local;
use parking_lot::Mutex;

#[derive(Debug, PartialOrd, PartialEq, Clone, Copy)]
pub enum LogLevel {
    DEBUG,
    INFO,
    WARNING,
    ERROR,
    CRITICAL,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<LogLevel> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::DEBUG),
            "INFO" => Some(LogLevel::INFO),
            "WARN" | "WARNING" => Some(LogLevel::WARNING),
            "ERROR" => Some(LogLevel::ERROR),
            "CRITICAL" => Some(LogLevel::CRITICAL),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::DEBUG => "DEBUG",
            LogLevel::INFO => "INFO",
            LogLevel::WARNING => "WARNING",
            LogLevel::ERROR => "ERROR",
            LogLevel::CRITICAL => "CRITICAL",
        }
    }
}

/// Subsystem a log line belongs to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogCategory {
    Connection,
    Borrow,
    Pool,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Connection => "lease_pool:connection",
            LogCategory::Borrow => "lease_pool:borrow",
            LogCategory::Pool => "lease_pool:pool",
        }
    }
}

pub struct Logger {
    current_level: Mutex<LogLevel>,
    log_file: Mutex<Option<std::fs::File>>,
}

impl Logger {
    pub fn instance() -> Arc<Logger> {
        static INSTANCE: OnceLock<Arc<Logger>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(Logger::new())).clone()
    }

    fn new() -> Self {
        let level = env::var("LEASE_POOL_LOG")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::WARNING);
        Logger {
            current_level: Mutex::new(level),
            log_file: Mutex::new(None),
        }
    }

    pub fn log_level(&self) -> LogLevel {
        *self.current_level.lock()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        *self.current_level.lock() = level;
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= *self.current_level.lock()
    }

    pub fn set_log_file(&self, filename: &str) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(filename)?;
        *self.log_file.lock() = Some(file);
        Ok(())
    }

    pub fn clear_log_file(&self) {
        *self.log_file.lock() = None;
    }

    pub fn debug(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::DEBUG, category, message);
    }

    pub fn info(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::INFO, category, message);
    }

    pub fn warning(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::WARNING, category, message);
    }

    pub fn error(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::ERROR, category, message);
    }

    pub fn critical(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::CRITICAL, category, message);
    }

    fn log(&self, level: LogLevel, category: LogCategory, message: &str) {
        if !self.enabled(level) {
            return;
        }

        let now = Local::now();
        let thread_id = thread::current().id();

        let log_message = format!(
            "{}.{:03} [{:?}] {} {}: {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_millis(),
            thread_id,
            level.as_str(),
            category.as_str(),
            message
        );

        eprintln!("{}", log_message);

        if let Some(file) = self.log_file.lock().as_mut() {
            if let Err(e) = writeln!(file, "{}", log_message) {
                eprintln!("Failed to write to log file: {}", e);
            }
        }
    }
}
