use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lease_pool::{LogCategory, LogLevel, Logger};

#[test]
fn test_log_level_setting() {
    let logger = Logger::instance();
    logger.set_log_level(LogLevel::DEBUG);
    assert_eq!(logger.log_level(), LogLevel::DEBUG);
    assert!(logger.enabled(LogLevel::INFO));

    logger.set_log_level(LogLevel::ERROR);
    assert_eq!(logger.log_level(), LogLevel::ERROR);
    assert!(!logger.enabled(LogLevel::WARNING));
    assert!(logger.enabled(LogLevel::CRITICAL));
}

#[test]
fn test_parse_level() {
    assert_eq!(LogLevel::parse("debug"), Some(LogLevel::DEBUG));
    assert_eq!(LogLevel::parse(" warn "), Some(LogLevel::WARNING));
    assert_eq!(LogLevel::parse("Critical"), Some(LogLevel::CRITICAL));
    assert_eq!(LogLevel::parse("verbose"), None);
}

#[test]
fn test_log_file_output() {
    let logger = Logger::instance();
    let log_filename = "test_lease_pool_log.txt";

    logger.set_log_file(log_filename).unwrap();
    logger.error(LogCategory::Borrow, "This is a test log entry.");
    logger.clear_log_file();

    let contents = fs::read_to_string(log_filename).unwrap();
    let entry = contents
        .lines()
        .find(|line| line.contains("This is a test log entry."))
        .expect("entry missing from log file");
    assert!(entry.contains("ERROR lease_pool:borrow"));

    fs::remove_file(log_filename).unwrap();
}

#[test]
fn test_multithreaded_logging() {
    let logger = Logger::instance();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                logger.info(LogCategory::Pool, &format!("Thread {} logging", i));
                thread::sleep(Duration::from_millis(10));
                logger.debug(LogCategory::Connection, &format!("Thread {} debug", i));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
