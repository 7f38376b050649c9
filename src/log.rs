use std::{fmt::Display, fs::OpenOptions, io::{self, Write}, process::id, sync::{RwLock, RwLockReadGuard}};
use chrono::Local;
use once_cell::sync::Lazy;

#[derive(Clone, Copy, PartialEq)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    fn rank(&self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Verbose => 1,
            Self::Notice => 2,
            Self::Warning => 3,
        }
    }

    fn less(&self, rhs: &Self) -> bool {
        self.rank() < rhs.rank()
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ch = match self {
            Self::Debug => '.',
            Self::Verbose => '-',
            Self::Notice => '*',
            Self::Warning => '#',
        };
        write!(f, "{ch}")
    }
}

struct LogSink {
    verbosity: LogLevel,
    log_file: String,        // "" = log on standard output
}

static SINK: Lazy<RwLock<LogSink>> = Lazy::new(|| {
    RwLock::new(LogSink { verbosity: LogLevel::Notice, log_file: String::new() })
});
fn sink_read() -> RwLockReadGuard<'static, LogSink> {
    SINK.read().unwrap()
}

/// Install the process-wide verbosity and log destination. Called once
/// at startup, before the event loop runs.
pub fn configure_log(verbosity: LogLevel, log_file: &str) {
    let mut sink = SINK.write().unwrap();
    sink.verbosity = verbosity;
    sink.log_file = log_file.to_string();
}

pub fn log(level: LogLevel, body: &str) {
    let sink = sink_read();
    if level.less(&sink.verbosity) {
        return;
    }

    let mut writer: Box<dyn Write>;
    if sink.log_file.is_empty() {
        writer = Box::new(io::stdout());
    } else {
        match OpenOptions::new().create(true).append(true).open(&sink.log_file) {
            Ok(f) => { writer = Box::new(f); },
            Err(_) => {
                eprintln!("Can't open log file: {}", sink.log_file);
                return;
            },
        }
    }

    let line = format!("[{}] {} {} {}\n", id(), Local::now().format("%d %b %H:%M:%S%.3f"), level, body);
    match writer.write_all(line.as_bytes()) {
        Ok(_) => {},
        Err(e) => { eprintln!("Can't write log: {}", e); },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_test() {
        assert_eq!(format!("{}", LogLevel::Debug), ".");
        assert_eq!(format!("{}", LogLevel::Warning), "#");
        assert!(LogLevel::Debug.less(&LogLevel::Notice));
        assert!(!LogLevel::Warning.less(&LogLevel::Debug));
    }

    #[test]
    fn log_print_test() {
        log(LogLevel::Notice, &format!("hello {}", "rcache"));
        log(LogLevel::Debug, "filtered out at the default verbosity");
    }
}
