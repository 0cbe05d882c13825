use std::{fmt::Display, fs::OpenOptions, io::{self, BufWriter, Write}, process::{abort, id}, time::{Duration, SystemTime, UNIX_EPOCH}};
use chrono::Local;
use crate::server::server_read;

pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    pub fn less(&self, rhs: &Self) -> bool {
        match self {
            Self::Debug => {
                match rhs {
                    Self::Debug => false,
                    _ => true,
                }
            },
            Self::Verbose => {
                match rhs {
                    Self::Debug | Self::Verbose => false,
                    _ => true,
                }
            },
            Self::Notice => {
                match rhs {
                    Self::Warning => true,
                    _ => false,
                }
            },
            Self::Warning => false,
        }
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

pub fn timestamp() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap()
}

/// Log to stdout or to the configured logfile, honoring the server verbosity.
/// Callers must not hold the server lock across a call.
pub fn log(level: LogLevel, body: &str) {
    let log_file = {
        let server = server_read();
        if level.less(server.verbosity()) {
            return;
        }
        server.log_file().to_string()
    };

    let mut writer: Option<Box<dyn Write>> = None;
    if log_file.is_empty() {
        writer = Some(Box::new(io::stdout()));
    } else {
        if let Ok(f) = OpenOptions::new().append(true).create(true).open(&log_file) {
            writer = Some(Box::new(f));
        } else {
            eprintln!("Can't open log file: {}", log_file);
            return;
        }
    }

    let mut buf_writer = BufWriter::new(writer.unwrap());
    let line = format!("[{}] {} {} {}\n", id(), Local::now().format("%d %b %H:%M:%S%.3f"), level, body);
    match buf_writer.write_all(line.as_bytes()) {
        Ok(_) => {},
        Err(e) => { eprintln!("Can't write log: {}", e); },
    }
}

/// The server generally does not try to recover from out of memory conditions
/// when allocating objects or strings, so we simply abort.
pub fn oom(msg: &str) {
    log(LogLevel::Warning, &format!("{}: Out of memory", msg));
    abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_test() {
        assert_eq!(format!("{}", LogLevel::Debug), ".");
        assert!(LogLevel::Debug.less(&LogLevel::Notice));
        assert!(!LogLevel::Warning.less(&LogLevel::Debug));
    }

    #[test]
    fn log_print_test() {
        log(LogLevel::Notice, &format!("hello {}", "ruskip"));
        log(LogLevel::Debug, &format!("hello {}", "ruskip"));
    }
}
