/*
 *  gomoku-core, a Gomoku/Ninuki-style search engine core.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  gomoku-core is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  gomoku-core is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with gomoku-core. If not, see <https://www.gnu.org/licenses/>.
 */

//! Human-readable logging for the outer layers only. Nothing under
//! `search/` or `backlog.rs` touches a wall clock or writes a log line
//! directly; callers pass a [`Logger`] in from the outside and log search
//! summaries, TT persistence results, and worker lifecycle events after the
//! fact.

use std::fmt;
use std::sync::{Arc, Mutex};

use colored::Colorize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn prefix(self) -> String {
        match self {
            LogLevel::Debug => "Debug:".to_string(),
            LogLevel::Info => String::new(),
            LogLevel::Warning => "Warning:".yellow().to_string(),
            LogLevel::Error => "Error:".red().bold().to_string(),
        }
    }
}

/// Somewhere a log line can go. Swappable so tests can assert on output
/// without touching stderr.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

#[derive(Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: &str) {
        eprintln!("{line}");
    }
}

/// Collects lines instead of printing them; used by tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl LogSink for BufferSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

impl BufferSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

pub struct Logger {
    sink: Arc<dyn LogSink>,
    min_level: LogLevel,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("min_level", &self.min_level).finish()
    }
}

impl Logger {
    pub fn new(min_level: LogLevel) -> Self {
        let res = Self { sink: Arc::new(StderrSink), min_level };
        res.log(LogLevel::Info, &format!("[logging started at {}]", chrono::offset::Utc::now().to_rfc2822()));
        res
    }

    pub fn with_sink(sink: Arc<dyn LogSink>, min_level: LogLevel) -> Self {
        Self { sink, min_level }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.min_level {
            return;
        }
        let stamp = chrono::offset::Utc::now().to_rfc2822();
        let prefix = level.prefix();
        if prefix.is_empty() {
            self.sink.write_line(&format!("[{stamp}] {message}"));
        } else {
            self.sink.write_line(&format!("[{stamp}] {prefix} {message}"));
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_sink_records_lines() {
        let sink = Arc::new(BufferSink::default());
        let logger = Logger::with_sink(sink.clone(), LogLevel::Debug);
        logger.info("hello");
        logger.warning("careful");
        assert_eq!(sink.lines().len(), 2);
        assert!(sink.lines()[1].contains("Warning:"));
    }

    #[test]
    fn below_threshold_messages_are_dropped() {
        let sink = Arc::new(BufferSink::default());
        let logger = Logger::with_sink(sink.clone(), LogLevel::Warning);
        logger.debug("should be dropped");
        logger.info("also dropped");
        logger.error("kept");
        assert_eq!(sink.lines().len(), 1);
    }
}
