use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::config_paths::ensure_parent_dir;
use crate::error::{ManagerError, Result};
use crate::worker::LogLevel;

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

#[derive(Debug, Default)]
pub struct LogBook {
    entries: Vec<LogEntry>,
}

impl LogBook {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.entries.push(LogEntry {
            at: Local::now(),
            level,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(LogEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn export(&self, path: &Path) -> Result<usize> {
        ensure_parent_dir(path)?;
        let mut body = self.render();
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(path, body).map_err(|err| ManagerError::local_io(path, err))?;
        Ok(self.entries.len())
    }
}
