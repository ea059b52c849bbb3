use chrono::{DateTime, Local};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub enum LogEntry {
    Info(String),
    Warning(String),
    Error(String),
    EventSent { event: String, payload: String },
    EventReceived { event: String, payload: String },
}

#[derive(Clone, Debug)]
pub struct ConsoleRecord {
    pub at: DateTime<Local>,
    pub entry: LogEntry,
}

/// Diagnostic channel for the panel. Failures land here instead of in
/// front of the user; every entry is mirrored to the `log` facade.
pub struct ConsoleLog {
    enabled: bool,
    entries: Vec<ConsoleRecord>,
    max_entries: usize,
    received_counts: HashMap<String, u64>, // event -> times received
    last_displayed_count: usize,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            enabled: true,
            entries: Vec::new(),
            max_entries: max_entries.max(1),
            received_counts: HashMap::new(),
            last_displayed_count: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_info(&mut self, message: &str) {
        log::info!("{}", message);
        self.push(LogEntry::Info(message.to_string()));
    }

    pub fn log_warning(&mut self, message: &str) {
        log::warn!("{}", message);
        self.push(LogEntry::Warning(message.to_string()));
    }

    pub fn log_error(&mut self, message: &str) {
        log::error!("{}", message);
        self.push(LogEntry::Error(message.to_string()));
    }

    pub fn log_event_sent(&mut self, event: &str, payload: &str) {
        log::debug!("-> {} {}", event, payload);
        self.push(LogEntry::EventSent {
            event: event.to_string(),
            payload: payload.to_string(),
        });
    }

    pub fn log_event_received(&mut self, event: &str, payload: &str) {
        log::debug!("<- {} {}", event, payload);
        *self.received_counts.entry(event.to_string()).or_insert(0) += 1;
        self.push(LogEntry::EventReceived {
            event: event.to_string(),
            payload: payload.to_string(),
        });
    }

    fn push(&mut self, entry: LogEntry) {
        if !self.enabled {
            return;
        }

        self.entries.push(ConsoleRecord {
            at: Local::now(),
            entry,
        });

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
            self.last_displayed_count = self.last_displayed_count.saturating_sub(1);
        }
    }

    pub fn get_entries(&self) -> &[ConsoleRecord] {
        &self.entries
    }

    pub fn get_new_entries(&mut self) -> &[ConsoleRecord] {
        let start = self.last_displayed_count.min(self.entries.len());
        self.last_displayed_count = self.entries.len();
        &self.entries[start..]
    }

    pub fn reset_display_count(&mut self) {
        self.last_displayed_count = 0;
    }

    pub fn received_count(&self, event: &str) -> u64 {
        self.received_counts.get(event).copied().unwrap_or(0)
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|record| match &record.entry {
            LogEntry::Error(message) => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|record| match &record.entry {
            LogEntry::Warning(message) => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_displayed_count = 0;
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogEntry::Info(msg) => write!(f, "[INFO] {}", msg),
            LogEntry::Warning(msg) => write!(f, "[WARN] {}", msg),
            LogEntry::Error(msg) => write!(f, "[ERROR] {}", msg),
            LogEntry::EventSent { event, payload } => write!(f, "[SENT] {} {}", event, payload),
            LogEntry::EventReceived { event, payload } => write!(f, "[RECV] {} {}", event, payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_entries() {
        let mut console = ConsoleLog::with_capacity(2);
        console.log_info("one");
        console.log_info("two");
        console.log_error("three");

        let rendered: Vec<String> = console.get_entries().iter().map(|r| r.entry.to_string()).collect();
        assert_eq!(rendered, vec!["[INFO] two", "[ERROR] three"]);
    }

    #[test]
    fn new_entries_cursor_advances() {
        let mut console = ConsoleLog::new();
        console.log_info("a");
        assert_eq!(console.get_new_entries().len(), 1);
        assert_eq!(console.get_new_entries().len(), 0);
        console.log_warning("b");
        assert_eq!(console.get_new_entries().len(), 1);
        console.reset_display_count();
        assert_eq!(console.get_new_entries().len(), 2);
    }

    #[test]
    fn disabled_console_drops_entries_but_counts_events() {
        let mut console = ConsoleLog::new();
        console.set_enabled(false);
        console.log_error("hidden");
        console.log_event_received("get_handshakes", "[]");

        assert!(console.get_entries().is_empty());
        assert_eq!(console.received_count("get_handshakes"), 1);
    }

    #[test]
    fn filters_errors_and_warnings() {
        let mut console = ConsoleLog::new();
        console.log_error("bad");
        console.log_warning("odd");
        console.log_event_sent("get_handshakes", "");

        assert_eq!(console.errors().collect::<Vec<_>>(), vec!["bad"]);
        assert_eq!(console.warnings().collect::<Vec<_>>(), vec!["odd"]);
    }
}
