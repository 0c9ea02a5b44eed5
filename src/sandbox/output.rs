//! The print sink: script output never reaches stdout. Each non-blank
//! write is timestamped and buffered; the buffer is merged into the
//! result's `log` only if the execution completes.

use chrono::Utc;

/// Toggleable, timestamping capture for script print output.
///
/// Default enabled. Writes while disabled are dropped, not buffered —
/// re-enabling resumes capture without recovering the gap.
pub struct OutputCapture {
    enabled: bool,
    lines: Vec<String>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self {
            enabled: true,
            lines: Vec::new(),
        }
    }

    pub fn write(&mut self, text: &str) {
        if self.enabled && !text.trim().is_empty() {
            let stamp = Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f");
            self.lines.push(format!("[{stamp}] {text}"));
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Default for OutputCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_timestamped_and_ordered() {
        let mut capture = OutputCapture::new();
        capture.write("first");
        capture.write("second");
        let lines = capture.into_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
        // ISO timestamps compare lexicographically
        let stamp = |line: &str| line[1..line.find(']').unwrap()].to_string();
        assert!(stamp(&lines[0]) <= stamp(&lines[1]));
    }

    #[test]
    fn test_blank_writes_are_dropped() {
        let mut capture = OutputCapture::new();
        capture.write("");
        capture.write("   \n\t");
        assert!(capture.into_lines().is_empty());
    }

    #[test]
    fn test_disable_suppresses_only_subsequent_writes() {
        let mut capture = OutputCapture::new();
        capture.write("kept");
        capture.disable();
        capture.write("dropped");
        capture.enable();
        capture.write("kept too");

        let lines = capture.into_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("kept"));
        assert!(lines[1].ends_with("kept too"));
    }

    #[test]
    fn test_default_is_enabled() {
        assert!(OutputCapture::new().is_enabled());
    }
}
