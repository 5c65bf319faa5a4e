//! Outcome summaries of one dispatched batch.

use std::fmt;

use classpulse_core::EventKind;
use serde::Serialize;

/// What happened to one kind-group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub kind: EventKind,
    /// Envelopes handed to the worker.
    pub received: usize,
    /// Records, sessions or messages written to the store.
    pub persisted: usize,
    /// Items dropped by payload decoding, validation or admission.
    pub dropped: usize,
    /// Store, timeout or session errors, in the order they happened.
    pub errors: Vec<String>,
}

impl GroupReport {
    pub fn new(kind: EventKind, received: usize) -> Self {
        Self {
            kind,
            received,
            persisted: 0,
            dropped: 0,
            errors: Vec::new(),
        }
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        self.errors.push(error.to_string());
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What happened to a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub received: usize,
    /// Messages whose envelope could not be decoded.
    pub undecodable: usize,
    /// One entry per non-empty kind-group, in kind order.
    pub groups: Vec<GroupReport>,
}

impl BatchReport {
    pub fn group(&self, kind: EventKind) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    pub fn persisted(&self) -> usize {
        self.groups.iter().map(|g| g.persisted).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.undecodable == 0 && self.groups.iter().all(|g| g.is_ok() && g.dropped == 0)
    }

    /// One line per failed group, for logging.
    pub fn error_summary(&self) -> Option<String> {
        let lines: Vec<String> = self
            .groups
            .iter()
            .filter(|g| !g.is_ok())
            .map(|g| format!("{}: {}", g.kind, g.errors.join("; ")))
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "received {} message(s), {} undecodable",
            self.received, self.undecodable
        )?;
        for group in &self.groups {
            write!(
                f,
                "  {:<18} received {:>4}  persisted {:>4}  dropped {:>4}",
                group.kind.as_str(),
                group.received,
                group.persisted,
                group.dropped
            )?;
            if !group.is_ok() {
                write!(f, "  errors: {}", group.errors.join("; "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_summary_lists_failed_groups_only() {
        let mut failed = GroupReport::new(EventKind::TeacherBehavior, 2);
        failed.fail("database error: disk full");
        let mut ok = GroupReport::new(EventKind::StudentBehavior, 3);
        ok.persisted = 3;

        let report = BatchReport {
            received: 5,
            undecodable: 0,
            groups: vec![failed, ok],
        };

        assert_eq!(
            report.error_summary().as_deref(),
            Some("teacher_behavior: database error: disk full")
        );
        assert_eq!(report.persisted(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn empty_report_is_clean() {
        let report = BatchReport::default();
        assert!(report.is_clean());
        assert!(report.error_summary().is_none());
        assert!(report.group(EventKind::Communication).is_none());
    }

    #[test]
    fn display_includes_each_group() {
        let report = BatchReport {
            received: 1,
            undecodable: 0,
            groups: vec![GroupReport::new(EventKind::Communication, 1)],
        };
        let text = report.to_string();
        assert!(text.contains("received 1 message(s)"));
        assert!(text.contains("communication"));
    }
}
