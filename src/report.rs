use std::fmt;

use log::warn;

use crate::error::ArchiveError;

/// Outcome of a whole-archive operation, entry by entry.
///
/// Each outcome is keyed by the position of the item it describes: the index
/// of the entry in the central directory when extracting, the index of the
/// source when creating. Two entries with the same name stay distinct.
///
/// A report with at least one failure means the operation only partly
/// succeeded; a command line front end would exit with a failure status.
#[derive(Debug, Default)]
pub struct TaskReport {
    succeeded: Vec<(usize, String)>,
    failed: Vec<(usize, String, ArchiveError)>,
}

impl TaskReport {
    pub fn record_success(&mut self, index: usize, name: &str) {
        self.succeeded.push((index, name.to_owned()));
    }

    /// Record `error` against item `index`, withdrawing an earlier success for it.
    pub fn record_failure(&mut self, index: usize, name: &str, error: ArchiveError) {
        warn!("{}: {}", name, error);
        self.succeeded.retain(|(succeeded, _)| *succeeded != index);
        self.failed.push((index, name.to_owned(), error));
    }

    pub fn merge(&mut self, other: TaskReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.succeeded.iter().map(|(_, name)| name.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ArchiveError)> {
        self.failed
            .iter()
            .map(|(_, name, error)| (name.as_str(), error))
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// The first error recorded under `name`, if any.
    pub fn failure_of(&self, name: &str) -> Option<&ArchiveError> {
        self.failed()
            .find(|(failed, _)| *failed == name)
            .map(|(_, error)| error)
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.success_count(),
            self.failure_count()
        )?;
        for (name, error) in self.failed() {
            write!(f, "\n  {}: {}", name, error)?;
        }
        Ok(())
    }
}
