//! Non-fatal problems collected during a run and reported at the end.

use std::fmt;

/// Banner printed above the collected notes.
pub const BANNER: &str = "*********** Errors ***********";

/// Append-only, ordered list of human-readable notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    notes: Vec<String>,
}

impl Diagnostics {
    #[must_use]
    pub const fn new() -> Self {
        Self { notes: Vec::new() }
    }

    /// Appends a note. Notes are never deduplicated or removed.
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.notes.push(message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.notes.iter().map(String::as_str)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{BANNER}")?;
        if self.notes.is_empty() {
            return writeln!(f, "None");
        }
        for note in &self.notes {
            writeln!(f, "{note}")?;
        }
        Ok(())
    }
}
