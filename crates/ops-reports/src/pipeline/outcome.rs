use std::fmt;

/// Result of one pipeline stage. Failures are terminal for the stage only,
/// so callers branch on this instead of propagating an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Data(T),
    Empty,
    Failed(String),
}

impl<T> StageOutcome<T> {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Empty | Self::Failed(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageOutcome<U> {
        match self {
            Self::Data(value) => StageOutcome::Data(f(value)),
            Self::Empty => StageOutcome::Empty,
            Self::Failed(reason) => StageOutcome::Failed(reason),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Empty => "empty",
            Self::Failed(_) => "failed",
        }
    }
}

impl<T> StageOutcome<Vec<T>> {
    /// Collapses failures and empty results into "no rows from this stage".
    pub fn into_rows(self) -> Vec<T> {
        match self {
            Self::Data(rows) => rows,
            Self::Empty | Self::Failed(_) => Vec::new(),
        }
    }

    pub fn from_rows(rows: Vec<T>) -> Self {
        if rows.is_empty() {
            Self::Empty
        } else {
            Self::Data(rows)
        }
    }
}
