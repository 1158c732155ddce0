//! Error types for Critic core.

use std::{error::Error, fmt, io};

/// Error type for Critic core operations.
#[derive(Debug)]
pub enum CriticError {
    /// An underlying I/O error.
    Io(io::Error),
    /// Invalid or missing configuration, detected before the tree is touched.
    Config(String),
    /// The working tree could not be switched to a branch.
    Switch(String),
    /// A single module could not be analysed.
    Analysis(String),
    /// Report rendering or writing failed.
    Report(String),
    /// Posting a note to the review system failed.
    Notification(String),
    /// The build counter could not be read or written.
    Workspace(String),
    /// A catch-all error with a message.
    Other(String),
}

impl CriticError {
    /// Whether this error must abort a comparison run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Analysis(_) | Self::Notification(_) | Self::Workspace(_)
        )
    }
}

impl fmt::Display for CriticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Config(message) => write!(f, "configuration error: {message}"),
            Self::Switch(message) => write!(f, "branch switch failed: {message}"),
            Self::Analysis(message) => write!(f, "analysis failed: {message}"),
            Self::Report(message) => write!(f, "report failed: {message}"),
            Self::Notification(message) => write!(f, "notification failed: {message}"),
            Self::Workspace(message) => write!(f, "workspace error: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CriticError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CriticError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CriticError {
    fn from(value: serde_json::Error) -> Self {
        Self::Report(value.to_string())
    }
}

/// Convenience result type for Critic core.
pub type Result<T> = std::result::Result<T, CriticError>;
