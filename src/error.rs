//! Error types for the course-dl library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while harvesting a portal.
#[derive(Error, Debug)]
pub enum Error {
    /// Input that must be valid before any navigation (login info, output
    /// root, configuration) was not.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The portal rejected the credentials, or the outcome was ambiguous.
    #[error("Login failed: {0}")]
    AuthFailed(String),

    /// An element could not be found or a page could not be reached.
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// A modal dialog is blocking the page.
    #[error("Unexpected dialog open")]
    DialogOpen,

    /// An element handle outlived the page it was found on.
    #[error("Stale element reference")]
    StaleElement,

    /// The path given for a snapshot is not a directory.
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// A link filter pattern could not be compiled.
    #[error("Invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The browser session could not be opened.
    #[error("Browser session error: {0}")]
    Browser(String),

    /// Error reported by the WebDriver server.
    #[cfg(feature = "webdriver")]
    #[error("WebDriver error: {0}")]
    WebDriver(fantoccini::error::CmdError),
}

impl Error {
    /// Returns true for errors that end the run instead of becoming a
    /// diagnostic note.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_)
                | Self::AuthFailed(_)
                | Self::Config(_)
                | Self::Pattern(_)
                | Self::Browser(_)
        )
    }
}

/// A specialized `Result` type for course-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
