//! Login info: username, password and the wait scale for settle periods.
//!
//! The login info file holds three lines:
//!
//! ```text
//! username
//! password
//! number 1-5
//! ```
//!
//! The third line is the number of seconds to wait for a page or download
//! to settle. After a successful read the file is put back to the template
//! above so the password does not stay on disk.

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Template written back over the login info file after reading it.
pub const LOGIN_INFO_TEMPLATE: &str = "username\npassword\nnumber 1-5";

/// Environment variables that take precedence over the login info file.
pub const ENV_USERNAME: &str = "COURSE_DL_USERNAME";
pub const ENV_PASSWORD: &str = "COURSE_DL_PASSWORD";
pub const ENV_WAIT: &str = "COURSE_DL_WAIT";

const WAIT_SCALE_RANGE: std::ops::RangeInclusive<u64> = 1..=5;

/// Credentials plus the wait scale supplied once before a run.
#[derive(Clone)]
pub struct LoginInfo {
    pub username: String,
    password: String,
    wait_scale: u64,
}

impl std::fmt::Debug for LoginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInfo")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("wait_scale", &self.wait_scale)
            .finish()
    }
}

impl LoginInfo {
    /// Validates and builds login info.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] for an empty username or password,
    /// the untouched template, or a wait scale outside 1-5.
    pub fn new(username: &str, password: &str, wait_scale: u64) -> Result<Self> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(Error::Precondition(
                "username and password must not be empty".into(),
            ));
        }
        if username == "username" && password == "password" {
            return Err(Error::Precondition(
                "login info still holds the template values".into(),
            ));
        }
        if !WAIT_SCALE_RANGE.contains(&wait_scale) {
            return Err(Error::Precondition(format!(
                "wait scale must be a number from 1 to 5, got {wait_scale}"
            )));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            wait_scale,
        })
    }

    /// Parses the three-line login info format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if a line is missing or invalid.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents.lines();
        let mut next = |what: &str| {
            lines
                .next()
                .ok_or_else(|| Error::Precondition(format!("login info is missing the {what} line")))
        };
        let username = next("username")?;
        let password = next("password")?.trim_end_matches('\r');
        let wait = next("wait scale")?.trim();
        let wait_scale = wait.parse::<u64>().map_err(|_| {
            Error::Precondition(format!("wait scale must be a number from 1 to 5, got `{wait}`"))
        })?;
        Self::new(username, password, wait_scale)
    }

    /// Reads login info from a file, optionally scrubbing it afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if the file is missing or malformed,
    /// or an I/O error if scrubbing fails.
    pub fn from_file(path: &Path, scrub: bool) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Precondition(format!("cannot read login info {}: {e}", path.display()))
        })?;
        let info = Self::parse(&contents)?;
        if scrub {
            std::fs::write(path, LOGIN_INFO_TEMPLATE)?;
            log::debug!("Restored login info template at {}", path.display());
        }
        Ok(info)
    }

    /// Reads login info from the environment when all three variables are set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if the variables are set but invalid.
    pub fn from_env() -> Result<Option<Self>> {
        let (Ok(username), Ok(password), Ok(wait)) = (
            std::env::var(ENV_USERNAME),
            std::env::var(ENV_PASSWORD),
            std::env::var(ENV_WAIT),
        ) else {
            return Ok(None);
        };
        let wait_scale = wait.trim().parse::<u64>().map_err(|_| {
            Error::Precondition(format!("{ENV_WAIT} must be a number from 1 to 5"))
        })?;
        Self::new(&username, &password, wait_scale).map(Some)
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub const fn wait_scale(&self) -> u64 {
        self.wait_scale
    }

    /// Settle wait derived from the wait scale.
    #[must_use]
    pub const fn settle_wait(&self) -> Duration {
        Duration::from_secs(self.wait_scale)
    }
}
