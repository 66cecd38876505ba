//! course-dl - mirrors the documents of a course portal into a local tree.
//!
//! A browser session logs into the portal, walks every course and every
//! folder of its navigation menu, and activates each content link. The
//! browser saves files into one shared download directory; after each
//! folder, the files that appeared there are moved into
//! `<run dir>/<course>/<folder>/`. Nested subfolders are visited in a second
//! pass, and anything that could not be handled is listed at the end.
//!
//! # Example
//!
//! ```no_run
//! use course_dl::{AppConfig, Harvester, LoginInfo, TokioFileSystem};
//! use course_dl::webdriver::WebDriverSession;
//!
//! # async fn example() -> course_dl::Result<()> {
//! let config = AppConfig::load(None)?;
//! let info = LoginInfo::new("user", "password", 3)?;
//! let session = WebDriverSession::connect(&config.browser, &config.paths.output_root).await?;
//!
//! let harvester = Harvester::new(session, TokioFileSystem::new(), config);
//! let report = harvester.run(&info).await;
//! harvester.close().await?;
//!
//! let report = report?;
//! println!("Saved {} files", report.stats.files_relocated);
//! print!("{}", report.diagnostics);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod credentials;
pub mod deferred;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod fs;
pub mod harvest;
pub mod reconcile;
pub mod sanitize;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod walker;
#[cfg(feature = "webdriver")]
pub mod webdriver;

#[cfg(test)]
mod fake;

// Re-export main types for convenience
pub use config::{AppConfig, BrowserConfig, HarvestConfig, LinkPolicy, PathConfig, PortalConfig};
pub use credentials::LoginInfo;
pub use deferred::{DeferredQueue, DeferredVisit, MAX_DEFERRAL_DEPTH};
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration};
pub use fs::{FileSystem, TokioFileSystem};
pub use harvest::{HarvestProgress, HarvestReport, Harvester, NoProgress};
pub use reconcile::{Reconciler, VisitOutcome};
pub use session::{Authenticated, PageElement, Selector, Session, SessionGate};
pub use snapshot::{DirectorySnapshot, NewFiles, diff, snapshot};
pub use stats::{HarvestStats, HarvestStatsBuilder};
pub use walker::{CourseLink, FolderEntry, NavigationWalker};
