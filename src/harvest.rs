//! Run orchestration: login, the course/folder walk, the replay pass and
//! the end-of-run report.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::config::AppConfig;
use crate::credentials::LoginInfo;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::reconcile::Reconciler;
use crate::sanitize::path_segment;
use crate::session::{Session, SessionGate, wait};
use crate::snapshot::{DirectorySnapshot, diff, snapshot};
use crate::stats::{HarvestStats, HarvestStatsBuilder};
use crate::walker::NavigationWalker;

/// Trait for receiving progress updates during a run.
///
/// Implement this trait to display progress in your UI.
pub trait HarvestProgress: Send + Sync {
    /// Called when a course is entered. `index` starts at 0.
    fn on_course_start(&self, _name: &str, _index: usize, _total: usize) {}

    /// Called before a folder is visited, including replays.
    fn on_folder_start(&self, _course: &str, _folder: &str) {}

    /// Called when a downloaded file has been moved to its destination.
    fn on_file_relocated(&self, _name: &str, _destination: &std::path::Path) {}

    /// Called when a nested subfolder is queued for the replay pass.
    fn on_deferred(&self, _url: &str, _destination: &std::path::Path) {}

    /// Called once before the replay pass starts.
    fn on_replay_start(&self, _count: usize) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl HarvestProgress for NoProgress {}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct HarvestReport {
    /// Root of the mirrored course tree.
    pub run_dir: PathBuf,
    pub stats: HarvestStats,
    pub diagnostics: Diagnostics,
    /// Local time the run started.
    pub started: DateTime<Local>,
}

/// Drives one portal session through a full harvest.
pub struct Harvester<S: Session, F: FileSystem> {
    session: S,
    fs: F,
    config: AppConfig,
    progress: Arc<dyn HarvestProgress>,
}

impl<S: Session, F: FileSystem> Harvester<S, F> {
    /// Creates a harvester that owns `session` until [`close`](Self::close).
    pub fn new(session: S, fs: F, config: AppConfig) -> Self {
        Self {
            session,
            fs,
            config,
            progress: Arc::new(NoProgress),
        }
    }

    /// Sets the progress receiver.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn HarvestProgress>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Ends the browser session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be closed cleanly.
    pub async fn close(&self) -> Result<()> {
        log::info!("Closing the browser session");
        self.session.close().await
    }

    /// Runs a full harvest with the given login info.
    ///
    /// Non-fatal problems are collected in the report's diagnostics; only
    /// precondition and login failures end the run early.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if the output root is not a directory,
    /// [`Error::AuthFailed`] if login fails, or an error if the login page or
    /// run directory cannot be set up.
    pub async fn run(&self, info: &LoginInfo) -> Result<HarvestReport> {
        let started = Local::now();
        let mut stats = HarvestStatsBuilder::new();
        let shared = &self.config.paths.output_root;
        let portal = &self.config.portal;
        let settle = self.config.harvest.settle_wait();

        if !self.fs.is_dir(shared).await {
            return Err(Error::Precondition(format!(
                "output directory {} does not exist",
                shared.display()
            )));
        }

        log::info!("Opening {}", portal.login_url);
        self.session.navigate_to(&portal.login_url).await?;
        wait(settle).await;
        let auth = SessionGate::new(&self.session, portal, settle)
            .login(info)
            .await?;

        let run_dir = shared.join(format!(
            "{}{}",
            self.config.harvest.run_dir_prefix,
            path_segment(&info.username, "user")
        ));
        self.fs.create_dir_all(&run_dir).await?;
        log::info!("Saving documents under {}", run_dir.display());

        let run_before = snapshot(&self.fs, shared).await?;
        let mut reconciler = Reconciler::new(&self.session, &self.fs, &self.config, run_dir.clone())?
            .with_progress(Arc::clone(&self.progress));
        let walker = NavigationWalker::new(&self.session, portal, settle);

        let courses = match walker.list_courses(&auth).await {
            Ok(courses) => courses,
            Err(e) => {
                reconciler
                    .diagnostics_mut()
                    .note(format!("Could not list the courses on the home page: {e}"));
                Vec::new()
            }
        };
        stats.set_courses(courses.len());

        for (index, course) in courses.iter().enumerate() {
            log::info!("Course {}/{}: {}", index + 1, courses.len(), course.name);
            self.progress.on_course_start(&course.name, index, courses.len());

            let folders = match walker.list_folders(course).await {
                Ok(folders) => folders,
                Err(e) => {
                    reconciler.diagnostics_mut().note(format!(
                        "Could not list the folders of {}: {e}; please download its documents by yourself",
                        course.name
                    ));
                    continue;
                }
            };
            for folder in &folders {
                self.progress.on_folder_start(&course.name, &folder.label);
                let outcome = reconciler.visit_folder(folder, &course.name).await;
                stats.add_visit(&outcome);
            }
        }

        let deferred = reconciler.take_deferred();
        if !deferred.is_empty() {
            log::info!("Visiting {} nested folder(s)", deferred.len());
            self.progress.on_replay_start(deferred.len());
        }
        for visit in &deferred {
            self.progress
                .on_folder_start(&visit.course_name, &visit.destination.display().to_string());
            let outcome = reconciler.replay(visit).await;
            stats.add_replay(&outcome);
        }
        debug_assert_eq!(reconciler.pending_deferred(), 0);

        let late = reconciler.finish_late_downloads().await;
        stats.add_files(&late);

        let mut diagnostics = reconciler.into_diagnostics();
        if self.config.harvest.remove_stray_downloads {
            let removed = self.remove_strays(&run_before, &mut diagnostics).await;
            stats.set_strays_removed(removed);
        }

        Ok(HarvestReport {
            run_dir,
            stats: stats.build(),
            diagnostics,
            started,
        })
    }

    /// Deletes files that appeared in the shared directory during the run
    /// and were never relocated. Returns how many were removed.
    async fn remove_strays(&self, run_before: &DirectorySnapshot, diagnostics: &mut Diagnostics) -> usize {
        let after = match snapshot(&self.fs, run_before.path()).await {
            Ok(after) => after,
            Err(e) => {
                diagnostics.note(format!("Could not look for stray downloads: {e}"));
                return 0;
            }
        };

        let strays = diff(run_before, &after);
        let mut removed = 0;
        for file in strays.files() {
            let path = strays.path_of(file);
            match self.fs.remove_file(&path).await {
                Ok(()) => {
                    log::info!("Removed stray download {}", path.display());
                    removed += 1;
                }
                Err(e) => diagnostics.note(format!(
                    "Could not remove stray download {}: {e}",
                    path.display()
                )),
            }
        }
        removed
    }
}
