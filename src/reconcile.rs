//! Per-folder link activation and relocation of the files it produced.
//!
//! A folder visit takes a snapshot of the shared download directory,
//! opens the folder page and activates every content link on it, then takes
//! a second snapshot. Whatever appeared in between belongs to this folder
//! and is moved into `<run dir>/<course>/<folder>`. Links that lead to
//! another portal page are nested subfolders; they are queued for the
//! replay pass instead of being descended into.
//!
//! Element handles are re-acquired by query before every link, because
//! each activation may navigate and invalidate them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{AppConfig, LinkFilter};
use crate::deferred::{DeferredQueue, DeferredVisit, MAX_DEFERRAL_DEPTH};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::harvest::{HarvestProgress, NoProgress};
use crate::sanitize::{normalize_ws, path_segment};
use crate::session::{PageElement, Session, wait};
use crate::snapshot::{DirectorySnapshot, NewFile, NewFiles, diff, snapshot};
use crate::walker::FolderEntry;

/// Result of visiting one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    /// The visit produced no files; no directory was created.
    NoChange,
    /// New files were moved into the folder's destination.
    Relocated {
        /// Final paths of the moved files.
        moved: Vec<PathBuf>,
        /// Total size of the moved files.
        bytes: u64,
        /// Files that could not be moved.
        failed: usize,
    },
    /// The folder page or its content listing could not be reached.
    Unreachable,
    /// The shared download directory could not be read.
    SnapshotFailed,
}

/// One folder to visit, from the main walk or the replay pass.
struct Target<'t> {
    course: &'t str,
    url: &'t str,
    /// Destination relative to the course directory.
    destination: PathBuf,
    depth: usize,
}

impl Target<'_> {
    fn describe(&self) -> String {
        format!("folder {} of {}", self.destination.display(), self.course)
    }
}

/// A download that was still being written when its folder was done.
struct LateDownload {
    destination: PathBuf,
    origin: String,
}

#[derive(Default)]
struct Tally {
    moved: Vec<PathBuf>,
    bytes: u64,
    failed: usize,
}

impl Tally {
    fn into_outcome(self) -> VisitOutcome {
        if self.moved.is_empty() && self.failed == 0 {
            return VisitOutcome::NoChange;
        }
        VisitOutcome::Relocated {
            moved: self.moved,
            bytes: self.bytes,
            failed: self.failed,
        }
    }
}

enum LinkSlot<E> {
    Link(E),
    EndOfSection,
    EndOfPage,
}

/// Visits folders and relocates the downloads they produce.
///
/// Owns the diagnostics and the deferred queue of a run. Downloads that
/// outlast their folder visit are remembered under their finished name and
/// moved into that folder's destination once they complete, never into a
/// later folder.
pub struct Reconciler<'a, S: Session, F: FileSystem> {
    session: &'a S,
    fs: &'a F,
    config: &'a AppConfig,
    links: LinkFilter,
    run_dir: PathBuf,
    progress: Arc<dyn HarvestProgress>,
    diagnostics: Diagnostics,
    deferred: DeferredQueue,
    late: BTreeMap<String, LateDownload>,
}

impl<'a, S: Session, F: FileSystem> Reconciler<'a, S, F> {
    /// Creates a reconciler writing into `run_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured link policy does not compile.
    pub fn new(
        session: &'a S,
        fs: &'a F,
        config: &'a AppConfig,
        run_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            session,
            fs,
            config,
            links: config.harvest.link_policy.compile()?,
            run_dir: run_dir.into(),
            progress: Arc::new(NoProgress),
            diagnostics: Diagnostics::new(),
            deferred: DeferredQueue::new(),
            late: BTreeMap::new(),
        })
    }

    /// Sets the progress receiver.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn HarvestProgress>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub const fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Consumes the reconciler, returning the collected diagnostics.
    #[must_use]
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Number of visits waiting for the replay pass.
    #[must_use]
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Takes every deferred visit queued so far.
    pub fn take_deferred(&mut self) -> Vec<DeferredVisit> {
        self.deferred.drain_all()
    }

    /// Visits a folder of the main walk.
    pub async fn visit_folder(&mut self, folder: &FolderEntry, course_name: &str) -> VisitOutcome {
        let target = Target {
            course: course_name,
            url: &folder.target_url,
            destination: PathBuf::from(&folder.label),
            depth: folder.depth,
        };
        self.visit(&target).await
    }

    /// Replays a deferred subfolder visit into its recorded destination.
    pub async fn replay(&mut self, visit: &DeferredVisit) -> VisitOutcome {
        let target = Target {
            course: &visit.course_name,
            url: &visit.target_url,
            destination: visit.destination.clone(),
            depth: MAX_DEFERRAL_DEPTH,
        };
        self.visit(&target).await
    }

    async fn visit(&mut self, target: &Target<'_>) -> VisitOutcome {
        log::info!("Visiting {}", target.describe());
        let shared = self.config.paths.output_root.as_path();

        let before = match snapshot(self.fs, shared).await {
            Ok(before) => before,
            Err(e) => {
                self.diagnostics.note(format!(
                    "Could not read the download folder before visiting {}: {e}",
                    target.describe()
                ));
                return VisitOutcome::SnapshotFailed;
            }
        };

        let page_url = match self.open(target).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                self.diagnostics.note(format!(
                    "No content listing found for {}; please download its documents by yourself",
                    target.describe()
                ));
                return VisitOutcome::Unreachable;
            }
            Err(e) => {
                self.diagnostics
                    .note(format!("Could not open {}: {e}", target.describe()));
                return VisitOutcome::Unreachable;
            }
        };

        self.follow_links(target, &page_url).await;
        wait(self.config.harvest.settle_wait()).await;

        match self.await_downloads(&before).await {
            Ok(new_files) => self.relocate(target, new_files).await,
            Err(e) => {
                self.diagnostics.note(format!(
                    "Could not read the download folder after visiting {}: {e}",
                    target.describe()
                ));
                VisitOutcome::SnapshotFailed
            }
        }
    }

    /// Opens the folder page. Returns its URL, or `None` without a content listing.
    async fn open(&self, target: &Target<'_>) -> Result<Option<String>> {
        self.session.navigate_to(target.url).await?;
        wait(self.config.harvest.settle_wait()).await;
        if self
            .session
            .find_one(&self.config.portal.content_container)
            .await?
            .is_none()
        {
            return Ok(None);
        }
        Ok(Some(self.session.current_url().await?))
    }

    async fn follow_links(&mut self, target: &Target<'_>, page_url: &str) {
        let mut section_index = 0;
        'sections: loop {
            let mut link_index = 0;
            loop {
                let link = match self.link_at(section_index, link_index).await {
                    Ok(LinkSlot::Link(link)) => link,
                    Ok(LinkSlot::EndOfSection) => break,
                    Ok(LinkSlot::EndOfPage) => break 'sections,
                    Err(e) => {
                        self.diagnostics.note(format!(
                            "Could not read the links of {}: {e}; please download the rest of its documents by yourself",
                            target.describe()
                        ));
                        break 'sections;
                    }
                };

                if let Err(e) = self.follow_link(&link, target).await {
                    self.diagnostics.note(format!(
                        "Could not follow link {} of section {} in {}: {e}",
                        link_index + 1,
                        section_index + 1,
                        target.describe()
                    ));
                    self.recover(page_url).await;
                }
                link_index += 1;
            }
            section_index += 1;
        }
    }

    /// Re-queries the page for the link at the given position.
    async fn link_at(&self, section_index: usize, link_index: usize) -> Result<LinkSlot<S::Element>> {
        let portal = &self.config.portal;
        let sections = self.session.find_all(&portal.content_sections).await?;
        let Some(section) = sections.into_iter().nth(section_index) else {
            return Ok(LinkSlot::EndOfPage);
        };
        Ok(section
            .find_all(&portal.section_links)
            .await?
            .into_iter()
            .nth(link_index)
            .map_or(LinkSlot::EndOfSection, LinkSlot::Link))
    }

    async fn follow_link(&mut self, link: &S::Element, target: &Target<'_>) -> Result<()> {
        let text = normalize_ws(&link.text().await?);
        if !self.links.should_follow(&text) {
            log::debug!("Skipping link {text}");
            return Ok(());
        }

        let before = self.session.current_url().await?;
        log::debug!("Following link {text}");
        link.click().await?;
        wait(self.config.harvest.settle_wait()).await;

        if !self.listing_present().await? {
            // Document viewer or download page
            log::debug!("{text} left the content listing, going back");
            self.session.go_back().await?;
            wait(self.config.harvest.back_wait()).await;
            return Ok(());
        }

        let after = self.session.current_url().await?;
        if !self.config.portal.is_portal_url(&after) {
            log::debug!("{text} led off the portal to {after}, going back");
            self.session.go_back().await?;
            wait(self.config.harvest.settle_wait()).await;
            return Ok(());
        }

        if after != before {
            let title = self.page_title().await?.unwrap_or_else(|| text.clone());
            let destination = target.destination.join(path_segment(&title, "subfolder"));
            self.defer(target, after, destination);
            self.session.go_back().await?;
            wait(self.config.harvest.settle_wait()).await;
        }
        Ok(())
    }

    fn defer(&mut self, target: &Target<'_>, url: String, destination: PathBuf) {
        if target.depth < MAX_DEFERRAL_DEPTH {
            self.progress.on_deferred(&url, &destination);
            self.deferred.enqueue(DeferredVisit {
                target_url: url,
                destination,
                course_name: target.course.to_string(),
            });
        } else {
            let path = self.run_dir.join(target.course).join(&destination);
            self.diagnostics.note(format!(
                "The content under link {url} could not be visited because the depth was too great"
            ));
            self.diagnostics.note(format!(
                "Please download all documents from this link and store them at {}",
                path.display()
            ));
        }
    }

    /// Checks for the content container, dismissing one blocking dialog.
    async fn listing_present(&self) -> Result<bool> {
        let container = &self.config.portal.content_container;
        match self.session.find_one(container).await {
            Ok(found) => Ok(found.is_some()),
            Err(Error::DialogOpen) => {
                log::debug!("Dismissing unexpected dialog");
                self.session.dismiss_dialog().await?;
                Ok(self.session.find_one(container).await?.is_some())
            }
            Err(e) => Err(e),
        }
    }

    async fn page_title(&self) -> Result<Option<String>> {
        let Some(title) = self.session.find_one(&self.config.portal.page_title).await? else {
            return Ok(None);
        };
        let text = normalize_ws(&title.text().await?);
        Ok((!text.is_empty()).then_some(text))
    }

    /// Returns to the folder page after a failed link.
    async fn recover(&self, page_url: &str) {
        let _ = self.session.dismiss_dialog().await;
        match self.session.current_url().await {
            Ok(url) if url == page_url => return,
            _ => {}
        }
        if let Err(e) = self.session.navigate_to(page_url).await {
            log::error!("Could not return to {page_url}: {e}");
            return;
        }
        wait(self.config.harvest.settle_wait()).await;
    }

    /// Takes the after-snapshot, waiting out downloads that are still being written.
    async fn await_downloads(&self, before: &DirectorySnapshot) -> Result<NewFiles> {
        let harvest = &self.config.harvest;
        let mut rounds = 0;
        loop {
            let after = snapshot(self.fs, before.path()).await?;
            let new_files = diff(before, &after);
            let pending = new_files
                .files()
                .iter()
                .filter(|f| harvest.is_in_progress(f.name()))
                .count();
            if pending == 0 || rounds >= harvest.download_settle_rounds {
                return Ok(new_files);
            }
            rounds += 1;
            log::info!("Waiting for {pending} download(s) to finish");
            wait(harvest.settle_wait()).await;
        }
    }

    async fn relocate(&mut self, target: &Target<'_>, mut new_files: NewFiles) -> VisitOutcome {
        let config = self.config;
        let unfinished = new_files.split_off_where(|f| config.harvest.is_in_progress(f.name()));
        for file in &unfinished {
            self.track_late(target, file, new_files.dir()).await;
        }

        let mut tally = Tally::default();
        let finished_late = new_files.split_off_where(|f| self.late.contains_key(f.name()));
        for file in &finished_late {
            if let Some(late) = self.late.remove(file.name()) {
                log::info!("{} finished after {} was done", file.name(), late.origin);
                self.move_files(new_files.dir(), std::slice::from_ref(file), &late.destination, &mut tally)
                    .await;
            }
        }

        if new_files.is_empty() {
            log::debug!("Nothing new for {}", target.describe());
            return tally.into_outcome();
        }

        let destination = self.destination(target);
        self.move_files(new_files.dir(), new_files.files(), &destination, &mut tally)
            .await;
        tally.into_outcome()
    }

    /// Remembers an unfinished download so it follows its own folder later.
    async fn track_late(&mut self, target: &Target<'_>, file: &NewFile, dir: &Path) {
        let Some(finished) = self.config.harvest.finished_name(file.name()) else {
            return;
        };
        if self.late.contains_key(finished) {
            return;
        }
        if self.fs.exists(&dir.join(finished)).await {
            self.diagnostics.note(format!(
                "Download {} for {} did not finish in time and was left in {}",
                file.name(),
                target.describe(),
                dir.display()
            ));
            return;
        }

        let destination = self.destination(target);
        self.diagnostics.note(format!(
            "Download {} for {} did not finish in time; it will be moved to {} if it completes during the run",
            file.name(),
            target.describe(),
            destination.display()
        ));
        self.late.insert(
            finished.to_string(),
            LateDownload {
                destination,
                origin: target.describe(),
            },
        );
    }

    /// Moves downloads that completed after their folder was done and notes
    /// the ones that never did. Call once, after the replay pass.
    pub async fn finish_late_downloads(&mut self) -> VisitOutcome {
        if self.late.is_empty() {
            return VisitOutcome::NoChange;
        }

        let config = self.config;
        let shared = config.paths.output_root.as_path();
        let mut tally = Tally::default();
        match snapshot(self.fs, shared).await {
            Ok(now) => {
                let present = diff(&DirectorySnapshot::from_entries(shared, Vec::new()), &now);
                for file in present.files() {
                    if let Some(late) = self.late.remove(file.name()) {
                        self.move_files(present.dir(), std::slice::from_ref(file), &late.destination, &mut tally)
                            .await;
                    }
                }
            }
            Err(e) => self
                .diagnostics
                .note(format!("Could not look for downloads that finished late: {e}")),
        }

        for (name, late) in std::mem::take(&mut self.late) {
            self.diagnostics.note(format!(
                "Download {name} for {} never finished; please download it by yourself",
                late.origin
            ));
        }
        tally.into_outcome()
    }

    /// Moves `files` from `dir` into `destination`, never overwriting.
    async fn move_files(&mut self, dir: &Path, files: &[NewFile], destination: &Path, tally: &mut Tally) {
        if let Err(e) = self.fs.create_dir_all(destination).await {
            self.diagnostics
                .note(format!("Could not create {}: {e}", destination.display()));
            tally.failed += files.len();
            return;
        }

        for file in files {
            let from = dir.join(file.name());
            let to = destination.join(file.name());
            if self.fs.exists(&to).await {
                self.diagnostics.note(format!(
                    "{} already exists; {} was left in the download folder",
                    to.display(),
                    file.name()
                ));
                tally.failed += 1;
                continue;
            }
            match self.fs.rename(&from, &to).await {
                Ok(()) => {
                    log::info!("{} was downloaded to {}", file.name(), destination.display());
                    self.progress.on_file_relocated(file.name(), destination);
                    tally.bytes += file.size;
                    tally.moved.push(to);
                }
                Err(e) => {
                    self.diagnostics.note(format!(
                        "Could not move {} into {}: {e}",
                        file.name(),
                        destination.display()
                    ));
                    tally.failed += 1;
                }
            }
        }
    }

    fn destination(&self, target: &Target<'_>) -> PathBuf {
        self.run_dir.join(target.course).join(&target.destination)
    }

    /// Returns the run directory files are relocated into.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}
