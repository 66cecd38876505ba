//! Enumeration of courses and the folders inside each course.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::PortalConfig;
use crate::error::Result;
use crate::sanitize::{first_line, path_segment};
use crate::session::{Authenticated, PageElement, Session, wait};

/// A course on the portal's home page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseLink {
    /// Path-safe course name, unique within a run.
    pub name: String,
    pub target_url: String,
}

/// A left-navigation entry of a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Path-safe label, used as the destination directory name.
    pub label: String,
    pub target_url: String,
    pub depth: usize,
}

/// Drops the landing entry (index 0, the announcements page) of a folder list.
#[must_use]
pub fn skip_landing<T>(entries: Vec<T>) -> Vec<T> {
    entries.into_iter().skip(1).collect()
}

/// Walks the course → folder levels of the navigation tree.
///
/// Every listing is returned as owned strings; no element handle outlives
/// the call that found it.
pub struct NavigationWalker<'a, S: Session> {
    session: &'a S,
    portal: &'a PortalConfig,
    settle: Duration,
}

impl<'a, S: Session> NavigationWalker<'a, S> {
    #[must_use]
    pub const fn new(session: &'a S, portal: &'a PortalConfig, settle: Duration) -> Self {
        Self {
            session,
            portal,
            settle,
        }
    }

    /// Lists the courses on the home page, in page order.
    ///
    /// # Errors
    ///
    /// Returns an error if the home page cannot be loaded or queried.
    pub async fn list_courses(&self, _auth: &Authenticated) -> Result<Vec<CourseLink>> {
        self.session.navigate_to(&self.portal.home_url).await?;
        wait(self.settle).await;
        self.enter_content_frame().await?;

        let items = self.session.find_all(&self.portal.course_list).await?;
        let base = self.session.current_url().await?;
        let mut seen = HashMap::new();
        let mut courses = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            match self.read_course(item, index).await {
                Ok(Some((name, href))) => courses.push(CourseLink {
                    name: unique_name(name, &mut seen),
                    target_url: PortalConfig::resolve(&base, &href),
                }),
                Ok(None) => {}
                Err(e) => log::warn!("Could not read course {}, skipping: {e}", index + 1),
            }
        }

        log::info!("Found {} course(s)", courses.len());
        Ok(courses)
    }

    /// Lists the visitable folders of a course, skipping the landing entry.
    ///
    /// A course page without a folder menu has no visitable folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the course page cannot be loaded or queried.
    pub async fn list_folders(&self, course: &CourseLink) -> Result<Vec<FolderEntry>> {
        self.session.navigate_to(&course.target_url).await?;
        wait(self.settle).await;
        self.enter_content_frame().await?;

        let Some(menu) = self.session.find_one(&self.portal.folder_menu).await? else {
            log::info!("Course {} has no folder menu", course.name);
            return Ok(Vec::new());
        };
        let base = self.session.current_url().await?;
        let links = menu.find_all(&self.portal.folder_links).await?;

        let mut entries = Vec::with_capacity(links.len());
        let mut seen = HashMap::new();
        for (index, link) in links.iter().enumerate() {
            let fallback = format!("folder_{index}");
            // Unreadable entries keep their slot so the landing entry stays at index 0
            let (label, href) = match read_folder(link).await {
                Ok((text, href)) => (path_segment(&text, &fallback), href),
                Err(e) => {
                    log::warn!("Could not read folder {index} of {}: {e}", course.name);
                    (fallback, None)
                }
            };
            let target_url = href.map(|href| PortalConfig::resolve(&base, &href));
            entries.push((unique_name(label, &mut seen), target_url));
        }

        let folders: Vec<FolderEntry> = skip_landing(entries)
            .into_iter()
            .filter_map(|(label, target_url)| match target_url {
                Some(target_url) => Some(FolderEntry {
                    label,
                    target_url,
                    depth: 0,
                }),
                None => {
                    log::warn!("Folder {label} of {} has no link, skipping", course.name);
                    None
                }
            })
            .collect();

        log::debug!("Course {} has {} folder(s)", course.name, folders.len());
        Ok(folders)
    }

    /// Reads the name and link target of one course entry. `None` when the
    /// entry has no usable link.
    async fn read_course(&self, item: &S::Element, index: usize) -> Result<Option<(String, String)>> {
        let text = item.text().await?;
        let name = path_segment(&first_line(&text), &format!("course_{}", index + 1));
        let Some(link) = item.find_all(&self.portal.course_link).await?.into_iter().next() else {
            log::warn!("Course {name} has no link, skipping");
            return Ok(None);
        };
        let Some(href) = link.attr("href").await? else {
            log::warn!("Course {name} link has no target, skipping");
            return Ok(None);
        };
        Ok(Some((name, href)))
    }

    /// Follows the configured content frame, if the current page has one.
    async fn enter_content_frame(&self) -> Result<()> {
        let Some(selector) = &self.portal.content_frame else {
            return Ok(());
        };
        let Some(frame) = self.session.find_one(selector).await? else {
            return Ok(());
        };
        let Some(src) = frame.attr("src").await? else {
            return Ok(());
        };
        let base = self.session.current_url().await?;
        self.session
            .navigate_to(&PortalConfig::resolve(&base, &src))
            .await?;
        wait(self.settle).await;
        Ok(())
    }
}

async fn read_folder<E: PageElement>(link: &E) -> Result<(String, Option<String>)> {
    Ok((link.text().await?, link.attr("href").await?))
}

/// Appends ` (2)`, ` (3)`, ... to names already handed out.
fn unique_name(name: String, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(name.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        name
    } else {
        format!("{name} ({count})")
    }
}
