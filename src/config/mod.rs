//! Configuration for harvesting runs, portal layout, paths and the browser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::session::Selector;

/// Policy for which content links are activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPolicy {
    /// Links whose visible text contains any of these are never followed.
    pub skip_text_containing: Vec<String>,
    /// When set, only links whose visible text matches this regex are followed.
    pub only_matching: Option<String>,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            skip_text_containing: vec!["http".to_string()],
            only_matching: None,
        }
    }
}

impl LinkPolicy {
    /// Compiles the policy into a filter.
    ///
    /// # Errors
    ///
    /// Returns an error if `only_matching` is not a valid regex.
    pub fn compile(&self) -> crate::Result<LinkFilter> {
        let only = self.only_matching.as_deref().map(Regex::new).transpose()?;
        Ok(LinkFilter {
            skip: self.skip_text_containing.clone(),
            only,
        })
    }
}

/// Compiled [`LinkPolicy`].
#[derive(Debug, Clone)]
pub struct LinkFilter {
    skip: Vec<String>,
    only: Option<Regex>,
}

impl LinkFilter {
    /// Returns true if a link with this visible text should be activated.
    #[must_use]
    pub fn should_follow(&self, text: &str) -> bool {
        if self.skip.iter().any(|s| text.contains(s.as_str())) {
            return false;
        }
        self.only.as_ref().is_none_or(|re| re.is_match(text))
    }
}

/// Configuration for the traversal and reconciliation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// How long to wait for a page or download to settle, in milliseconds.
    pub settle_wait_ms: u64,
    /// How long to wait after leaving a document viewer, in milliseconds.
    pub back_wait_ms: u64,
    /// Extra settle periods to wait while downloads are still in progress.
    pub download_settle_rounds: u32,
    /// File name suffixes of downloads that have not finished yet.
    pub in_progress_suffixes: Vec<String>,
    /// Which content links are activated.
    pub link_policy: LinkPolicy,
    /// Prefix of the per-run directory, followed by the username.
    pub run_dir_prefix: String,
    /// Whether files that appeared during the run but were never relocated
    /// are deleted at the end.
    pub remove_stray_downloads: bool,
    /// Whether the login info file is reset to its template after reading.
    pub scrub_login_info: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            settle_wait_ms: 3_000,
            back_wait_ms: 1_000,
            download_settle_rounds: 3,
            in_progress_suffixes: [".crdownload", ".part", ".partial", ".download"]
                .into_iter()
                .map(String::from)
                .collect(),
            link_policy: LinkPolicy::default(),
            run_dir_prefix: "bb_download_".to_string(),
            remove_stray_downloads: false,
            scrub_login_info: true,
        }
    }
}

impl HarvestConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settle wait.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_settle_wait(mut self, wait: Duration) -> Self {
        self.settle_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Sets the wait after leaving a document viewer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_back_wait(mut self, wait: Duration) -> Self {
        self.back_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Sets how many extra settle periods in-progress downloads get.
    #[must_use]
    pub const fn with_download_settle_rounds(mut self, rounds: u32) -> Self {
        self.download_settle_rounds = rounds;
        self
    }

    /// Sets the link policy.
    #[must_use]
    pub fn with_link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    /// Sets whether stray downloads are removed at the end of the run.
    #[must_use]
    pub const fn with_remove_stray_downloads(mut self, remove: bool) -> Self {
        self.remove_stray_downloads = remove;
        self
    }

    #[must_use]
    pub const fn settle_wait(&self) -> Duration {
        Duration::from_millis(self.settle_wait_ms)
    }

    #[must_use]
    pub const fn back_wait(&self) -> Duration {
        Duration::from_millis(self.back_wait_ms)
    }

    /// Returns true if `name` looks like a download still being written.
    #[must_use]
    pub fn is_in_progress(&self, name: &str) -> bool {
        self.finished_name(name).is_some()
    }

    /// Returns the name an in-progress download will have once finished.
    #[must_use]
    pub fn finished_name<'n>(&self, name: &'n str) -> Option<&'n str> {
        self.in_progress_suffixes
            .iter()
            .find_map(|suffix| name.strip_suffix(suffix.as_str()))
    }
}

/// Where things live on the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Page that presents the login form.
    pub login_url: String,
    /// Page that lists the user's courses.
    pub home_url: String,
    /// Host of the portal; subdomains count as part of the portal.
    pub domain: String,
    /// Frame holding the main content on home and course pages.
    pub content_frame: Option<Selector>,
    pub logout_marker: Selector,
    pub username_field: Selector,
    pub password_field: Selector,
    pub submit_button: Selector,
    pub auth_failed_marker: Selector,
    /// One element per course on the home page.
    pub course_list: Selector,
    /// Link inside a course element.
    pub course_link: Selector,
    /// Left-navigation menu of a course page.
    pub folder_menu: Selector,
    pub folder_links: Selector,
    /// Container of the content listing on a folder page.
    pub content_container: Selector,
    pub content_sections: Selector,
    pub section_links: Selector,
    /// Title of a folder page, used to name nested subfolders.
    pub page_title: Selector,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: "https://blackboard.andrew.cmu.edu".to_string(),
            home_url: "https://blackboard.andrew.cmu.edu".to_string(),
            domain: "blackboard.andrew.cmu.edu".to_string(),
            content_frame: Some(Selector::css("#contentFrame, [name='contentFrame']")),
            logout_marker: Selector::id("topframe.logout.label"),
            username_field: Selector::css("[name='j_username']"),
            password_field: Selector::css("[name='j_password']"),
            submit_button: Selector::css("[name='submit']"),
            auth_failed_marker: Selector::id("failed"),
            course_list: Selector::xpath("//div[@id='_4_1termCourses_noterm']/ul/li"),
            course_link: Selector::css("a"),
            folder_menu: Selector::id("courseMenuPalette_contents"),
            folder_links: Selector::css("a"),
            content_container: Selector::id("containerdiv"),
            content_sections: Selector::xpath("//div[@id='containerdiv']/ul/li"),
            section_links: Selector::css("a"),
            page_title: Selector::xpath("//*[@id='pageTitleText']/span"),
        }
    }
}

impl PortalConfig {
    /// Returns true if `url` is on the portal's host or one of its subdomains.
    #[must_use]
    pub fn is_portal_url(&self, url: &str) -> bool {
        let domain = self.domain.to_ascii_lowercase();
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| {
                host == domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            })
    }

    /// Resolves a possibly relative link target against the current page URL.
    #[must_use]
    pub fn resolve(base: &str, href: &str) -> String {
        Url::parse(base)
            .and_then(|b| b.join(href))
            .map_or_else(|_| href.to_string(), String::from)
    }
}

/// Path configuration for the output root and login info.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory the browser downloads into; the run directory is created inside it.
    pub output_root: PathBuf,
    /// Three-line login info file.
    pub login_info: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            output_root: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            login_info: PathBuf::from("login_info.txt"),
        }
    }
}

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Address of the WebDriver server.
    pub webdriver_url: String,
    /// Whether to run the browser without a window.
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: false,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harvest: HarvestConfig,
    pub portal: PortalConfig,
    pub paths: PathConfig,
    pub browser: BrowserConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("course-dl").join("config.toml"))
    }

    /// Parses a TOML document; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads configuration from `path`, or from the default location if it
    /// exists, or falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Precondition`] if an explicit path cannot be
    /// read, or a config error if a file is malformed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            crate::Error::Precondition(format!("cannot read config {}: {e}", path.display()))
        })?;
        log::info!("Loaded config from {}", path.display());
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_harvest_config() {
        let config = HarvestConfig::default();
        assert_eq!(config.settle_wait(), Duration::from_secs(3));
        assert_eq!(config.back_wait(), Duration::from_secs(1));
        assert_eq!(config.download_settle_rounds, 3);
        assert_eq!(config.run_dir_prefix, "bb_download_");
        assert!(!config.remove_stray_downloads);
        assert!(config.scrub_login_info);
    }

    #[test]
    fn harvest_config_builder_pattern() {
        let config = HarvestConfig::new()
            .with_settle_wait(Duration::from_millis(250))
            .with_back_wait(Duration::ZERO)
            .with_download_settle_rounds(0)
            .with_remove_stray_downloads(true);

        assert_eq!(config.settle_wait_ms, 250);
        assert_eq!(config.back_wait_ms, 0);
        assert_eq!(config.download_settle_rounds, 0);
        assert!(config.remove_stray_downloads);
    }

    #[test]
    fn in_progress_suffixes() {
        let config = HarvestConfig::default();
        assert!(config.is_in_progress("slides.pdf.crdownload"));
        assert!(config.is_in_progress("notes.part"));
        assert!(!config.is_in_progress("notes.pdf"));
        assert_eq!(config.finished_name("slides.pdf.crdownload"), Some("slides.pdf"));
        assert_eq!(config.finished_name("notes.pdf"), None);
    }

    #[test]
    fn link_policy_skips_http_by_default() {
        let filter = LinkPolicy::default().compile().unwrap();
        assert!(filter.should_follow("Lecture 1.pdf"));
        assert!(!filter.should_follow("http://example.com/reading"));
        assert!(!filter.should_follow("see https://example.com"));
    }

    #[test]
    fn link_policy_only_matching() {
        let policy = LinkPolicy {
            only_matching: Some(r"(?i)\.(pdf|pptx?)$".to_string()),
            ..LinkPolicy::default()
        };
        let filter = policy.compile().unwrap();
        assert!(filter.should_follow("Lecture 1.PDF"));
        assert!(filter.should_follow("recitation.pptx"));
        assert!(!filter.should_follow("Week 2"));
    }

    #[test]
    fn link_policy_bad_regex_fails() {
        let policy = LinkPolicy {
            only_matching: Some("(".to_string()),
            ..LinkPolicy::default()
        };
        assert!(matches!(policy.compile(), Err(crate::Error::Pattern(_))));
    }

    #[test]
    fn portal_url_matching() {
        let portal = PortalConfig::default();
        assert!(portal.is_portal_url("https://blackboard.andrew.cmu.edu/webapps/x"));
        assert!(portal.is_portal_url("https://cdn.blackboard.andrew.cmu.edu/file"));
        assert!(!portal.is_portal_url("https://login.cmu.edu/idp"));
        assert!(!portal.is_portal_url("https://evilblackboard.andrew.cmu.edu/"));
        assert!(!portal.is_portal_url("not a url"));
    }

    #[test]
    fn resolve_relative_links() {
        assert_eq!(
            PortalConfig::resolve("https://bb.example.edu/a/b", "/frame/home"),
            "https://bb.example.edu/frame/home"
        );
        assert_eq!(
            PortalConfig::resolve("https://bb.example.edu/a/b", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn app_config_serializes_to_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.harvest.settle_wait_ms, config.harvest.settle_wait_ms);
        assert_eq!(parsed.portal.course_list, config.portal.course_list);
        assert_eq!(parsed.portal.content_frame, config.portal.content_frame);
        assert_eq!(parsed.browser.webdriver_url, config.browser.webdriver_url);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let parsed = AppConfig::from_toml(
            "[harvest]\nsettle_wait_ms = 500\n\n[portal]\ndomain = \"bb.example.edu\"\n",
        )
        .unwrap();
        assert_eq!(parsed.harvest.settle_wait_ms, 500);
        assert_eq!(parsed.harvest.back_wait_ms, 1_000);
        assert_eq!(parsed.portal.domain, "bb.example.edu");
        assert_eq!(parsed.portal.folder_menu, Selector::id("courseMenuPalette_contents"));
    }

    #[test]
    fn load_without_file_uses_defaults_or_fails_explicitly() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            AppConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(crate::Error::Precondition(_))
        ));

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[browser]\nheadless = true\n").unwrap();
        assert!(AppConfig::load(Some(&path)).unwrap().browser.headless);
    }
}
