//! In-memory portal implementing [`Session`] for tests.
//!
//! Pages are keyed by absolute URL. Element handles carry the page
//! generation they were found on and fail with [`Error::StaleElement`] once
//! the session has navigated, the way real browser handles do.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::config::PortalConfig;
use crate::error::{Error, Result};
use crate::session::{PageElement, Selector, Session};

/// What happens when an element is clicked.
#[derive(Debug, Clone, Default)]
pub enum ClickAction {
    #[default]
    Nothing,
    /// Loads another page.
    Navigate(String),
    /// Writes a file into the download directory without leaving the page.
    Download(String),
    /// Loads another page and writes a file, like a PDF viewer that saves.
    OpenAndDownload { url: String, file: String },
    /// Raises a dialog, then loads another page.
    DialogThenNavigate(String),
    /// The click itself fails.
    Fail(String),
    /// Submits the login form built by [`FakePortal::add_login_pages`].
    SubmitLogin { success: String, failure: String },
}

/// An element in a fake page.
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    text: String,
    attrs: HashMap<String, String>,
    children: HashMap<Selector, Vec<FakeNode>>,
    on_click: ClickAction,
    key: String,
    unreadable: bool,
}

impl FakeNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn href(self, url: impl Into<String>) -> Self {
        self.attr("href", url)
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn children(mut self, selector: &Selector, nodes: Vec<Self>) -> Self {
        self.children.entry(selector.clone()).or_default().extend(nodes);
        self
    }

    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.on_click = action;
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    /// Makes reading the text or attributes of this node fail.
    pub const fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }
}

/// A fake page: top-level query results per selector.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    nodes: HashMap<Selector, Vec<FakeNode>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: &Selector, nodes: Vec<FakeNode>) -> Self {
        self.nodes.entry(selector.clone()).or_default().extend(nodes);
        self
    }
}

#[derive(Debug, Default)]
struct PortalState {
    pages: HashMap<String, FakePage>,
    current: Option<String>,
    history: Vec<String>,
    generation: u64,
    username: String,
    password: String,
    typed: HashMap<String, String>,
    download_dir: Option<PathBuf>,
    dialog_open: bool,
    navigations: Vec<String>,
    closed: bool,
}

impl PortalState {
    fn goto(&mut self, url: &str) -> Result<()> {
        let url = match &self.current {
            Some(base) => PortalConfig::resolve(base, url),
            None => url.to_string(),
        };
        if !self.pages.contains_key(&url) {
            return Err(Error::Navigation(format!("no page at {url}")));
        }
        if let Some(previous) = self.current.replace(url) {
            self.history.push(previous);
        }
        self.generation += 1;
        Ok(())
    }

    fn download(&self, name: &str) -> Result<()> {
        let dir = self
            .download_dir
            .as_ref()
            .ok_or_else(|| Error::Navigation("no download directory".into()))?;
        std::fs::write(dir.join(name), name.as_bytes())?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Navigation("session closed".into()));
        }
        Ok(())
    }
}

/// A scripted portal session.
#[derive(Clone)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(PortalState {
                username: username.to_string(),
                password: password.to_string(),
                ..PortalState::default()
            })),
        }
    }

    /// Sets the directory download clicks write into.
    pub fn with_download_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.lock().download_dir = Some(dir.into());
        self
    }

    /// Adds or replaces the page at `url`.
    pub fn add_page(&self, url: &str, page: FakePage) {
        self.lock().pages.insert(url.to_string(), page);
    }

    /// Adds the login page, its failure page, and a home page with the
    /// logout control.
    pub fn add_login_pages(&self, portal: &PortalConfig) {
        let failure = format!("{}?failed", portal.login_url);
        let form = |page: FakePage| {
            page.with(&portal.username_field, vec![FakeNode::new("").key("username")])
                .with(&portal.password_field, vec![FakeNode::new("").key("password")])
                .with(
                    &portal.submit_button,
                    vec![FakeNode::new("Login").on_click(ClickAction::SubmitLogin {
                        success: portal.home_url.clone(),
                        failure: failure.clone(),
                    })],
                )
        };
        self.add_page(&portal.login_url, form(FakePage::new()));
        self.add_page(
            &failure,
            form(FakePage::new()).with(&portal.auth_failed_marker, vec![FakeNode::new("Failed")]),
        );
        self.add_page(
            &portal.home_url,
            FakePage::new().with(&portal.logout_marker, vec![FakeNode::new("Logout")]),
        );
    }

    /// URLs passed to `navigate_to`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap()
    }

    fn elements(&self, state: &PortalState, nodes: Vec<FakeNode>) -> Vec<FakeElement> {
        nodes
            .into_iter()
            .map(|node| FakeElement {
                state: Arc::clone(&self.state),
                generation: state.generation,
                node,
            })
            .collect()
    }
}

#[async_trait]
impl Session for FakePortal {
    type Element = FakeElement;

    async fn navigate_to(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.goto(url)?;
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<FakeElement>> {
        let state = self.lock();
        state.ensure_open()?;
        if state.dialog_open {
            return Err(Error::DialogOpen);
        }
        let nodes = state
            .current
            .as_ref()
            .and_then(|url| state.pages.get(url))
            .and_then(|page| page.nodes.get(selector))
            .cloned()
            .unwrap_or_default();
        Ok(self.elements(&state, nodes))
    }

    async fn current_url(&self) -> Result<String> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.current.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn go_back(&self) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        let previous = state
            .history
            .pop()
            .ok_or_else(|| Error::Navigation("no history to go back to".into()))?;
        state.current = Some(previous);
        state.generation += 1;
        Ok(())
    }

    async fn dismiss_dialog(&self) -> Result<()> {
        self.lock().dialog_open = false;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Handle to an element of a [`FakePortal`] page.
pub struct FakeElement {
    state: Arc<Mutex<PortalState>>,
    generation: u64,
    node: FakeNode,
}

impl FakeElement {
    fn live(&self) -> Result<MutexGuard<'_, PortalState>> {
        let state = self.state.lock().unwrap();
        state.ensure_open()?;
        if state.generation != self.generation {
            return Err(Error::StaleElement);
        }
        Ok(state)
    }

    fn readable(&self) -> Result<()> {
        if self.node.unreadable {
            return Err(Error::Browser("element cannot be read".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageElement for FakeElement {
    async fn text(&self) -> Result<String> {
        drop(self.live()?);
        self.readable()?;
        Ok(self.node.text.clone())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        drop(self.live()?);
        self.readable()?;
        Ok(self.node.attrs.get(name).cloned())
    }

    async fn click(&self) -> Result<()> {
        let mut state = self.live()?;
        match &self.node.on_click {
            ClickAction::Nothing => Ok(()),
            ClickAction::Navigate(url) => state.goto(url),
            ClickAction::Download(file) => state.download(file),
            ClickAction::OpenAndDownload { url, file } => {
                state.goto(url)?;
                state.download(file)
            }
            ClickAction::DialogThenNavigate(url) => {
                state.goto(url)?;
                state.dialog_open = true;
                Ok(())
            }
            ClickAction::Fail(message) => Err(Error::Navigation(message.clone())),
            ClickAction::SubmitLogin { success, failure } => {
                let accepted = state.typed.get("username") == Some(&state.username)
                    && state.typed.get("password") == Some(&state.password);
                let target = if accepted { success } else { failure };
                state.goto(target)
            }
        }
    }

    async fn send_keys(&self, text: &str) -> Result<()> {
        let mut state = self.live()?;
        state
            .typed
            .entry(self.node.key.clone())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<Self>> {
        let state = self.live()?;
        let generation = state.generation;
        drop(state);
        Ok(self
            .node
            .children
            .get(selector)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|node| Self {
                state: Arc::clone(&self.state),
                generation,
                node,
            })
            .collect())
    }
}

/// Page builders for the default portal layout.
pub mod layout {
    use super::{ClickAction, FakeNode, FakePage};
    use crate::config::PortalConfig;
    use crate::session::Selector;

    pub const ORIGIN: &str = "https://bb.example.edu";

    pub fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }

    /// Portal configuration pointing at [`ORIGIN`], without a content frame.
    pub fn portal_config() -> PortalConfig {
        PortalConfig {
            login_url: url("/login"),
            home_url: url("/home"),
            domain: "bb.example.edu".to_string(),
            content_frame: None,
            ..PortalConfig::default()
        }
    }

    /// Home page listing `(text, href)` courses, with the logout control.
    pub fn home(portal: &PortalConfig, courses: &[(&str, &str)]) -> FakePage {
        let items = courses
            .iter()
            .map(|(text, href)| {
                FakeNode::new(*text).children(&portal.course_link, vec![FakeNode::new(*text).href(*href)])
            })
            .collect();
        FakePage::new()
            .with(&portal.logout_marker, vec![FakeNode::new("Logout")])
            .with(&portal.course_list, items)
    }

    /// Page whose only content is a frame loading `src`.
    pub fn frameset(src: &str) -> FakePage {
        FakePage::new().with(
            &Selector::id("contentFrame"),
            vec![FakeNode::new("").attr("src", src)],
        )
    }

    /// Course page with a folder menu of `(label, href)` entries.
    pub fn course(portal: &PortalConfig, folders: &[(&str, &str)]) -> FakePage {
        let links = folders
            .iter()
            .map(|(label, href)| FakeNode::new(*label).href(*href))
            .collect();
        FakePage::new().with(
            &portal.folder_menu,
            vec![FakeNode::new("").children(&portal.folder_links, links)],
        )
    }

    /// Folder page titled `title` with one content section per entry of `sections`.
    pub fn folder(portal: &PortalConfig, title: &str, sections: Vec<Vec<FakeNode>>) -> FakePage {
        let sections = sections
            .into_iter()
            .map(|links| FakeNode::new("").children(&portal.section_links, links))
            .collect();
        FakePage::new()
            .with(&portal.content_container, vec![FakeNode::new("")])
            .with(&portal.content_sections, sections)
            .with(&portal.page_title, vec![FakeNode::new(title)])
    }

    /// A content link with a click behavior.
    pub fn link(text: &str, action: ClickAction) -> FakeNode {
        FakeNode::new(text).on_click(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handles_go_stale_after_navigation() {
        let fake = FakePortal::new("alice", "secret");
        let sel = Selector::css("a");
        fake.add_page(&layout::url("/one"), FakePage::new().with(&sel, vec![FakeNode::new("x")]));
        fake.add_page(&layout::url("/two"), FakePage::new());

        fake.navigate_to(&layout::url("/one")).await.unwrap();
        let links = fake.find_all(&sel).await.unwrap();
        assert_eq!(links[0].text().await.unwrap(), "x");

        fake.navigate_to(&layout::url("/two")).await.unwrap();
        assert!(matches!(links[0].text().await, Err(Error::StaleElement)));

        fake.go_back().await.unwrap();
        assert!(matches!(links[0].text().await, Err(Error::StaleElement)));
        assert_eq!(fake.find_all(&sel).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dialog_blocks_queries_until_dismissed() {
        let fake = FakePortal::new("alice", "secret");
        let sel = Selector::css("a");
        fake.add_page(
            &layout::url("/one"),
            FakePage::new().with(
                &sel,
                vec![FakeNode::new("x").on_click(ClickAction::DialogThenNavigate(layout::url("/two")))],
            ),
        );
        fake.add_page(&layout::url("/two"), FakePage::new());
        fake.navigate_to(&layout::url("/one")).await.unwrap();

        fake.find_all(&sel).await.unwrap()[0].click().await.unwrap();
        assert!(matches!(fake.find_all(&sel).await, Err(Error::DialogOpen)));
        fake.dismiss_dialog().await.unwrap();
        assert!(fake.find_all(&sel).await.unwrap().is_empty());
    }
}
