//! The page surface the harvester drives, and the login gate in front of it.
//!
//! A [`Session`] is one browser tab: it has a current page, can navigate,
//! and answers selector queries with [`PageElement`] handles. Handles are
//! only valid until the next page transition; callers re-query after every
//! navigation instead of holding on to them.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PortalConfig;
use crate::credentials::LoginInfo;
use crate::error::{Error, Result};

/// How to locate elements on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    /// CSS selector.
    Css(String),
    /// Element `id` attribute.
    Id(String),
    /// XPath expression.
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn id(s: impl Into<String>) -> Self {
        Self::Id(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Self::XPath(s.into())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css `{s}`"),
            Self::Id(s) => write!(f, "id `{s}`"),
            Self::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

/// A handle to an element on the current page.
#[async_trait]
pub trait PageElement: Send + Sync + Sized {
    /// Visible text of the element.
    async fn text(&self) -> Result<String>;

    /// Value of an attribute, if set.
    async fn attr(&self, name: &str) -> Result<Option<String>>;

    /// Activates the element as a click would.
    async fn click(&self) -> Result<()>;

    /// Types text into the element.
    async fn send_keys(&self, text: &str) -> Result<()>;

    /// Finds descendants of this element.
    async fn find_all(&self, selector: &Selector) -> Result<Vec<Self>>;
}

/// A navigable, query-able browser session.
#[async_trait]
pub trait Session: Send + Sync {
    type Element: PageElement;

    /// Loads `url` in the session.
    async fn navigate_to(&self, url: &str) -> Result<()>;

    /// Finds all elements matching `selector` on the current page.
    async fn find_all(&self, selector: &Selector) -> Result<Vec<Self::Element>>;

    /// Finds the first element matching `selector`, if any.
    async fn find_one(&self, selector: &Selector) -> Result<Option<Self::Element>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    /// Returns the URL of the current page.
    async fn current_url(&self) -> Result<String>;

    /// Goes back one entry in the session history.
    async fn go_back(&self) -> Result<()>;

    /// Dismisses a blocking dialog (alert/confirm).
    async fn dismiss_dialog(&self) -> Result<()>;

    /// Ends the session. The session must not be used afterwards.
    async fn close(&self) -> Result<()>;
}

/// Proof that the session passed the login gate.
#[derive(Debug)]
pub struct Authenticated {
    _private: (),
}

/// Determines login state and performs login.
pub struct SessionGate<'a, S: Session> {
    session: &'a S,
    portal: &'a PortalConfig,
    settle: Duration,
}

impl<'a, S: Session> SessionGate<'a, S> {
    #[must_use]
    pub const fn new(session: &'a S, portal: &'a PortalConfig, settle: Duration) -> Self {
        Self {
            session,
            portal,
            settle,
        }
    }

    /// Checks the current page for the logout affordance. Never navigates.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be queried.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self
            .session
            .find_one(&self.portal.logout_marker)
            .await?
            .is_some())
    }

    /// Logs in through the portal's login form on the current page.
    ///
    /// Succeeds only when, after submitting, the page shows no
    /// authentication-failed marker and does show the logout affordance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] when the credentials were rejected, the
    /// outcome was ambiguous, or the login form could not be found.
    pub async fn login(&self, info: &LoginInfo) -> Result<Authenticated> {
        if self.is_authenticated().await? {
            log::info!("Already logged in");
            return Ok(Authenticated { _private: () });
        }
        log::info!("Not logged in yet, submitting credentials for {}", info.username);

        self.fill(&self.portal.username_field, &info.username).await?;
        self.fill(&self.portal.password_field, info.password()).await?;
        let submit = self.require(&self.portal.submit_button).await?;
        submit.click().await?;
        wait(self.settle).await;

        if self
            .session
            .find_one(&self.portal.auth_failed_marker)
            .await?
            .is_some()
        {
            return Err(Error::AuthFailed("the portal rejected the credentials".into()));
        }
        if !self.is_authenticated().await? {
            return Err(Error::AuthFailed(
                "no logout control found after submitting the login form".into(),
            ));
        }

        log::info!("Login successful");
        Ok(Authenticated { _private: () })
    }

    async fn fill(&self, selector: &Selector, text: &str) -> Result<()> {
        self.require(selector).await?.send_keys(text).await
    }

    async fn require(&self, selector: &Selector) -> Result<S::Element> {
        self.session
            .find_one(selector)
            .await?
            .ok_or_else(|| Error::AuthFailed(format!("login form element {selector} not found")))
    }
}

/// Blocks the walk for a settle period.
pub async fn wait(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakePortal, layout};

    fn info(password: &str) -> LoginInfo {
        LoginInfo::new("alice", password, 1).unwrap()
    }

    #[test]
    fn selector_deserializes_from_toml_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            sel: Selector,
        }
        let w: Wrapper = toml::from_str("sel = { xpath = \"//div[@id='x']\" }").unwrap();
        assert_eq!(w.sel, Selector::xpath("//div[@id='x']"));
        let w: Wrapper = toml::from_str("sel = { id = \"failed\" }").unwrap();
        assert_eq!(w.sel, Selector::id("failed"));
    }

    #[tokio::test]
    async fn login_succeeds_with_right_password() {
        let portal = layout::portal_config();
        let fake = FakePortal::new("alice", "secret");
        fake.add_login_pages(&portal);
        fake.navigate_to(&portal.login_url).await.unwrap();

        let gate = SessionGate::new(&fake, &portal, Duration::ZERO);
        assert!(!gate.is_authenticated().await.unwrap());
        gate.login(&info("secret")).await.unwrap();
        assert!(gate.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn login_rejected_with_wrong_password() {
        let portal = layout::portal_config();
        let fake = FakePortal::new("alice", "secret");
        fake.add_login_pages(&portal);
        fake.navigate_to(&portal.login_url).await.unwrap();

        let gate = SessionGate::new(&fake, &portal, Duration::ZERO);
        let err = gate.login(&info("wrong")).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));
    }

    #[tokio::test]
    async fn login_fails_closed_without_either_marker() {
        let portal = layout::portal_config();
        let fake = FakePortal::new("alice", "secret");
        fake.add_login_pages(&portal);
        // Successful submit lands on a page without the logout control
        fake.add_page(&portal.home_url, crate::fake::FakePage::new());
        fake.navigate_to(&portal.login_url).await.unwrap();

        let gate = SessionGate::new(&fake, &portal, Duration::ZERO);
        assert!(matches!(
            gate.login(&info("secret")).await,
            Err(Error::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn login_skipped_when_already_authenticated() {
        let portal = layout::portal_config();
        let fake = FakePortal::new("alice", "secret");
        fake.add_login_pages(&portal);
        fake.navigate_to(&portal.home_url).await.unwrap();

        let gate = SessionGate::new(&fake, &portal, Duration::ZERO);
        // Wrong password is never submitted
        gate.login(&info("wrong")).await.unwrap();
    }

    #[tokio::test]
    async fn login_without_form_fails() {
        let portal = layout::portal_config();
        let fake = FakePortal::new("alice", "secret");
        fake.add_page("https://elsewhere.example.com/", crate::fake::FakePage::new());
        fake.navigate_to("https://elsewhere.example.com/").await.unwrap();

        let gate = SessionGate::new(&fake, &portal, Duration::ZERO);
        assert!(matches!(
            gate.login(&info("secret")).await,
            Err(Error::AuthFailed(_))
        ));
    }
}
