//! [`Session`] backed by a WebDriver server through `fantoccini`.

use std::path::Path;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::session::{PageElement, Selector, Session};

/// A live browser session.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    /// Opens a Chrome session that downloads into `download_dir` without
    /// prompting and saves PDFs instead of opening them in the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Browser`] if the WebDriver server cannot be reached
    /// or refuses the session.
    pub async fn connect(config: &BrowserConfig, download_dir: &Path) -> Result<Self> {
        log::info!("Connecting to WebDriver at {}", config.webdriver_url);
        let client = ClientBuilder::native()
            .capabilities(capabilities(config, download_dir))
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| Error::Browser(format!("{}: {e}", config.webdriver_url)))?;
        Ok(Self { client })
    }
}

fn capabilities(config: &BrowserConfig, download_dir: &Path) -> Map<String, Value> {
    let mut args = vec!["--disable-gpu".to_string()];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    let options = json!({
        "args": args,
        "prefs": {
            "download.default_directory": download_dir.display().to_string(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "plugins.always_open_pdf_externally": true,
        },
    });

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), options);
    caps
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Css(s) => Locator::Css(s),
        Selector::Id(s) => Locator::Id(s),
        Selector::XPath(s) => Locator::XPath(s),
    }
}

impl From<CmdError> for Error {
    fn from(e: CmdError) -> Self {
        match &e {
            CmdError::Standard(w) if matches!(w.error, ErrorStatus::UnexpectedAlertOpen) => {
                Self::DialogOpen
            }
            CmdError::Standard(w) if matches!(w.error, ErrorStatus::StaleElementReference) => {
                Self::StaleElement
            }
            _ => Self::WebDriver(e),
        }
    }
}

#[async_trait]
impl Session for WebDriverSession {
    type Element = WebDriverElement;

    async fn navigate_to(&self, url: &str) -> Result<()> {
        log::debug!("Navigating to {url}");
        Ok(self.client.goto(url).await?)
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<WebDriverElement>> {
        Ok(self
            .client
            .find_all(locator(selector))
            .await?
            .into_iter()
            .map(WebDriverElement)
            .collect())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn go_back(&self) -> Result<()> {
        Ok(self.client.back().await?)
    }

    async fn dismiss_dialog(&self) -> Result<()> {
        match self.client.dismiss_alert().await {
            Ok(()) => Ok(()),
            Err(CmdError::Standard(w)) if matches!(w.error, ErrorStatus::NoSuchAlert) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(self.client.clone().close().await?)
    }
}

/// Handle to an element of the current page.
pub struct WebDriverElement(Element);

#[async_trait]
impl PageElement for WebDriverElement {
    async fn text(&self) -> Result<String> {
        Ok(self.0.text().await?)
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        Ok(self.0.attr(name).await?)
    }

    async fn click(&self) -> Result<()> {
        Ok(self.0.click().await?)
    }

    async fn send_keys(&self, text: &str) -> Result<()> {
        Ok(self.0.send_keys(text).await?)
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<Self>> {
        Ok(self
            .0
            .find_all(locator(selector))
            .await?
            .into_iter()
            .map(Self)
            .collect())
    }
}
