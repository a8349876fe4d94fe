// src/browser/mod.rs

use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::BrowserConfig;
use crate::error::ScrapeError;

/// Anything that can hand back the HTML of a URL.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_html(&mut self, url: &Url) -> Result<String>;
}

/// A live page that can be driven: switch a `<select>` and re-read the DOM.
#[allow(async_fn_in_trait)]
pub trait PageSession: PageSource {
    /// Serialized DOM of the page as it is right now.
    async fn current_html(&mut self) -> Result<String>;

    /// Pick option `index` of the `<select id=select_id>` element.
    async fn select_index(&mut self, select_id: &str, index: usize) -> Result<()>;

    async fn close(self) -> Result<()>;
}

/// Headless browser controlled through a WebDriver endpoint.
pub struct WebDriverSession {
    client: Client,
}

fn capabilities(cfg: &BrowserConfig) -> Map<String, Value> {
    let mut args = vec![
        format!("--user-agent={}", cfg.user_agent),
        format!("--window-size={},{}", cfg.window_width, cfg.window_height),
        "--start-maximized".to_string(),
    ];
    if cfg.headless {
        args.push("--headless".to_string());
    }

    let mut caps = Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "prefs": {
                "profile.default_content_settings.popups": 0,
                "directory_upgrade": true,
            },
        }),
    );
    caps
}

/// Launch one browser session. No pooling; the caller owns and closes it.
#[instrument(level = "info", skip(cfg), fields(webdriver = %cfg.webdriver_url))]
pub async fn setup_driver(cfg: &BrowserConfig) -> Result<WebDriverSession> {
    let client = ClientBuilder::native()
        .capabilities(capabilities(cfg))
        .connect(&cfg.webdriver_url)
        .await
        .with_context(|| format!("connecting to WebDriver at {}", cfg.webdriver_url))?;
    client
        .set_window_size(cfg.window_width, cfg.window_height)
        .await
        .context("setting window size")?;
    info!("browser session started");
    Ok(WebDriverSession { client })
}

impl PageSource for WebDriverSession {
    async fn fetch_html(&mut self, url: &Url) -> Result<String> {
        debug!(%url, "navigating");
        self.client
            .goto(url.as_str())
            .await
            .with_context(|| format!("navigating to {}", url))?;
        self.current_html().await
    }
}

impl PageSession for WebDriverSession {
    async fn current_html(&mut self) -> Result<String> {
        self.client.source().await.context("reading page source")
    }

    async fn select_index(&mut self, select_id: &str, index: usize) -> Result<()> {
        let select = self
            .client
            .find(Locator::Id(select_id))
            .await
            .map_err(|_| ScrapeError::ElementNotFound(format!("#{}", select_id)))?;
        select
            .select_by_index(index)
            .await
            .with_context(|| format!("selecting option {} of #{}", index, select_id))?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.client.close().await.context("closing browser session")?;
        info!("browser session closed");
        Ok(())
    }
}
