use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use super::snapshot::PageSnapshot;
use super::{ControlInfo, ControlScope, ElementHandle, FieldInfo, ListingRow, PageAdapter, PageSignals};
use crate::config::BrowserConfig;
use crate::utils::error::{AppError, Result};

const LAUNCH_RETRY_INTERVAL_MS: u64 = 2_000;

/// Page adapter backed by one Chromium tab.
///
/// headless_chrome is blocking, so every call runs on the blocking pool.
/// Reads go through a parsed HTML snapshot; actions are small scripts that
/// address elements as `document.querySelectorAll(selector)[index]`.
pub struct ChromePageAdapter {
    // Dropping the browser closes the tab.
    _browser: Browser,
    tab: Arc<Tab>,
}

fn launch_options(config: &BrowserConfig) -> Result<LaunchOptions<'static>> {
    LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(false) // Often needed in containerized environments
        .window_size(Some((config.window_width, config.window_height)))
        .path(config.chrome_path.as_ref().map(PathBuf::from))
        .user_data_dir(config.user_data_dir.as_ref().map(PathBuf::from))
        .idle_browser_timeout(Duration::from_secs(60 * 60 * 24))
        .args(vec![
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--disable-background-timer-throttling"),
            OsStr::new("--disable-backgrounding-occluded-windows"),
            OsStr::new("--disable-renderer-backgrounding"),
        ])
        .build()
        .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))
}

fn element_expr(handle: &ElementHandle) -> Result<String> {
    Ok(format!(
        "document.querySelectorAll({})[{}]",
        serde_json::to_string(&handle.selector)?,
        handle.index
    ))
}

impl ChromePageAdapter {
    /// Launches Chromium (retrying on failure) and opens the portal.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let strategy = FixedInterval::from_millis(LAUNCH_RETRY_INTERVAL_MS).take(config.launch_retries);

        let browser = Retry::spawn(strategy, || {
            let config = config.clone();
            async move {
                let options = launch_options(&config)?;
                let launched = tokio::task::spawn_blocking(move || Browser::new(options))
                    .await
                    .map_err(|e| AppError::Browser(format!("Browser launch task failed: {}", e)))?;
                launched.map_err(|e| {
                    warn!("Failed to launch browser: {}", e);
                    AppError::Browser(format!("Failed to launch browser: {}", e))
                })
            }
        })
        .await?;

        let start_url = config.start_url.clone();
        let timeout = Duration::from_secs(config.navigation_timeout_secs);
        let tab_browser = browser.clone();
        let tab = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Tab>> {
            let tab = tab_browser.new_tab()?;
            tab.set_default_timeout(timeout);
            tab.navigate_to(&start_url)?;
            tab.wait_until_navigated()?;
            Ok(tab)
        })
        .await
        .map_err(|e| AppError::Browser(format!("Browser task failed: {}", e)))?
        .map_err(|e| AppError::Browser(format!("Failed to open start page: {}", e)))?;

        info!("Opened {}", config.start_url);
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    pub fn tab(&self) -> Arc<Tab> {
        self.tab.clone()
    }

    async fn with_tab<T, F>(&self, action: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || action(&tab))
            .await
            .map_err(|e| AppError::Browser(format!("Browser task failed: {}", e)))?
            .map_err(|e| AppError::TransientPage(e.to_string()))
    }

    async fn evaluate(&self, script: String) -> Result<serde_json::Value> {
        self.with_tab(move |tab| {
            let result = tab.evaluate(&script, false)?;
            Ok(result.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }

    /// Runs `body` with `el` bound to the element; fails when it is gone.
    async fn on_element(&self, handle: &ElementHandle, body: &str) -> Result<()> {
        let script = format!(
            "(function() {{ const el = {}; if (!el) return false; {} return true; }})()",
            element_expr(handle)?,
            body
        );
        match self.evaluate(script).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(AppError::not_found(format!(
                "element {}[{}]",
                handle.selector, handle.index
            ))),
        }
    }
}

#[async_trait]
impl PageAdapter for ChromePageAdapter {
    async fn signals(&self) -> Result<PageSignals> {
        let html = self.page_html().await?;
        PageSnapshot::parse(&html).signals()
    }

    async fn list_rows(&self) -> Result<Vec<ListingRow>> {
        let html = self.page_html().await?;
        PageSnapshot::parse(&html).rows()
    }

    async fn controls(&self, scope: ControlScope) -> Result<Vec<ControlInfo>> {
        let html = self.page_html().await?;
        PageSnapshot::parse(&html).controls(scope)
    }

    async fn fields(&self) -> Result<Vec<FieldInfo>> {
        let html = self.page_html().await?;
        PageSnapshot::parse(&html).fields()
    }

    async fn set_field_value(&self, field: &ElementHandle, value: &str) -> Result<()> {
        // Native setter so framework-managed inputs see the new value.
        let body = format!(
            "const proto = el instanceof HTMLSelectElement ? HTMLSelectElement.prototype : HTMLInputElement.prototype; \
             Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {});",
            serde_json::to_string(value)?
        );
        self.on_element(field, &body).await
    }

    async fn trigger_change_events(&self, field: &ElementHandle) -> Result<()> {
        self.on_element(
            field,
            "['input', 'change', 'blur'].forEach(t => el.dispatchEvent(new Event(t, { bubbles: true })));",
        )
        .await
    }

    async fn click(&self, control: &ElementHandle) -> Result<()> {
        debug!("Clicking {}[{}]", control.selector, control.index);
        self.on_element(control, "el.click();").await
    }

    async fn reload(&self) -> Result<()> {
        self.with_tab(|tab| {
            tab.reload(false, None)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn page_html(&self) -> Result<String> {
        self.with_tab(|tab| tab.get_content()).await
    }

    async fn show_message(&self, message: &str) -> Result<()> {
        // A DOM overlay instead of alert(): a blocking dialog would stall
        // every later script until someone dismisses it.
        let script = format!(
            r#"(function() {{
                const box = document.createElement('div');
                box.setAttribute('style', 'position:fixed;top:20px;right:20px;z-index:99999;max-width:360px;padding:16px;background:#198754;color:#fff;font:16px sans-serif;white-space:pre-line;border-radius:6px;box-shadow:0 4px 12px rgba(0,0,0,.3);cursor:pointer');
                box.textContent = {};
                box.addEventListener('click', () => box.remove());
                document.body.appendChild(box);
                return true;
            }})()"#,
            serde_json::to_string(message)?
        );
        self.evaluate(script).await.map(|_| ())
    }
}
