//! Browser collaborator used by the prober.
//!
//! A session is acquired once per run and must be released with
//! [`Browser::shutdown`]; [`ChromeSession`] also releases itself on drop.

pub mod fingerprint;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser as ChromeBrowser, LaunchOptions, Tab};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, warn};

pub use fingerprint::BrowserFingerprint;

pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(20);

const LAUNCH_FLAGS: &[&str] = &[
    "--disable-gpu",
    "--disable-extensions",
    "--disable-infobars",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
];

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {message}")]
    Launch { message: String },

    #[error("failed to prepare browser tab: {message}")]
    Tab { message: String },

    #[error("error accessing URL {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("failed to read page source: {message}")]
    PageSource { message: String },

    #[error("browser session is closed")]
    Closed,

    #[error("browser task join failed: {source}")]
    TaskJoin {
        #[source]
        source: task::JoinError,
    },
}

/// A single serialized browsing session.
#[async_trait]
pub trait Browser: Send {
    /// Loads `url` and returns once navigation has completed.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Source of the currently loaded page, read at call time.
    async fn page_source(&mut self) -> Result<String, BrowserError>;

    /// Releases the session. Calling it again is a no-op.
    fn shutdown(&mut self) -> Result<(), BrowserError>;
}

#[derive(Clone, Debug)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub page_timeout: Duration,
    /// Chrome is torn down after this long without devtools traffic.
    pub idle_timeout: Duration,
    pub randomize_fingerprint: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            idle_timeout: Duration::from_secs(120),
            randomize_fingerprint: true,
        }
    }
}

pub struct ChromeSession {
    browser: Option<ChromeBrowser>,
    tab: Option<Arc<Tab>>,
    fingerprint: BrowserFingerprint,
}

impl ChromeSession {
    pub async fn launch(options: BrowserOptions) -> Result<Self, BrowserError> {
        let fingerprint = if options.randomize_fingerprint {
            BrowserFingerprint::random()
        } else {
            BrowserFingerprint::default()
        };
        debug!(fingerprint = %fingerprint.summary(), "launching chrome");

        let fp = fingerprint.clone();
        let (browser, tab) = task::spawn_blocking(move || launch_blocking(&options, &fp))
            .await
            .map_err(|source| BrowserError::TaskJoin { source })??;

        info!("chrome session ready");
        Ok(Self {
            browser: Some(browser),
            tab: Some(tab),
            fingerprint,
        })
    }

    pub fn fingerprint(&self) -> &BrowserFingerprint {
        &self.fingerprint
    }

    fn tab(&self) -> Result<Arc<Tab>, BrowserError> {
        self.tab.clone().ok_or(BrowserError::Closed)
    }
}

fn launch_blocking(
    options: &BrowserOptions,
    fp: &BrowserFingerprint,
) -> Result<(ChromeBrowser, Arc<Tab>), BrowserError> {
    let user_agent_flag = format!("--user-agent={}", fp.user_agent);
    let lang_flag = format!("--lang={}", fp.language);
    let mut args: Vec<&OsStr> = LAUNCH_FLAGS.iter().map(OsStr::new).collect();
    args.push(OsStr::new(&user_agent_flag));
    args.push(OsStr::new(&lang_flag));

    let envs = HashMap::from([("TZ".to_string(), fp.timezone.clone())]);

    let launch_options = LaunchOptions::default_builder()
        .headless(options.headless)
        .sandbox(false)
        .window_size(Some(fp.window_size))
        .path(options.chrome_path.clone())
        .idle_browser_timeout(options.idle_timeout)
        .process_envs(Some(envs))
        .args(args)
        .build()
        .map_err(|e| BrowserError::Launch {
            message: e.to_string(),
        })?;

    let browser = ChromeBrowser::new(launch_options).map_err(|e| BrowserError::Launch {
        message: e.to_string(),
    })?;
    let tab = browser.new_tab().map_err(|e| BrowserError::Tab {
        message: e.to_string(),
    })?;
    tab.set_default_timeout(options.page_timeout);
    let accept_language = fp.accept_language();
    tab.set_user_agent(&fp.user_agent, Some(accept_language.as_str()), None)
        .map_err(|e| BrowserError::Tab {
            message: e.to_string(),
        })?;

    Ok((browser, tab))
}

#[async_trait]
impl Browser for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let tab = self.tab()?;
        let url = url.to_string();
        task::spawn_blocking(move || {
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation {
                    url: url.clone(),
                    message: e.to_string(),
                })
        })
        .await
        .map_err(|source| BrowserError::TaskJoin { source })?
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        let tab = self.tab()?;
        task::spawn_blocking(move || {
            tab.get_content().map_err(|e| BrowserError::PageSource {
                message: e.to_string(),
            })
        })
        .await
        .map_err(|source| BrowserError::TaskJoin { source })?
    }

    fn shutdown(&mut self) -> Result<(), BrowserError> {
        self.tab.take();
        if let Some(browser) = self.browser.take() {
            // Dropping the last handle kills the chrome process.
            drop(browser);
            debug!("chrome session closed");
        }
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("failed to close browser session: {e}");
        }
    }
}
