//! Chrome driven over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::url::resolve_page_url;
use super::{END_RECORDING_MARKER, PageDriver, PageHandle, PageSession, PageStopSignal};
use crate::config::SessionConfig;
use crate::display::DisplayHandle;
use crate::{Error, Result};

/// Flags that keep a kiosk browser quiet and unthrottled while it is recorded.
const BASE_FLAGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-infobars",
    "--disable-background-networking",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=site-per-process,TranslateUI,BlinkGenPropertyTrees",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--safebrowsing-disable-auto-update",
    "--password-store=basic",
    "--use-mock-keychain",
    "--kiosk",
    "--autoplay-policy=no-user-gesture-required",
    "--window-position=0,0",
];

/// Command line of the recorded browser.
///
/// `--enable-automation` is deliberately absent so no automation banner is
/// drawn over the captured surface.
pub fn browser_args(display: &DisplayHandle) -> Vec<String> {
    let mut args: Vec<String> = BASE_FLAGS.iter().map(|f| f.to_string()).collect();
    args.push(format!("--window-size={},{}", display.width, display.height));
    args.push(format!("--display={}", display.name));
    args
}

/// Join console arguments the way a console would print them.
pub fn console_text<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a console message, as printed, is exactly the end-of-recording marker.
pub fn is_end_marker(text: &str) -> bool {
    text == END_RECORDING_MARKER
}

/// Page driver backed by a locally launched Chrome/Chromium.
#[derive(Debug, Clone)]
pub struct ChromeDriver {
    executable: Option<PathBuf>,
    navigation_timeout: Option<Duration>,
}

impl ChromeDriver {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            executable: config.binaries.chrome.clone(),
            navigation_timeout: config.timeouts.navigation_secs.map(Duration::from_secs),
        }
    }

    async fn navigate(&self, running: &mut RunningBrowser, url: &str) -> Result<PageStopSignal> {
        let page = running
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::page(format!("failed to open page: {e}")))?;

        // Subscribe before navigating so a marker logged during load is not missed.
        let console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| Error::page(format!("failed to subscribe to console: {e}")))?;
        let (stop_tx, stop_rx) = oneshot::channel();
        running.console = Some(tokio::spawn(watch_console(console, stop_tx)));

        debug!("Navigating page");
        let navigation = page.goto(url);
        let loaded = match self.navigation_timeout {
            Some(limit) => tokio::time::timeout(limit, navigation)
                .await
                .map_err(|_| {
                    Error::page(format!(
                        "page did not finish loading within {}s",
                        limit.as_secs()
                    ))
                })?,
            None => navigation.await,
        };
        loaded.map_err(|e| Error::page(format!("navigation failed: {e}")))?;

        Ok(stop_rx)
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn open(&self, display: &DisplayHandle, config: &SessionConfig) -> Result<PageSession> {
        let url = resolve_page_url(&config.source)?;

        let mut builder = BrowserConfig::builder()
            .with_head()
            .disable_default_args()
            .viewport(Viewport {
                width: display.width,
                height: display.height,
                ..Viewport::default()
            })
            .args(browser_args(display));
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder
            .build()
            .map_err(|e| Error::page(format!("invalid browser configuration: {e}")))?;

        let display_name = display.name.clone();
        info!(display = %display_name, "Launching browser");
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::page(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser connection closed: {}", e);
                    break;
                }
            }
        });

        let mut running = RunningBrowser {
            browser,
            handler,
            console: None,
        };

        match self.navigate(&mut running, &url).await {
            Ok(stop_signal) => {
                info!(display = %display_name, "Page loaded");
                Ok(PageSession {
                    handle: Arc::new(ChromePage {
                        url,
                        running: Mutex::new(Some(running)),
                    }),
                    stop_signal,
                })
            }
            Err(e) => {
                running.shutdown().await;
                Err(e)
            }
        }
    }
}

/// Forward console output to the log and fire `stop_tx` on the end marker.
async fn watch_console(
    mut events: EventStream<EventConsoleApiCalled>,
    stop_tx: oneshot::Sender<()>,
) {
    let mut stop_tx = Some(stop_tx);
    while let Some(event) = events.next().await {
        let values: Vec<&Value> = event
            .args
            .iter()
            .filter_map(|arg| arg.value.as_ref())
            .collect();
        let text = console_text(values);
        debug!("page console: {}", text);

        if is_end_marker(&text) {
            if let Some(tx) = stop_tx.take() {
                info!("Page requested end of recording");
                let _ = tx.send(());
            }
        }
    }
}

struct RunningBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    console: Option<JoinHandle<()>>,
}

impl RunningBrowser {
    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        match self.browser.wait().await {
            Ok(status) => debug!("Browser exited: {:?}", status),
            Err(e) => warn!("Failed to wait for browser: {}", e),
        }
        if let Some(console) = self.console {
            console.abort();
        }
        self.handler.abort();
    }
}

struct ChromePage {
    url: String,
    running: Mutex<Option<RunningBrowser>>,
}

#[async_trait]
impl PageHandle for ChromePage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn close(&self) {
        let running = self.running.lock().take();
        match running {
            Some(running) => {
                info!("Closing browser");
                running.shutdown().await;
            }
            None => debug!("Browser already closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn display() -> DisplayHandle {
        DisplayHandle {
            name: ":42".to_string(),
            audio_sink: "grab.monitor".to_string(),
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn browser_is_kiosk_on_display_at_capture_size() {
        let args = browser_args(&display());
        assert!(args.contains(&"--kiosk".to_string()));
        assert!(args.contains(&"--display=:42".to_string()));
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args.contains(&"--autoplay-policy=no-user-gesture-required".to_string()));
        assert!(!args.iter().any(|a| a == "--enable-automation"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn marker_matches_whole_message_only() {
        let marker = json!("END_RECORDING");
        let other = json!("END_RECORDING soon");
        let number = json!(1);

        assert!(is_end_marker(&console_text([&marker])));
        assert!(!is_end_marker(&console_text([&marker, &number])));
        assert!(!is_end_marker(&console_text([&number, &marker])));
        assert!(!is_end_marker(&console_text([&other])));
        assert!(!is_end_marker(&console_text(std::iter::empty::<&Value>())));
    }

    #[test]
    fn console_text_joins_values() {
        let a = json!("joined");
        let b = json!(3);
        let c = json!({"k": true});
        assert_eq!(console_text([&a, &b, &c]), r#"joined 3 {"k":true}"#);
    }

    #[tokio::test]
    async fn closed_page_closes_once() {
        let page = ChromePage {
            url: "https://example.com".to_string(),
            running: Mutex::new(None),
        };
        assert_eq!(page.url(), "https://example.com");
        page.close().await;
        page.close().await;
    }
}
