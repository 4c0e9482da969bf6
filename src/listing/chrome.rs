//! Headless Chromium sessions over CDP.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, Headers, ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, FrameId, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures_util::{FutureExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{identity, BROWSER_EXIT_TIMEOUT_MS};
use crate::error::{AppError, Result};
use crate::listing::{BrowsingSession, PageInfo, SessionLauncher};

/// Lifecycle event Chrome emits once a frame has had no network connections for 500ms.
const NETWORK_IDLE: &str = "networkIdle";

/// Launches a fresh headless browser process per session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    executable: Option<String>,
    request_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(executable: Option<String>, request_timeout: Duration) -> Self {
        Self {
            executable,
            request_timeout,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .args(identity::LAUNCH_ARGS.iter().copied())
            .window_size(identity::VIEWPORT_WIDTH, identity::VIEWPORT_HEIGHT)
            .request_timeout(self.request_timeout);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| AppError::Config(format!("browser config: {e}")))
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowsingSession>> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {e}");
                    break;
                }
            }
        });

        match prepare_page(&browser).await {
            Ok(page) => Ok(Box::new(ChromeSession {
                browser,
                page,
                status: None,
                handler: handler_task,
            })),
            Err(e) => {
                if let Err(close_err) = shutdown(&mut browser, exit_grace()).await {
                    warn!("Browser shutdown after failed setup: {close_err}");
                }
                handler_task.abort();
                Err(e)
            }
        }
    }
}

/// Blank page carrying a desktop identity: user agent, navigation headers
/// and a desktop-sized viewport.
async fn prepare_page(browser: &Browser) -> Result<Page> {
    let page = browser.new_page("about:blank").await?;
    page.set_user_agent(identity::USER_AGENT).await?;

    let headers: serde_json::Map<String, serde_json::Value> = identity::NAVIGATION_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    page.execute(SetExtraHttpHeadersParams::new(Headers::new(
        serde_json::Value::Object(headers),
    )))
    .await?;

    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(identity::VIEWPORT_WIDTH),
        i64::from(identity::VIEWPORT_HEIGHT),
        1.0,
        false,
    ))
    .await?;

    page.execute(SetLifecycleEventsEnabledParams::new(true)).await?;

    Ok(page)
}

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    /// Main document status from the last `goto`.
    status: Option<u16>,
    handler: JoinHandle<()>,
}

#[async_trait]
impl BrowsingSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let lifecycle = self.page.event_listener::<EventLifecycleEvent>().await?;
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;

        self.page.goto(url).await?;
        let main_frame = self.page.mainframe().await?;
        let lifecycle = lifecycle.map(|e| (e.frame_id.clone(), e.name.clone()));
        wait_for_network_idle(lifecycle, main_frame.as_ref()).await?;
        self.status = document_status(&mut responses, main_frame.as_ref());
        Ok(())
    }

    async fn page_info(&mut self) -> Result<PageInfo> {
        Ok(PageInfo {
            url: self.page.url().await?,
            status: self.status,
            title: self.page.get_title().await?,
        })
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool> {
        let script = format!(
            "document.querySelector({}) !== null",
            serde_json::to_string(selector)?
        );
        Ok(self.page.evaluate(script).await?.into_value::<bool>()?)
    }

    async fn text_preview(&mut self, max_chars: usize) -> Result<String> {
        let text: String = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await?
            .into_value()?;
        Ok(text.chars().take(max_chars).collect())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut session = self;
        shutdown(&mut session.browser, exit_grace()).await
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Waits for `networkIdle` on the main frame after a fresh `init`, so an idle
/// signal left over from the blank page is not taken for the new document.
/// Unbounded; callers put a deadline around it.
async fn wait_for_network_idle<S>(mut events: S, main_frame: Option<&FrameId>) -> Result<()>
where
    S: Stream<Item = (FrameId, String)> + Unpin,
{
    let mut navigated = false;
    while let Some((frame, name)) = events.next().await {
        if main_frame.is_some_and(|f| *f != frame) {
            continue;
        }
        match name.as_str() {
            "init" => navigated = true,
            NETWORK_IDLE if navigated => return Ok(()),
            _ => {}
        }
    }
    Err(AppError::Navigation(
        "page closed before network activity settled".to_string(),
    ))
}

/// Status of the first main-frame document response already received.
fn document_status(
    events: &mut EventStream<EventResponseReceived>,
    main_frame: Option<&FrameId>,
) -> Option<u16> {
    let mut status = None;
    while let Some(Some(event)) = events.next().now_or_never() {
        let in_main_frame = main_frame.map_or(true, |f| event.frame_id.as_ref() == Some(f));
        if status.is_none() && in_main_frame && event.r#type == ResourceType::Document {
            status = u16::try_from(event.response.status).ok();
        }
    }
    status
}

fn exit_grace() -> Duration {
    Duration::from_millis(BROWSER_EXIT_TIMEOUT_MS)
}

/// Process-level operations needed to tear a browser down.
#[async_trait]
trait BrowserProcess: Send {
    async fn request_close(&mut self) -> Result<()>;
    async fn wait_exit(&mut self) -> std::io::Result<()>;
    async fn force_kill(&mut self) -> Option<std::io::Result<()>>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> Result<()> {
        self.close().await?;
        Ok(())
    }

    async fn wait_exit(&mut self) -> std::io::Result<()> {
        self.wait().await.map(|_| ())
    }

    async fn force_kill(&mut self) -> Option<std::io::Result<()>> {
        self.kill().await
    }
}

/// Asks the browser to close and gives the process `grace` to exit. A failed
/// close, a failed wait or a slow exit all end in a kill. Every step is bounded
/// by `grace`.
async fn shutdown<B: BrowserProcess + ?Sized>(browser: &mut B, grace: Duration) -> Result<()> {
    let closed = match tokio::time::timeout(grace, browser.request_close()).await {
        Ok(res) => res,
        Err(_) => Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("browser close not acknowledged within {}ms", grace.as_millis()),
        ))),
    };

    match &closed {
        Ok(()) => match tokio::time::timeout(grace, browser.wait_exit()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => warn!("Waiting for browser exit failed: {e}"),
            Err(_) => warn!("Browser did not exit within {}ms", grace.as_millis()),
        },
        Err(e) => warn!("Browser close failed: {e}"),
    }

    match tokio::time::timeout(grace, browser.force_kill()).await {
        Ok(Some(Ok(()))) => debug!("Browser process killed"),
        Ok(Some(Err(e))) => warn!("Killing browser process failed: {e}"),
        Ok(None) => debug!("No browser process left to kill"),
        Err(_) => warn!("Browser kill did not complete within {}ms", grace.as_millis()),
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(50);

    fn lifecycle(events: &[(&str, &str)]) -> impl Stream<Item = (FrameId, String)> + Unpin {
        let events: Vec<_> = events
            .iter()
            .map(|(frame, name)| (FrameId::new(*frame), name.to_string()))
            .collect();
        futures_util::stream::iter(events)
    }

    #[tokio::test]
    async fn idle_counts_only_after_main_frame_init() {
        let main = FrameId::new("main");
        let events = lifecycle(&[
            ("main", NETWORK_IDLE),
            ("ad", "init"),
            ("ad", NETWORK_IDLE),
            ("main", "init"),
            ("main", "load"),
            ("main", NETWORK_IDLE),
        ]);
        assert!(wait_for_network_idle(events, Some(&main)).await.is_ok());
    }

    #[tokio::test]
    async fn stale_idle_is_not_settled() {
        let main = FrameId::new("main");
        let events = lifecycle(&[("main", NETWORK_IDLE), ("main", "init"), ("main", "load")]);
        assert!(matches!(
            wait_for_network_idle(events, Some(&main)).await,
            Err(AppError::Navigation(_))
        ));
    }

    #[tokio::test]
    async fn subframe_idle_is_not_settled() {
        let main = FrameId::new("main");
        let events = lifecycle(&[("main", "init"), ("ad", "init"), ("ad", NETWORK_IDLE)]);
        assert!(wait_for_network_idle(events, Some(&main)).await.is_err());
    }

    #[derive(Default)]
    struct FakeProcess {
        close_fails: bool,
        close_hangs: bool,
        never_exits: bool,
        kills: usize,
    }

    #[async_trait]
    impl BrowserProcess for FakeProcess {
        async fn request_close(&mut self) -> Result<()> {
            if self.close_hangs {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.close_fails {
                return Err(AppError::Navigation("connection to browser lost".to_string()));
            }
            Ok(())
        }

        async fn wait_exit(&mut self) -> std::io::Result<()> {
            if self.never_exits {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(())
        }

        async fn force_kill(&mut self) -> Option<std::io::Result<()>> {
            self.kills += 1;
            Some(Ok(()))
        }
    }

    #[tokio::test]
    async fn clean_exit_needs_no_kill() {
        let mut process = FakeProcess::default();
        assert!(shutdown(&mut process, GRACE).await.is_ok());
        assert_eq!(process.kills, 0);
    }

    #[tokio::test]
    async fn failed_close_kills_without_waiting() {
        let mut process = FakeProcess {
            close_fails: true,
            never_exits: true,
            ..Default::default()
        };
        let started = std::time::Instant::now();
        assert!(shutdown(&mut process, GRACE).await.is_err());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(process.kills, 1);
    }

    #[tokio::test]
    async fn process_that_never_exits_is_killed() {
        let mut process = FakeProcess {
            never_exits: true,
            ..Default::default()
        };
        let started = std::time::Instant::now();
        assert!(shutdown(&mut process, GRACE).await.is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(process.kills, 1);
    }

    #[tokio::test]
    async fn unanswered_close_is_bounded_and_killed() {
        let mut process = FakeProcess {
            close_hangs: true,
            ..Default::default()
        };
        let started = std::time::Instant::now();
        assert!(shutdown(&mut process, GRACE).await.is_err());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(process.kills, 1);
    }
}
