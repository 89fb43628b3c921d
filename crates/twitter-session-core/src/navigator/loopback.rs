// ============================================================================
// LoopbackNavigator - system browser + local callback listener
// ============================================================================
// Opens the authorization page in the user's browser and listens on the
// callback address for the redirect. Each request reaching the listener is
// reported as a navigation attempt.
// ============================================================================

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server, StatusCode};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{NavigationDecision, NavigationSink, WebNavigator};
use crate::config::SessionConfig;

/// How long to wait for the redirect before giving up
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll interval of the listener loop (checks for dismissal)
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Error codes passed to `on_load_error` and `on_abort`
pub const ERROR_BIND: i32 = -1;
pub const ERROR_BROWSER: i32 = -2;
pub const ERROR_TIMEOUT: i32 = -8;

const HANDLED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Twitter authorization</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 20vh">
    <h1>Authorization received</h1>
    <p>You can close this window and return to the application.</p>
</body>
</html>
"#;

pub struct LoopbackNavigator {
    bind_addr: SocketAddr,
    runtime: Handle,
    timeout: Duration,
    open_browser: bool,
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl LoopbackNavigator {
    pub fn new(bind_addr: SocketAddr, runtime: Handle) -> Self {
        Self {
            bind_addr,
            runtime,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            open_browser: true,
            active: Mutex::new(None),
        }
    }

    /// Listen on the address of the configured callback URL
    pub fn from_config(config: &SessionConfig, runtime: Handle) -> Result<Self> {
        Ok(Self::new(config.callback_bind_addr()?, runtime))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Only log the authorization URL instead of launching a browser
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    fn replace_active(&self, next: Option<Arc<AtomicBool>>) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.store(true, Ordering::SeqCst);
        }
        *active = next;
    }
}

impl WebNavigator for LoopbackNavigator {
    fn load(&self, url: &str, sink: NavigationSink) {
        // Listen before the browser can possibly redirect
        let server = match Server::http(self.bind_addr) {
            Ok(server) => server,
            Err(e) => {
                warn!("Failed to start callback server on {}: {}", self.bind_addr, e);
                sink.on_abort(url, ERROR_BIND, &format!("cannot listen on {}: {}", self.bind_addr, e));
                return;
            }
        };
        info!("Waiting for OAuth callback on {}", self.bind_addr);

        if self.open_browser {
            if let Err(e) = open::that(url) {
                warn!("Failed to open browser: {}", e);
                sink.on_load_error(url, ERROR_BROWSER, &format!("cannot open browser: {}", e));
            }
        }
        info!("Authorize this application at: {}", url);

        let stop = Arc::new(AtomicBool::new(false));
        self.replace_active(Some(Arc::clone(&stop)));

        let origin = format!("http://{}", self.bind_addr);
        let deadline = Instant::now() + self.timeout;
        self.runtime
            .spawn_blocking(move || serve(server, sink, origin, deadline, stop));
    }

    fn dismiss(&self) {
        debug!("Dismissing loopback navigator");
        self.replace_active(None);
    }
}

fn serve(
    server: Server,
    sink: NavigationSink,
    origin: String,
    deadline: Instant,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::SeqCst) || !sink.is_attached() {
            debug!("Callback listener stopped");
            return;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("Timed out waiting for OAuth callback");
            sink.on_abort(&origin, ERROR_TIMEOUT, "timed out waiting for the authorization redirect");
            return;
        }

        let request = match server.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                warn!("Callback server error: {}", e);
                sink.on_abort(&origin, ERROR_BIND, &e.to_string());
                return;
            }
        };

        let target = format!("{}{}", origin, request.url());
        debug!("Received callback: {}", target);

        match sink.on_navigation(&target) {
            NavigationDecision::Handled => {
                let mut response = Response::from_string(HANDLED_PAGE);
                if let Ok(header) =
                    Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
                {
                    response.add_header(header);
                }
                if let Err(e) = request.respond(response) {
                    debug!("Failed to answer browser: {}", e);
                }
                return;
            }
            NavigationDecision::Proceed => {
                let response = Response::from_string("Not found").with_status_code(StatusCode(404));
                let _ = request.respond(response);
            }
        }
    }
}
