//! ============================================================================
//! Web Navigator - the browsing surface that presents the authorization page
//! ============================================================================
//! The handshake controller hands a URL to a `WebNavigator` and receives
//! navigation attempts back through a `NavigationSink`. The navigator owns
//! presentation only; every decision about a redirect is the controller's.
//! ============================================================================

mod loopback;

pub use loopback::LoopbackNavigator;

use std::sync::{Arc, Weak};
use tracing::debug;

/// Answer to a reported navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Let the navigation continue unmodified
    Proceed,
    /// The controller consumed the navigation; do not follow it
    Handled,
}

/// Browsing surface used to show the authorization page
pub trait WebNavigator: Send + Sync {
    /// Start presenting `url`. Every navigation attempt and load failure
    /// from then on is reported through `sink`. A navigator that can no
    /// longer report redirects must say so with `NavigationSink::on_abort`.
    fn load(&self, url: &str, sink: NavigationSink);

    /// Close the surface once the flow has reached a terminal phase
    fn dismiss(&self) {}
}

/// Receiver of navigator events (implemented by the handshake controller)
pub(crate) trait NavigationHandler: Send + Sync {
    fn on_navigation(self: Arc<Self>, url: &str) -> NavigationDecision;
    fn on_load_error(&self, url: &str, code: i32, description: &str);
    fn on_abort(&self, url: &str, code: i32, description: &str);
}

/// Event channel from a navigator back to the flow that loaded it.
///
/// Holds the flow weakly: once the flow is gone every navigation proceeds
/// and load errors are dropped.
#[derive(Clone)]
pub struct NavigationSink {
    handler: Weak<dyn NavigationHandler>,
}

impl NavigationSink {
    pub(crate) fn new(handler: Weak<dyn NavigationHandler>) -> Self {
        Self { handler }
    }

    /// Report a navigation attempt to `url`
    pub fn on_navigation(&self, url: &str) -> NavigationDecision {
        match self.handler.upgrade() {
            Some(handler) => handler.on_navigation(url),
            None => {
                debug!("Navigation after handshake was dropped: {}", url);
                NavigationDecision::Proceed
            }
        }
    }

    /// Report that `url` failed to load
    pub fn on_load_error(&self, url: &str, code: i32, description: &str) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_load_error(url, code, description);
        }
    }

    /// Report that the navigator stopped for good; no redirect can follow
    pub fn on_abort(&self, url: &str, code: i32, description: &str) {
        match self.handler.upgrade() {
            Some(handler) => handler.on_abort(url, code, description),
            None => debug!("Navigator abort after handshake was dropped: {}", url),
        }
    }

    /// False once the flow that created this sink no longer exists
    pub fn is_attached(&self) -> bool {
        self.handler.strong_count() > 0
    }
}
