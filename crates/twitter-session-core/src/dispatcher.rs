//! ============================================================================
//! Callback Dispatcher - Ordered delivery of session state changes
//! ============================================================================
//! A single consumer task drains an unbounded queue and hands each state to
//! the registered observer, one at a time. Producers never block and never
//! run observer code themselves.
//! ============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::types::SessionState;

/// Receiver of accepted session states
pub trait SessionObserver: Send + Sync + 'static {
    fn on_state_changed(&self, state: &SessionState);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionState) + Send + Sync + 'static,
{
    fn on_state_changed(&self, state: &SessionState) {
        self(state)
    }
}

enum Delivery {
    State(SessionState),
    Flush(oneshot::Sender<()>),
}

pub struct CallbackDispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl CallbackDispatcher {
    /// Start the delivery task on `runtime`
    pub fn spawn(runtime: &Handle, observer: Arc<dyn SessionObserver>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(Self::run(observer, rx));
        Self { tx }
    }

    /// Queue a state for delivery. Never blocks.
    pub fn dispatch(&self, state: SessionState) {
        debug!("Dispatching state: {}", state.kind());
        if self.tx.send(Delivery::State(state)).is_err() {
            warn!("Callback dispatcher stopped, dropping notification");
        }
    }

    /// Resolve once every state queued before this call was delivered
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Delivery::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    async fn run(observer: Arc<dyn SessionObserver>, mut rx: mpsc::UnboundedReceiver<Delivery>) {
        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::State(state) => {
                    let kind = state.kind();
                    let delivered =
                        catch_unwind(AssertUnwindSafe(|| observer.on_state_changed(&state)));
                    if delivered.is_err() {
                        error!("Session observer panicked while handling {}", kind);
                    }
                }
                Delivery::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Callback dispatcher finished");
    }
}
