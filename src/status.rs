use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Warning,
    Error,
}

impl StatusKind {
    /// CSS modifier the page uses for the message box.
    pub fn css_class(&self) -> &'static str {
        match self {
            StatusKind::Success => "success",
            StatusKind::Warning => "warning",
            StatusKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// The form's status line. Each message hides itself after the dismiss
/// delay unless a newer message replaced it first.
pub struct StatusBoard {
    current: Arc<watch::Sender<Option<StatusMessage>>>,
    generation: Arc<AtomicU64>,
    dismiss_after: Duration,
}

impl StatusBoard {
    pub fn new(dismiss_after: Duration) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current: Arc::new(current),
            generation: Arc::new(AtomicU64::new(0)),
            dismiss_after,
        }
    }

    /// Show `message` now and schedule its dismissal. Outside a tokio runtime
    /// the message is shown but not dismissed. Never waits for the timer.
    pub fn show(&self, message: StatusMessage) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(kind = message.kind.css_class(), text = %message.text, "status shown");
        self.current.send_replace(Some(message));

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, status stays until replaced");
            return;
        };
        let current = self.current.clone();
        let latest = self.generation.clone();
        let delay = self.dismiss_after;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if latest.load(Ordering::SeqCst) == generation {
                current.send_replace(None);
            }
        });
    }

    pub fn current(&self) -> Option<StatusMessage> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.current.subscribe()
    }
}
