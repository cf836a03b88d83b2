use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::engine::PersistLayout;
use crate::limits::STATUS_DISMISS_MS;
use crate::notify::EMAILJS_DEFAULT_ENDPOINT;

/// EmailJS service/template/public-key triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailJsConfig {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub layout: PersistLayout,
    /// None when any of the three EmailJS ids is missing.
    pub emailjs: Option<EmailJsConfig>,
    pub dispatch_timeout: Option<Duration>,
    pub status_dismiss: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            layout: PersistLayout::default(),
            emailjs: None,
            dispatch_timeout: None,
            status_dismiss: Duration::from_millis(STATUS_DISMISS_MS),
        }
    }
}

impl Config {
    /// Read `SLOTBOOK_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("SLOTBOOK_DATA_DIR").unwrap_or_else(|| "./data".into());
        let layout = match var("SLOTBOOK_LAYOUT") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("ignoring SLOTBOOK_LAYOUT: {e}");
                PersistLayout::default()
            }),
            None => PersistLayout::default(),
        };
        let dispatch_timeout = var("SLOTBOOK_DISPATCH_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis);
        let status_dismiss_ms: u64 = var("SLOTBOOK_STATUS_DISMISS_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(STATUS_DISMISS_MS);

        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let emailjs = match (
            non_empty("SLOTBOOK_EMAILJS_SERVICE_ID"),
            non_empty("SLOTBOOK_EMAILJS_TEMPLATE_ID"),
            non_empty("SLOTBOOK_EMAILJS_PUBLIC_KEY"),
        ) {
            (Some(service_id), Some(template_id), Some(public_key)) => Some(EmailJsConfig {
                service_id,
                template_id,
                public_key,
                endpoint: non_empty("SLOTBOOK_EMAILJS_ENDPOINT")
                    .unwrap_or_else(|| EMAILJS_DEFAULT_ENDPOINT.into()),
            }),
            (None, None, None) => None,
            _ => {
                warn!("EmailJS partially configured; notifications disabled");
                None
            }
        };

        Self {
            data_dir: PathBuf::from(data_dir),
            layout,
            emailjs,
            dispatch_timeout,
            status_dismiss: Duration::from_millis(status_dismiss_ms),
        }
    }
}
