use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::limits::EMPTY_MESSAGE_PLACEHOLDER;
use crate::model::{ClientInfo, DateKey, Slot};

pub const EMAILJS_DEFAULT_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Flat template parameters describing one booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub from_name: String,
    pub from_email: String,
    pub phone: String,
    pub date: String,
    pub time: String,
    pub session_type: String,
    pub message: String,
}

impl NotificationPayload {
    pub fn new(date: DateKey, slot: Slot, client: &ClientInfo) -> Self {
        let message = client
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(EMPTY_MESSAGE_PLACEHOLDER)
            .to_string();
        Self {
            from_name: client.name.clone(),
            from_email: client.email.clone(),
            phone: client.phone.clone(),
            date: date.to_string(),
            time: slot.to_string(),
            session_type: client.session_type.clone(),
            message,
        }
    }
}

/// Acknowledgment from the messaging service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub status: u16,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Request never got a response.
    Transport(String),
    /// Service answered with a non-success status.
    Rejected { status: u16, body: String },
    TimedOut { after_ms: u64 },
    NotConfigured,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Transport(e) => write!(f, "transport error: {e}"),
            DispatchError::Rejected { status, body } => {
                write!(f, "rejected with status {status}: {body}")
            }
            DispatchError::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            DispatchError::NotConfigured => write!(f, "no notification service configured"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Sends booking notifications. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<DispatchReceipt, DispatchError>;
}

// ── EmailJS ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmailJsRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a NotificationPayload,
}

/// Sends the payload through an EmailJS service/template pair.
pub struct EmailJsNotifier {
    http: reqwest::Client,
    endpoint: String,
    service_id: String,
    template_id: String,
    public_key: String,
}

impl EmailJsNotifier {
    pub fn new(service_id: String, template_id: String, public_key: String) -> Self {
        Self::with_endpoint(EMAILJS_DEFAULT_ENDPOINT.to_string(), service_id, template_id, public_key)
    }

    pub fn with_endpoint(
        endpoint: String,
        service_id: String,
        template_id: String,
        public_key: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            service_id,
            template_id,
            public_key,
        }
    }

    fn request_body<'a>(&'a self, payload: &'a NotificationPayload) -> EmailJsRequest<'a> {
        EmailJsRequest {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: &self.public_key,
            template_params: payload,
        }
    }
}

#[async_trait]
impl Notifier for EmailJsNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<DispatchReceipt, DispatchError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request_body(payload))
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        debug!(status = status.as_u16(), "emailjs responded");
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(DispatchReceipt {
            status: status.as_u16(),
            text,
        })
    }
}

/// Stand-in when no messaging service is configured. Every dispatch fails,
/// so nothing is ever booked without a notification.
#[derive(Debug, Default)]
pub struct UnconfiguredNotifier;

#[async_trait]
impl Notifier for UnconfiguredNotifier {
    async fn send(&self, _payload: &NotificationPayload) -> Result<DispatchReceipt, DispatchError> {
        Err(DispatchError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(message: Option<&str>) -> ClientInfo {
        ClientInfo {
            name: "Olena".into(),
            phone: "+380501234567".into(),
            email: "olena@example.com".into(),
            session_type: "individual".into(),
            message: message.map(Into::into),
        }
    }

    #[test]
    fn payload_fields() {
        let p = NotificationPayload::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            &client(Some("first visit")),
        );
        assert_eq!(p.from_name, "Olena");
        assert_eq!(p.from_email, "olena@example.com");
        assert_eq!(p.date, "2025-06-01");
        assert_eq!(p.time, "10:00");
        assert_eq!(p.session_type, "individual");
        assert_eq!(p.message, "first visit");
    }

    #[test]
    fn empty_message_gets_placeholder() {
        for msg in [None, Some(""), Some("   ")] {
            let p = NotificationPayload::new(
                "2025-06-01".parse().unwrap(),
                "10:00".parse().unwrap(),
                &client(msg),
            );
            assert_eq!(p.message, EMPTY_MESSAGE_PLACEHOLDER);
        }
    }

    #[test]
    fn emailjs_body_shape() {
        let notifier = EmailJsNotifier::new("service_x".into(), "template_y".into(), "pk".into());
        let payload = NotificationPayload::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            &client(None),
        );
        let body = serde_json::to_value(notifier.request_body(&payload)).unwrap();
        assert_eq!(body["service_id"], "service_x");
        assert_eq!(body["template_id"], "template_y");
        assert_eq!(body["user_id"], "pk");
        assert_eq!(body["template_params"]["from_name"], "Olena");
        assert_eq!(body["template_params"]["time"], "10:00");
    }

    #[tokio::test]
    async fn unconfigured_always_fails() {
        let payload = NotificationPayload::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            &client(None),
        );
        assert_eq!(
            UnconfiguredNotifier.send(&payload).await,
            Err(DispatchError::NotConfigured)
        );
    }

    /// Serve one canned HTTP response on a loopback port, returning the
    /// endpoint URL and the raw request received.
    async fn one_shot_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}/api/v1.0/email/send"), handle)
    }

    #[tokio::test]
    async fn emailjs_success_returns_receipt() {
        let (endpoint, server) = one_shot_server("HTTP/1.1 200 OK", "OK").await;
        let notifier = EmailJsNotifier::with_endpoint(endpoint, "svc".into(), "tpl".into(), "pk".into());
        let payload = NotificationPayload::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            &client(Some("hello")),
        );
        let receipt = notifier.send(&payload).await.unwrap();
        assert_eq!(receipt, DispatchReceipt { status: 200, text: "OK".into() });

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1.0/email/send"));
        assert!(request.contains("\"template_id\":\"tpl\""));
        assert!(request.contains("\"message\":\"hello\""));
    }

    #[tokio::test]
    async fn emailjs_error_status_is_rejected() {
        let (endpoint, _server) =
            one_shot_server("HTTP/1.1 400 Bad Request", "The user ID is invalid").await;
        let notifier = EmailJsNotifier::with_endpoint(endpoint, "svc".into(), "tpl".into(), "bad".into());
        let payload = NotificationPayload::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            &client(None),
        );
        match notifier.send(&payload).await {
            Err(DispatchError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "The user ID is invalid");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emailjs_unreachable_endpoint_is_transport_error() {
        // Port 9 on loopback: nothing listens there.
        let notifier = EmailJsNotifier::with_endpoint(
            "http://127.0.0.1:9/api/v1.0/email/send".into(),
            "s".into(),
            "t".into(),
            "k".into(),
        );
        let payload = NotificationPayload::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            &client(None),
        );
        assert!(matches!(
            notifier.send(&payload).await,
            Err(DispatchError::Transport(_))
        ));
    }
}
