use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore, SemaphorePermit};
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

use crate::engine::{Availability, BookingStore};
use crate::limits::*;
use crate::model::*;
use crate::notify::{DispatchError, DispatchReceipt, NotificationPayload, Notifier};
use crate::observability::{DISPATCH_DURATION_SECONDS, SUBMISSIONS_TOTAL};
use crate::status::{StatusBoard, StatusKind, StatusMessage};

// ── Request ──────────────────────────────────────────────────────

/// A submitted booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub date: DateKey,
    pub slot: Slot,
    pub client: ClientInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Phone,
    Email,
    SessionType,
    Message,
}

impl FormField {
    fn as_str(&self) -> &'static str {
        match self {
            FormField::Name => "name",
            FormField::Phone => "phone",
            FormField::Email => "email",
            FormField::SessionType => "session type",
            FormField::Message => "message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    Missing(FormField),
    TooLong(FormField),
    MalformedEmail,
}

impl std::fmt::Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::Missing(field) => write!(f, "{} is required", field.as_str()),
            FormError::TooLong(field) => write!(f, "{} is too long", field.as_str()),
            FormError::MalformedEmail => write!(f, "email address is not valid"),
        }
    }
}

impl std::error::Error for FormError {}

/// `local@domain.tld`: one `@`, no whitespace, a dot inside the domain.
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

impl SubmissionRequest {
    pub fn new(date: DateKey, slot: Slot, client: ClientInfo) -> Self {
        Self { date, slot, client }
    }

    /// Field checks the form would otherwise enforce in the page.
    pub fn validate(&self) -> Result<(), FormError> {
        let c = &self.client;
        let required = [
            (FormField::Name, c.name.trim(), MAX_NAME_LEN),
            (FormField::Phone, c.phone.trim(), MAX_PHONE_LEN),
            (FormField::Email, c.email.trim(), MAX_EMAIL_LEN),
        ];
        for (field, value, max) in required {
            if value.is_empty() {
                return Err(FormError::Missing(field));
            }
            if value.chars().count() > max {
                return Err(FormError::TooLong(field));
            }
        }
        if c.session_type.chars().count() > MAX_SESSION_TYPE_LEN {
            return Err(FormError::TooLong(FormField::SessionType));
        }
        if c
            .message
            .as_ref()
            .is_some_and(|m| m.chars().count() > MAX_MESSAGE_LEN)
        {
            return Err(FormError::TooLong(FormField::Message));
        }
        if !looks_like_email(c.email.trim()) {
            return Err(FormError::MalformedEmail);
        }
        Ok(())
    }
}

// ── Outcome ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Dispatching,
    Committing,
}

/// Terminal result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Notification sent and slot reserved.
    Booked {
        receipt: DispatchReceipt,
        availability: Availability,
    },
    /// Slot was already booked at submission time. Nothing was sent.
    SlotTaken { availability: Availability },
    /// Notification failed. Nothing was stored.
    DispatchFailed { error: DispatchError },
    /// Notification went out but the slot could not be reserved; the
    /// provider has to reconcile by hand.
    CommitFailedAfterDispatch { receipt: DispatchReceipt },
    Invalid(FormError),
    /// Another submission is still dispatching or committing.
    Busy,
}

impl SubmissionOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Booked { .. } => "booked",
            SubmissionOutcome::SlotTaken { .. } => "slot_taken",
            SubmissionOutcome::DispatchFailed { .. } => "dispatch_failed",
            SubmissionOutcome::CommitFailedAfterDispatch { .. } => "commit_failed_after_dispatch",
            SubmissionOutcome::Invalid(_) => "invalid",
            SubmissionOutcome::Busy => "busy",
        }
    }

    pub fn is_booked(&self) -> bool {
        matches!(self, SubmissionOutcome::Booked { .. })
    }

    /// Fresh availability to render, when the outcome carries one.
    pub fn availability(&self) -> Option<&Availability> {
        match self {
            SubmissionOutcome::Booked { availability, .. }
            | SubmissionOutcome::SlotTaken { availability } => Some(availability),
            _ => None,
        }
    }

    /// Message for the status line. `Busy` has none: the submit control is
    /// already disabled.
    pub fn status_message(&self) -> Option<StatusMessage> {
        let (kind, text) = match self {
            SubmissionOutcome::Booked { .. } => (
                StatusKind::Success,
                "Your request has been sent! I will contact you shortly to confirm.".to_string(),
            ),
            SubmissionOutcome::SlotTaken { .. } => (
                StatusKind::Error,
                "Sorry, this time is already taken. Please choose another time.".to_string(),
            ),
            SubmissionOutcome::DispatchFailed { .. } => (
                StatusKind::Error,
                "Your request could not be sent. Please try again or contact me directly."
                    .to_string(),
            ),
            SubmissionOutcome::CommitFailedAfterDispatch { .. } => (
                StatusKind::Warning,
                "Your request was sent, but the booking could not be saved.".to_string(),
            ),
            SubmissionOutcome::Invalid(e) => {
                (StatusKind::Error, format!("Please check the form: {e}."))
            }
            SubmissionOutcome::Busy => return None,
        };
        Some(StatusMessage::new(kind, text))
    }
}

// ── Workflow ─────────────────────────────────────────────────────

/// Validate → dispatch → commit for booking form submissions.
///
/// A booking is only committed after the notification was acknowledged.
pub struct SubmissionWorkflow {
    store: Arc<BookingStore>,
    notifier: Arc<dyn Notifier>,
    status: Arc<StatusBoard>,
    /// Held from Validating until Idle; stands for the disabled submit control.
    gate: Semaphore,
    phase: watch::Sender<Phase>,
    dispatch_timeout: Option<Duration>,
}

impl SubmissionWorkflow {
    pub fn new(
        store: Arc<BookingStore>,
        notifier: Arc<dyn Notifier>,
        status: Arc<StatusBoard>,
        dispatch_timeout: Option<Duration>,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            store,
            notifier,
            status,
            gate: Semaphore::new(1),
            phase,
            dispatch_timeout,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// True while a submission holds the submit control.
    pub fn is_submitting(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// Run one submission to its terminal outcome and post the status message.
    pub async fn submit(&self, request: SubmissionRequest) -> SubmissionOutcome {
        let submission_id = Ulid::new();
        let span = info_span!(
            "submission",
            id = %submission_id,
            date = %request.date,
            slot = %request.slot
        );
        let outcome = self.run(&request).instrument(span).await;

        metrics::counter!(SUBMISSIONS_TOTAL, "outcome" => outcome.label()).increment(1);
        info!(id = %submission_id, outcome = outcome.label(), "submission finished");
        if let Some(message) = outcome.status_message() {
            self.status.show(message);
        }
        outcome
    }

    async fn run(&self, request: &SubmissionRequest) -> SubmissionOutcome {
        let Ok(permit) = self.gate.try_acquire() else {
            debug!("submission already in flight");
            return SubmissionOutcome::Busy;
        };
        let mut in_flight = InFlight {
            workflow: self,
            _permit: permit,
            settled: false,
        };
        let outcome = self.run_gated(request).await;
        in_flight.settled = true;
        outcome
    }

    async fn run_gated(&self, request: &SubmissionRequest) -> SubmissionOutcome {
        let (date, slot) = (request.date, request.slot);

        self.enter(Phase::Validating);
        if let Err(e) = request.validate() {
            debug!("rejected form: {e}");
            return SubmissionOutcome::Invalid(e);
        }
        // Another tab may have booked since this page loaded.
        self.store.reload().await;
        if self.store.is_booked(date, slot).await {
            info!("slot already taken");
            return SubmissionOutcome::SlotTaken {
                availability: self.store.availability(date).await,
            };
        }

        self.enter(Phase::Dispatching);
        let payload = NotificationPayload::new(date, slot, &request.client);
        let receipt = match self.dispatch(&payload).await {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!("notification failed: {error}");
                return SubmissionOutcome::DispatchFailed { error };
            }
        };
        info!(status = receipt.status, "notification sent");

        self.enter(Phase::Committing);
        self.store.reload().await;
        if self.store.add(date, slot, request.client.clone()).await {
            SubmissionOutcome::Booked {
                receipt,
                availability: self.store.availability(date).await,
            }
        } else {
            warn!("notification sent but booking not saved");
            SubmissionOutcome::CommitFailedAfterDispatch { receipt }
        }
    }

    async fn dispatch(&self, payload: &NotificationPayload) -> Result<DispatchReceipt, DispatchError> {
        let started = Instant::now();
        let result = match self.dispatch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.notifier.send(payload))
                .await
                .unwrap_or(Err(DispatchError::TimedOut {
                    after_ms: limit.as_millis() as u64,
                })),
            None => self.notifier.send(payload).await,
        };
        metrics::histogram!(DISPATCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }

    /// Status for a submission whose future was dropped mid-flight. The
    /// notification may or may not have gone out.
    fn interrupted(&self) {
        warn!(phase = ?self.phase(), "submission dropped before finishing");
        metrics::counter!(SUBMISSIONS_TOTAL, "outcome" => "interrupted").increment(1);
        self.status.show(StatusMessage::new(
            StatusKind::Warning,
            "Your request was interrupted. Please check your email before sending it again.",
        ));
    }

    fn enter(&self, phase: Phase) {
        debug!(?phase, "phase");
        self.phase.send_replace(phase);
    }
}

/// Submit permit. Dropping it returns the workflow to Idle before the permit
/// is released, also when the submitting future is cancelled.
struct InFlight<'a> {
    workflow: &'a SubmissionWorkflow,
    _permit: SemaphorePermit<'a>,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.workflow.interrupted();
        }
        self.workflow.enter(Phase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, phone: &str, email: &str) -> SubmissionRequest {
        SubmissionRequest::new(
            "2025-06-01".parse().unwrap(),
            "10:00".parse().unwrap(),
            ClientInfo {
                name: name.into(),
                phone: phone.into(),
                email: email.into(),
                session_type: "individual".into(),
                message: None,
            },
        )
    }

    #[test]
    fn valid_form_passes() {
        assert_eq!(request("A", "123", "a@example.com").validate(), Ok(()));
    }

    #[test]
    fn missing_fields() {
        assert_eq!(
            request(" ", "123", "a@example.com").validate(),
            Err(FormError::Missing(FormField::Name))
        );
        assert_eq!(
            request("A", "", "a@example.com").validate(),
            Err(FormError::Missing(FormField::Phone))
        );
        assert_eq!(
            request("A", "123", "").validate(),
            Err(FormError::Missing(FormField::Email))
        );
    }

    #[test]
    fn too_long_fields() {
        let long_name = "n".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            request(&long_name, "123", "a@example.com").validate(),
            Err(FormError::TooLong(FormField::Name))
        );
        let mut r = request("A", "123", "a@example.com");
        r.client.message = Some("m".repeat(MAX_MESSAGE_LEN + 1));
        assert_eq!(r.validate(), Err(FormError::TooLong(FormField::Message)));
    }

    #[test]
    fn limits_count_characters() {
        let cyrillic = "Ж".repeat(MAX_NAME_LEN);
        assert_eq!(request(&cyrillic, "123", "a@example.com").validate(), Ok(()));
        let over = "Ж".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            request(&over, "123", "a@example.com").validate(),
            Err(FormError::TooLong(FormField::Name))
        );
    }

    #[test]
    fn email_shape() {
        for bad in ["plain", "@example.com", "a@", "a@b", "a@@b.c", "a b@c.d", "a@.com", "a@b."] {
            assert_eq!(
                request("A", "123", bad).validate(),
                Err(FormError::MalformedEmail),
                "{bad}"
            );
        }
        for good in ["a@b.co", "first.last@mail.example.org", "x+tag@sub.domain.ua"] {
            assert!(request("A", "123", good).validate().is_ok(), "{good}");
        }
    }

    #[test]
    fn outcome_status_kinds() {
        let receipt = DispatchReceipt {
            status: 200,
            text: "OK".into(),
        };
        let availability = Availability::new("2025-06-01".parse().unwrap(), vec![]);
        let kind = |o: SubmissionOutcome| o.status_message().map(|m| m.kind);
        assert_eq!(
            kind(SubmissionOutcome::Booked {
                receipt: receipt.clone(),
                availability: availability.clone()
            }),
            Some(StatusKind::Success)
        );
        assert_eq!(
            kind(SubmissionOutcome::CommitFailedAfterDispatch { receipt }),
            Some(StatusKind::Warning)
        );
        assert_eq!(
            kind(SubmissionOutcome::SlotTaken { availability }),
            Some(StatusKind::Error)
        );
        assert_eq!(
            kind(SubmissionOutcome::DispatchFailed {
                error: DispatchError::NotConfigured
            }),
            Some(StatusKind::Error)
        );
        assert_eq!(kind(SubmissionOutcome::Busy), None);
    }
}
