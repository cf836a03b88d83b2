use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::clock::{self, Clock, SystemClock};
use crate::config::Config;
use crate::engine::{Availability, BookingStore};
use crate::model::*;
use crate::notify::{EmailJsNotifier, Notifier, UnconfiguredNotifier};
use crate::observability;
use crate::status::{StatusBoard, StatusMessage};
use crate::storage::{FileStorage, KeyValueStore, MemoryStorage};
use crate::workflow::{SubmissionOutcome, SubmissionRequest, SubmissionWorkflow};

/// Everything the booking page calls into.
pub struct BookingSite {
    store: Arc<BookingStore>,
    workflow: SubmissionWorkflow,
    status: Arc<StatusBoard>,
}

impl BookingSite {
    pub fn new(
        store: Arc<BookingStore>,
        notifier: Arc<dyn Notifier>,
        status_dismiss: Duration,
        dispatch_timeout: Option<Duration>,
    ) -> Self {
        let status = Arc::new(StatusBoard::new(status_dismiss));
        let workflow =
            SubmissionWorkflow::new(store.clone(), notifier, status.clone(), dispatch_timeout);
        Self {
            store,
            workflow,
            status,
        }
    }

    /// Wire up logging, storage and notifier from `config`. A data directory
    /// that cannot be opened degrades to in-memory storage.
    pub fn open(config: &Config) -> Self {
        observability::init_tracing();
        let storage: Arc<dyn KeyValueStore> = match FileStorage::open(config.data_dir.clone()) {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                warn!(
                    data_dir = %config.data_dir.display(),
                    "storage unavailable, bookings will not survive a restart: {e}"
                );
                Arc::new(MemoryStorage::new())
            }
        };
        let notifier: Arc<dyn Notifier> = match &config.emailjs {
            Some(ej) => Arc::new(EmailJsNotifier::with_endpoint(
                ej.endpoint.clone(),
                ej.service_id.clone(),
                ej.template_id.clone(),
                ej.public_key.clone(),
            )),
            None => {
                warn!("no EmailJS credentials, submissions will fail to send");
                Arc::new(UnconfiguredNotifier)
            }
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(BookingStore::load(storage, config.layout, clock));
        info!(
            data_dir = %config.data_dir.display(),
            layout = %config.layout,
            "booking site ready"
        );
        Self::new(store, notifier, config.status_dismiss, config.dispatch_timeout)
    }

    /// Free slot labels for `date`, in catalog order.
    pub async fn get_available_times(&self, date: DateKey) -> Vec<String> {
        self.store.availability(date).await.labels()
    }

    pub async fn availability(&self, date: DateKey) -> Availability {
        self.store.availability(date).await
    }

    pub async fn is_time_booked(&self, date: DateKey, slot: Slot) -> bool {
        self.store.is_booked(date, slot).await
    }

    pub async fn add_booking(&self, date: DateKey, slot: Slot, client: ClientInfo) -> bool {
        self.store.add(date, slot, client).await
    }

    pub async fn remove_booking(&self, date: DateKey, slot: Slot) -> bool {
        self.store.remove(date, slot).await
    }

    pub async fn clear_all_bookings(&self) -> bool {
        self.store.clear_all().await
    }

    pub async fn submit(&self, request: SubmissionRequest) -> SubmissionOutcome {
        self.workflow.submit(request).await
    }

    /// Earliest date the date picker offers.
    pub fn min_date(&self) -> DateKey {
        clock::min_selectable_date(self.store.clock())
    }

    pub fn status(&self) -> Option<StatusMessage> {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.status.subscribe()
    }

    pub fn is_submitting(&self) -> bool {
        self.workflow.is_submitting()
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }

    pub fn workflow(&self) -> &SubmissionWorkflow {
        &self.workflow
    }
}
