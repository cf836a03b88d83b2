mod availability;
mod error;
mod mutations;
mod persist;
mod queries;

pub use availability::{Availability, available_slots};
pub use error::StoreError;
pub use persist::PersistLayout;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::model::*;
use crate::storage::{KeyValueStore, MemoryStorage};

/// Booked slots and client records, persisted after every mutation.
///
/// One store per page session. Stores sharing a storage (several tabs) do not
/// see each other's writes until [`BookingStore::reload`].
pub struct BookingStore {
    state: RwLock<BookingState>,
    storage: Arc<dyn KeyValueStore>,
    layout: PersistLayout,
    clock: Arc<dyn Clock>,
}

impl BookingStore {
    /// Load persisted state. Never fails: unreadable or malformed storage
    /// is logged and the store starts empty.
    pub fn load(storage: Arc<dyn KeyValueStore>, layout: PersistLayout, clock: Arc<dyn Clock>) -> Self {
        let state = match persist::read_state(storage.as_ref(), layout) {
            Ok(state) => {
                info!(bookings = state.booking_count(), %layout, "booking store loaded");
                state
            }
            Err(e) => {
                warn!("error loading bookings, starting empty: {e}");
                BookingState::default()
            }
        };
        Self {
            state: RwLock::new(state),
            storage,
            layout,
            clock,
        }
    }

    /// Empty store over fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self::load(
            Arc::new(MemoryStorage::new()),
            PersistLayout::default(),
            Arc::new(SystemClock),
        )
    }

    pub fn layout(&self) -> PersistLayout {
        self.layout
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Replace in-memory state with what storage holds now, picking up writes
    /// from other stores on the same storage. On a read error the current
    /// state is kept and false is returned.
    pub async fn reload(&self) -> bool {
        // Read under the write lock so a concurrent mutation cannot persist
        // between the read and the swap.
        let mut guard = self.state.write().await;
        match persist::read_state(self.storage.as_ref(), self.layout) {
            Ok(fresh) => {
                *guard = fresh;
                true
            }
            Err(e) => {
                warn!("reload failed, keeping in-memory bookings: {e}");
                false
            }
        }
    }

    /// Write the whole state. Called with the write lock held.
    fn persist(&self, state: &BookingState) -> Result<(), StoreError> {
        persist::write_state(self.storage.as_ref(), self.layout, state).map_err(|e| {
            metrics::counter!(crate::observability::PERSIST_FAILURES_TOTAL).increment(1);
            error!("error saving bookings: {e}");
            StoreError::Persist(e)
        })
    }
}
