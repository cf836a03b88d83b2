use tracing::{debug, error, info, warn};

use crate::model::*;

use super::{persist, BookingStore, StoreError};

impl BookingStore {
    /// Book `slot` on `date` for `client`, stamping the record with the
    /// current time.
    ///
    /// `SlotTaken` leaves everything untouched. `Persist` means the booking is
    /// held in memory but storage did not take it.
    pub async fn book(&self, date: DateKey, slot: Slot, client: ClientInfo) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        if guard.is_booked(date, slot) {
            return Err(StoreError::SlotTaken { date, slot });
        }
        let record = ClientRecord::stamped(client, self.clock.now());
        guard.insert(date, slot, record);
        self.persist(&guard)?;
        info!(%date, %slot, "booking added");
        Ok(())
    }

    /// Boolean form of [`book`](Self::book): true iff booked and persisted.
    pub async fn add(&self, date: DateKey, slot: Slot, client: ClientInfo) -> bool {
        match self.book(date, slot, client).await {
            Ok(()) => true,
            Err(e @ StoreError::SlotTaken { .. }) => {
                debug!("add refused: {e}");
                false
            }
            Err(e) => {
                warn!("add failed: {e}");
                false
            }
        }
    }

    /// Release a booked slot and its client record.
    pub async fn cancel(&self, date: DateKey, slot: Slot) -> Result<ClientRecord, StoreError> {
        let mut guard = self.state.write().await;
        let record = guard
            .remove(date, slot)
            .ok_or(StoreError::NotBooked { date, slot })?;
        self.persist(&guard)?;
        info!(%date, %slot, "booking removed");
        Ok(record)
    }

    /// Boolean form of [`cancel`](Self::cancel). Unbooked slots return false
    /// without touching storage.
    pub async fn remove(&self, date: DateKey, slot: Slot) -> bool {
        match self.cancel(date, slot).await {
            Ok(_) => true,
            Err(e @ StoreError::NotBooked { .. }) => {
                debug!("remove ignored: {e}");
                false
            }
            Err(e) => {
                warn!("remove failed: {e}");
                false
            }
        }
    }

    /// Drop every booking. Administrative reset, not part of the booking flow.
    pub async fn clear_all(&self) -> bool {
        let mut guard = self.state.write().await;
        let dropped = guard.booking_count();
        guard.clear();
        match persist::write_cleared(self.storage.as_ref(), self.layout) {
            Ok(()) => {
                info!(dropped, "all bookings cleared");
                true
            }
            Err(e) => {
                metrics::counter!(crate::observability::PERSIST_FAILURES_TOTAL).increment(1);
                error!("error clearing bookings: {e}");
                false
            }
        }
    }
}
