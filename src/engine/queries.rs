use crate::catalog;
use crate::model::*;

use super::availability::{available_slots, Availability};
use super::BookingStore;

impl BookingStore {
    /// True iff `slot` is booked on `date`. Unknown dates have no bookings.
    pub async fn is_booked(&self, date: DateKey, slot: Slot) -> bool {
        self.state.read().await.is_booked(date, slot)
    }

    /// Catalog slots not booked on `date`, in catalog order.
    pub async fn available_slots(&self, date: DateKey) -> Vec<Slot> {
        let guard = self.state.read().await;
        available_slots(catalog::all_slots(), guard.booked_on(date))
    }

    pub async fn availability(&self, date: DateKey) -> Availability {
        Availability::new(date, self.available_slots(date).await)
    }

    pub async fn client_record(&self, date: DateKey, slot: Slot) -> Option<ClientRecord> {
        self.state.read().await.client_record(date, slot).cloned()
    }

    /// Bookings on one date with their client records, in slot order.
    pub async fn bookings_on(&self, date: DateKey) -> Vec<(Slot, ClientRecord)> {
        let guard = self.state.read().await;
        let Some(slots) = guard.booked_on(date) else {
            return Vec::new();
        };
        slots
            .iter()
            .filter_map(|slot| {
                guard
                    .client_record(date, *slot)
                    .map(|record| (*slot, record.clone()))
            })
            .collect()
    }

    /// Copy of the whole in-memory state.
    pub async fn snapshot(&self) -> BookingState {
        self.state.read().await.clone()
    }
}
