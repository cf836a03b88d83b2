use crate::model::{DateKey, Slot};
use crate::storage::StorageError;

#[derive(Debug)]
pub enum StoreError {
    SlotTaken { date: DateKey, slot: Slot },
    NotBooked { date: DateKey, slot: Slot },
    /// In-memory state changed but the write to storage failed.
    Persist(StorageError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::SlotTaken { date, slot } => write!(f, "slot {slot} on {date} is already booked"),
            StoreError::NotBooked { date, slot } => write!(f, "slot {slot} on {date} is not booked"),
            StoreError::Persist(e) => write!(f, "failed to persist bookings: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Persist(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        StoreError::Persist(e)
    }
}
