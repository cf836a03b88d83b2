use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::storage::{KeyValueStore, StorageError};

/// How the two mappings are laid out in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistLayout {
    /// One record `{bookedSlots, clientInfo}` under [`STATE_KEY`], written as a unit.
    #[default]
    Combined,
    /// The two separately keyed blobs the original page wrote. Client data is
    /// written first and its failure is only logged.
    Legacy,
}

impl FromStr for PersistLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" => Ok(PersistLayout::Combined),
            "legacy" => Ok(PersistLayout::Legacy),
            other => Err(format!("unknown persistence layout {other:?}")),
        }
    }
}

impl fmt::Display for PersistLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistLayout::Combined => f.write_str("combined"),
            PersistLayout::Legacy => f.write_str("legacy"),
        }
    }
}

fn corrupt(e: serde_json::Error) -> StorageError {
    StorageError::Corrupt(e.to_string())
}

// ── Read ─────────────────────────────────────────────────────────

/// Persisted state before validation. Keys and records stay loosely typed so
/// one bad entry does not discard the rest.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    #[serde(default)]
    booked_slots: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    client_info: BTreeMap<String, Value>,
}

/// Read and normalize persisted state. Absent keys yield an empty state.
pub(crate) fn read_state(
    storage: &dyn KeyValueStore,
    layout: PersistLayout,
) -> Result<BookingState, StorageError> {
    match layout {
        PersistLayout::Combined => match storage.get(STATE_KEY)? {
            Some(json) => {
                let raw: RawState = serde_json::from_str(&json).map_err(corrupt)?;
                Ok(normalize(raw))
            }
            None => {
                let state = read_legacy(storage)?;
                if !state.is_empty() {
                    info!(
                        bookings = state.booking_count(),
                        "migrating legacy bookings into combined record"
                    );
                }
                Ok(state)
            }
        },
        PersistLayout::Legacy => read_legacy(storage),
    }
}

fn read_legacy(storage: &dyn KeyValueStore) -> Result<BookingState, StorageError> {
    let booked_slots = match storage.get(LEGACY_BOOKINGS_KEY)? {
        Some(json) => serde_json::from_str(&json).map_err(corrupt)?,
        None => BTreeMap::new(),
    };
    // Client data is auxiliary: losing it must not lose the bookings.
    let client_info = match storage.get(LEGACY_CLIENTS_KEY) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("discarding unreadable client data: {e}");
            BTreeMap::new()
        }),
        Ok(None) => BTreeMap::new(),
        Err(e) => {
            warn!("discarding unreadable client data: {e}");
            BTreeMap::new()
        }
    };
    Ok(normalize(RawState {
        booked_slots,
        client_info,
    }))
}

/// Build a consistent state from raw persisted data.
///
/// Invalid dates or slot labels are dropped, duplicate slots collapse, records
/// without a booked slot are dropped, and booked slots without a readable
/// record get an empty one.
fn normalize(raw: RawState) -> BookingState {
    let mut state = BookingState::default();
    let mut dropped = 0usize;

    for (date, slots) in raw.booked_slots {
        let Ok(date) = date.parse::<DateKey>() else {
            warn!(%date, "dropping bookings under malformed date key");
            dropped += slots.len();
            continue;
        };
        for label in slots {
            match label.parse::<Slot>() {
                Ok(slot) => {
                    state.booked_slots.entry(date).or_default().insert(slot);
                }
                Err(e) => {
                    warn!("dropping booking on {date}: {e}");
                    dropped += 1;
                }
            }
        }
    }
    state.booked_slots.retain(|_, slots| !slots.is_empty());

    for (key, value) in raw.client_info {
        let Ok(key) = key.parse::<BookingKey>() else {
            warn!(%key, "dropping client record under malformed key");
            dropped += 1;
            continue;
        };
        if !state.is_booked(key.date, key.slot) {
            warn!(%key, "dropping client record without a booked slot");
            dropped += 1;
            continue;
        }
        match serde_json::from_value::<ClientRecord>(value) {
            Ok(record) => {
                state.client_info.insert(key, record);
            }
            Err(e) => warn!(%key, "unreadable client record: {e}"),
        }
    }

    let missing: Vec<BookingKey> = state
        .booked_slots
        .iter()
        .flat_map(|(d, slots)| slots.iter().map(move |s| BookingKey::new(*d, *s)))
        .filter(|k| !state.client_info.contains_key(k))
        .collect();
    for key in missing {
        warn!(%key, "booked slot has no client record");
        state.client_info.insert(
            key,
            ClientRecord {
                client: ClientInfo::default(),
                booked_at: None,
            },
        );
    }

    if dropped > 0 {
        warn!(dropped, "discarded invalid entries while loading bookings");
    }
    state
}

// ── Write ────────────────────────────────────────────────────────

/// Write the full state. The result reflects the booking mapping only.
pub(crate) fn write_state(
    storage: &dyn KeyValueStore,
    layout: PersistLayout,
    state: &BookingState,
) -> Result<(), StorageError> {
    match layout {
        PersistLayout::Combined => {
            let json = serde_json::to_string(state).map_err(corrupt)?;
            storage.set(STATE_KEY, &json)
        }
        PersistLayout::Legacy => {
            let clients = serde_json::to_string(&state.client_info).map_err(corrupt)?;
            if let Err(e) = storage.set(LEGACY_CLIENTS_KEY, &clients) {
                warn!("error saving client data: {e}");
            }
            let bookings = serde_json::to_string(&state.booked_slots).map_err(corrupt)?;
            storage.set(LEGACY_BOOKINGS_KEY, &bookings)
        }
    }
}

/// Persist an empty state.
pub(crate) fn write_cleared(
    storage: &dyn KeyValueStore,
    layout: PersistLayout,
) -> Result<(), StorageError> {
    match layout {
        // An explicit empty record keeps stale legacy keys from being migrated again.
        PersistLayout::Combined => write_state(storage, layout, &BookingState::default()),
        PersistLayout::Legacy => {
            if let Err(e) = storage.remove(LEGACY_CLIENTS_KEY) {
                warn!("error removing client data: {e}");
            }
            storage.set(LEGACY_BOOKINGS_KEY, "{}")
        }
    }
}
