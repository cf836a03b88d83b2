use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog;

// ── Keys ─────────────────────────────────────────────────────────

/// Calendar date used as the sole grouping key, `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl FromStr for DateKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // chrono accepts unpadded fields; the key format does not.
        if s.len() != 10 {
            return Err(ParseError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, Self::FORMAT)
            .map(Self)
            .map_err(|_| ParseError::InvalidDate(s.to_string()))
    }
}

impl TryFrom<String> for DateKey {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

/// A bookable time-of-day label. Ordering is catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot {
    hour: u8,
}

impl Slot {
    /// Only hours present in the catalog produce a slot.
    pub fn at_hour(hour: u8) -> Option<Self> {
        catalog::contains_hour(hour).then_some(Self { hour })
    }

    pub(crate) const fn from_catalog_hour(hour: u8) -> Self {
        Self { hour }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }
}

impl FromStr for Slot {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidSlot(s.to_string());
        let (hh, mm) = s.split_once(':').ok_or_else(invalid)?;
        if hh.len() != 2 || mm != "00" {
            return Err(invalid());
        }
        let hour: u8 = hh.parse().map_err(|_| invalid())?;
        Slot::at_hour(hour).ok_or_else(invalid)
    }
}

impl TryFrom<String> for Slot {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00", self.hour)
    }
}

/// `(date, slot)` pair identifying one booking. Serialized as `<date>_<slot>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingKey {
    pub date: DateKey,
    pub slot: Slot,
}

impl BookingKey {
    pub fn new(date: DateKey, slot: Slot) -> Self {
        Self { date, slot }
    }
}

impl FromStr for BookingKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, slot) = s
            .split_once('_')
            .ok_or_else(|| ParseError::InvalidBookingKey(s.to_string()))?;
        Ok(Self {
            date: date.parse()?,
            slot: slot.parse()?,
        })
    }
}

impl TryFrom<String> for BookingKey {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BookingKey> for String {
    fn from(key: BookingKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for BookingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidDate(String),
    InvalidSlot(String),
    InvalidBookingKey(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidDate(s) => write!(f, "invalid date key {s:?}, expected YYYY-MM-DD"),
            ParseError::InvalidSlot(s) => write!(f, "invalid slot {s:?}, not in the catalog"),
            ParseError::InvalidBookingKey(s) => write!(f, "invalid booking key {s:?}"),
        }
    }
}

impl std::error::Error for ParseError {}

// ── Client data ──────────────────────────────────────────────────

/// Contact details collected by the booking form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub session_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Client data as persisted next to a booked slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    #[serde(flatten)]
    pub client: ClientInfo,
    /// Absent only for records recovered from a torn write.
    #[serde(default)]
    pub booked_at: Option<DateTime<Utc>>,
}

impl ClientRecord {
    pub fn stamped(client: ClientInfo, booked_at: DateTime<Utc>) -> Self {
        Self {
            client,
            booked_at: Some(booked_at),
        }
    }
}

// ── Store state ──────────────────────────────────────────────────

/// Booked slots per date plus the client record for every booked slot.
///
/// `client_info` has an entry for `(d, s)` iff `s ∈ booked_slots[d]`, and no
/// date maps to an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingState {
    pub booked_slots: BTreeMap<DateKey, BTreeSet<Slot>>,
    pub client_info: BTreeMap<BookingKey, ClientRecord>,
}

impl BookingState {
    pub fn is_empty(&self) -> bool {
        self.booked_slots.is_empty() && self.client_info.is_empty()
    }

    pub fn is_booked(&self, date: DateKey, slot: Slot) -> bool {
        self.booked_slots
            .get(&date)
            .is_some_and(|slots| slots.contains(&slot))
    }

    pub fn booked_on(&self, date: DateKey) -> Option<&BTreeSet<Slot>> {
        self.booked_slots.get(&date)
    }

    /// Insert a booking. Returns false (no change) if the slot is taken.
    pub fn insert(&mut self, date: DateKey, slot: Slot, record: ClientRecord) -> bool {
        if !self.booked_slots.entry(date).or_default().insert(slot) {
            return false;
        }
        self.client_info.insert(BookingKey::new(date, slot), record);
        true
    }

    /// Remove a booking, dropping the date once it has no slots left.
    pub fn remove(&mut self, date: DateKey, slot: Slot) -> Option<ClientRecord> {
        let slots = self.booked_slots.get_mut(&date)?;
        if !slots.remove(&slot) {
            return None;
        }
        if slots.is_empty() {
            self.booked_slots.remove(&date);
        }
        // A missing record still counts as a removal of the slot.
        Some(
            self.client_info
                .remove(&BookingKey::new(date, slot))
                .unwrap_or_else(|| ClientRecord {
                    client: ClientInfo::default(),
                    booked_at: None,
                }),
        )
    }

    pub fn clear(&mut self) {
        self.booked_slots.clear();
        self.client_info.clear();
    }

    pub fn client_record(&self, date: DateKey, slot: Slot) -> Option<&ClientRecord> {
        self.client_info.get(&BookingKey::new(date, slot))
    }

    /// Total number of booked slots across all dates.
    pub fn booking_count(&self) -> usize {
        self.booked_slots.values().map(BTreeSet::len).sum()
    }

    /// Checks the slot/record pairing invariant.
    pub fn is_consistent(&self) -> bool {
        let no_empty_dates = self.booked_slots.values().all(|s| !s.is_empty());
        let every_slot_has_record = self
            .booked_slots
            .iter()
            .flat_map(|(d, slots)| slots.iter().map(move |s| BookingKey::new(*d, *s)))
            .all(|k| self.client_info.contains_key(&k));
        let every_record_has_slot = self
            .client_info
            .keys()
            .all(|k| self.is_booked(k.date, k.slot));
        no_empty_dates && every_slot_has_record && every_record_has_slot
    }
}
