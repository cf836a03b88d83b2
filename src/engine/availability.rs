use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::*;

// ── Availability ──────────────────────────────────────────────────

/// Free slots of one day: `catalog` minus `booked`, in catalog order.
///
/// `booked == None` (no bookings on that date) yields the whole catalog.
pub fn available_slots(catalog: &[Slot], booked: Option<&BTreeSet<Slot>>) -> Vec<Slot> {
    match booked {
        None => catalog.to_vec(),
        Some(booked) => catalog
            .iter()
            .filter(|slot| !booked.contains(slot))
            .copied()
            .collect(),
    }
}

/// Free slots of a date as rendered by the booking form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub date: DateKey,
    pub slots: Vec<Slot>,
    /// No slot left; the form shows a disabled "no free time" entry.
    pub fully_booked: bool,
}

impl Availability {
    pub fn new(date: DateKey, slots: Vec<Slot>) -> Self {
        let fully_booked = slots.is_empty();
        Self {
            date,
            slots,
            fully_booked,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.slots.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::all_slots;

    fn slots(labels: &[&str]) -> BTreeSet<Slot> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn no_bookings_is_full_catalog() {
        assert_eq!(available_slots(all_slots(), None), all_slots().to_vec());
        assert_eq!(available_slots(all_slots(), Some(&BTreeSet::new())), all_slots().to_vec());
    }

    #[test]
    fn booked_slots_removed_in_catalog_order() {
        let booked = slots(&["18:00", "10:00", "13:00"]);
        let free: Vec<String> = available_slots(all_slots(), Some(&booked))
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            free,
            vec!["09:00", "11:00", "12:00", "14:00", "15:00", "16:00", "17:00"]
        );
    }

    #[test]
    fn every_slot_booked() {
        let booked: BTreeSet<Slot> = all_slots().iter().copied().collect();
        let free = available_slots(all_slots(), Some(&booked));
        assert!(free.is_empty());
        let view = Availability::new("2025-06-01".parse().unwrap(), free);
        assert!(view.fully_booked);
    }

    #[test]
    fn view_serializes_labels() {
        let view = Availability::new(
            "2025-06-01".parse().unwrap(),
            vec!["09:00".parse().unwrap()],
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["date"], "2025-06-01");
        assert_eq!(json["slots"][0], "09:00");
        assert_eq!(json["fullyBooked"], false);
        assert_eq!(view.labels(), vec!["09:00"]);
    }
}
