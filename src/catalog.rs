use crate::model::Slot;

/// First bookable hour of the day.
pub const FIRST_HOUR: u8 = 9;
/// Last bookable hour of the day (inclusive).
pub const LAST_HOUR: u8 = 18;

/// Number of slots offered per day.
pub const SLOTS_PER_DAY: usize = (LAST_HOUR - FIRST_HOUR + 1) as usize;

const CATALOG: [Slot; SLOTS_PER_DAY] = {
    let mut slots = [Slot::from_catalog_hour(FIRST_HOUR); SLOTS_PER_DAY];
    let mut i = 0;
    while i < SLOTS_PER_DAY {
        slots[i] = Slot::from_catalog_hour(FIRST_HOUR + i as u8);
        i += 1;
    }
    slots
};

/// Every bookable slot of a day, in catalog order.
pub fn all_slots() -> &'static [Slot] {
    &CATALOG
}

pub fn contains_hour(hour: u8) -> bool {
    (FIRST_HOUR..=LAST_HOUR).contains(&hour)
}
