//! Pin filtering: a pure projection over a pin list.

use crate::types::{DateRange, Pin, PinFilters};

/// Returns the pins matching every criterion in `filters`, in list order.
pub fn filter_pins(pins: &[Pin], filters: &PinFilters) -> Vec<Pin> {
    let term = normalized_search(filters);
    pins.iter()
        .filter(|pin| matches_type(pin, filters) && matches_search(pin, term.as_deref()))
        .filter(|pin| filters.date_range.map_or(true, |range| matches_range(pin, range)))
        .cloned()
        .collect()
}

/// Blank search terms are treated as no search at all.
fn normalized_search(filters: &PinFilters) -> Option<String> {
    filters
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_lowercase)
}

fn matches_type(pin: &Pin, filters: &PinFilters) -> bool {
    filters.pin_type.map_or(true, |t| pin.pin_type == t)
}

fn matches_search(pin: &Pin, term: Option<&str>) -> bool {
    let Some(term) = term else {
        return true;
    };
    pin.name.to_lowercase().contains(term)
        || pin
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(term))
}

fn matches_range(pin: &Pin, range: DateRange) -> bool {
    let date = pin.reference_date();
    if range.from.is_some_and(|from| date < from) {
        return false;
    }
    if range.to.is_some_and(|to| date > to) {
        return false;
    }
    true
}
