//! Page classification from structural markers.
//!
//! Listing is checked first: its availability badge is the most specific
//! signal and must win over a category marker that lingers while the portal
//! animates between steps.

use crate::models::PageKind;
use crate::page::PageSignals;

pub const LISTING_MARKER: &str = "Oferta de parqueos";
pub const CATEGORY_MARKER: &str = "Tipo de vehículo";
pub const SCHEDULE_MARKER: &str = "Calendarios";

pub fn classify(signals: &PageSignals) -> PageKind {
    if is_listing(signals) {
        PageKind::Listing
    } else if is_category_select(signals) {
        PageKind::CategorySelect
    } else if is_schedule(signals) {
        PageKind::Schedule
    } else if signals.has_completion_form {
        PageKind::CompletionForm
    } else {
        PageKind::Unknown
    }
}

fn breadcrumb_contains(signals: &PageSignals, marker: &str) -> bool {
    signals
        .breadcrumb
        .as_deref()
        .is_some_and(|text| text.contains(marker))
}

fn is_listing(signals: &PageSignals) -> bool {
    breadcrumb_contains(signals, LISTING_MARKER) || signals.availability_badges > 0
}

fn is_category_select(signals: &PageSignals) -> bool {
    if breadcrumb_contains(signals, CATEGORY_MARKER) {
        return true;
    }

    signals.has_car_icon
        && signals.has_motorcycle_icon
        && signals
            .heading
            .as_deref()
            .is_some_and(|text| text.contains(CATEGORY_MARKER))
}

fn is_schedule(signals: &PageSignals) -> bool {
    breadcrumb_contains(signals, SCHEDULE_MARKER)
}
