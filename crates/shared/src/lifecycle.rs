//! Package status lifecycle.
//!
//! `PENDING` is left only through admin approval, which forces `REGISTERED`;
//! `DELIVERED` and `CANCELLED` are terminal.

use serde::{Deserialize, Serialize};

use crate::domain::PackageStatus;

use PackageStatus::*;

/// Legal next states for `current`. Empty for `PENDING` and terminal states.
pub fn allowed_transitions(current: PackageStatus) -> &'static [PackageStatus] {
    match current {
        Registered => &[InTransit, Cancelled],
        InTransit => &[AtHub, OutForDelivery, Cancelled],
        AtHub => &[InTransit, OutForDelivery, Cancelled],
        OutForDelivery => &[Delivered, AtHub, Cancelled],
        Pending | Delivered | Cancelled => &[],
    }
}

impl PackageStatus {
    pub fn can_transition_to(self, next: PackageStatus) -> bool {
        allowed_transitions(self).contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Delivered | Cancelled)
    }
}

/// Steps shown on the public tracking page, in delivery order.
pub const TIMELINE: [PackageStatus; 5] = [Registered, InTransit, AtHub, OutForDelivery, Delivered];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub status: PackageStatus,
    pub reached: bool,
}

/// Marks every step up to and including `current`. Statuses outside the
/// timeline (`PENDING`, `CANCELLED`) reach nothing.
pub fn timeline(current: PackageStatus) -> Vec<TimelineStep> {
    let position = TIMELINE.iter().position(|step| *step == current);
    TIMELINE
        .iter()
        .enumerate()
        .map(|(index, status)| TimelineStep {
            status: *status,
            reached: position.is_some_and(|reached| index <= reached),
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
