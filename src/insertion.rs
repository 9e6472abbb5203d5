//! Insertion candidate generation for a single vehicle.
//!
//! A vehicle's committed tours are swept chronologically as capacity deltas.
//! Every maximal stretch in which the required capacity still fits into what
//! is left of the vehicle becomes a raw candidate; raw candidates are then
//! clipped to the vehicle's merged on-duty windows.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::capacities::Capacities;
use crate::interval::Interval;
use crate::model::{UnixtimeMs, Vehicle};

/// A stretch of time into which a new tour could be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertionRange {
    pub interval: Interval,
    /// Smallest spare capacity seen anywhere inside `interval`.
    pub residual: Capacities,
}

/// Candidate ranges for a new tour needing `required` on `vehicle`.
///
/// Each committed tour occupies the whole vehicle while it runs.
pub fn possible_insertions(vehicle: &Vehicle, required: &Capacities) -> Vec<InsertionRange> {
    let commitments = vehicle
        .tours
        .iter()
        .map(|tour| (tour.interval, vehicle.capacities));
    free_ranges(
        &vehicle.capacities,
        commitments,
        required,
        &vehicle.merged_availabilities(),
    )
}

#[derive(Debug, Default)]
struct Change {
    released: Capacities,
    claimed: Capacities,
}

/// Sweep-line core of [`possible_insertions`].
///
/// `windows` must be sorted and disjoint (see [`Interval::merge`]). The result
/// is sorted by start and every range lies inside exactly one window.
pub fn free_ranges<I>(
    max: &Capacities,
    commitments: I,
    required: &Capacities,
    windows: &[Interval],
) -> Vec<InsertionRange>
where
    I: IntoIterator<Item = (Interval, Capacities)>,
{
    if !required.fits_within(max) {
        return Vec::new();
    }

    let mut changes: BTreeMap<UnixtimeMs, Change> = BTreeMap::new();
    for (interval, load) in commitments {
        if interval.is_empty() {
            continue;
        }
        changes.entry(interval.start()).or_default().claimed += load;
        changes.entry(interval.end()).or_default().released += load;
    }

    let mut raw: Vec<InsertionRange> = Vec::new();
    let mut committed = Capacities::ZERO;
    let mut open: Option<(UnixtimeMs, Capacities)> = Some((UnixtimeMs::MIN, *max));
    for (at, change) in changes {
        committed = committed.saturating_sub(&change.released) + change.claimed;
        let fits = committed.fits_within(max) && required.fits_within(&max.saturating_sub(&committed));
        let residual = max.saturating_sub(&committed);

        open = match (open, fits) {
            (Some((start, spare)), true) => Some((start, spare.meet(&residual))),
            (Some((start, spare)), false) => {
                if start < at {
                    raw.push(InsertionRange {
                        interval: Interval::new(start, at),
                        residual: spare,
                    });
                }
                None
            }
            (None, true) => Some((at, residual)),
            (None, false) => None,
        };
    }
    if let Some((start, spare)) = open {
        raw.push(InsertionRange {
            interval: Interval::new(start, UnixtimeMs::MAX),
            residual: spare,
        });
    }

    clip_to_windows(&raw, windows)
}

fn clip_to_windows(raw: &[InsertionRange], windows: &[Interval]) -> Vec<InsertionRange> {
    let mut clipped = Vec::new();
    for range in raw {
        for window in windows {
            if window.start() >= range.interval.end() {
                break;
            }
            if let Some(interval) = range.interval.intersection(window) {
                clipped.push(InsertionRange {
                    interval,
                    residual: range.residual,
                });
            }
        }
    }
    clipped
}
